//! Identity provider seam
//!
//! Authentication happens upstream. The engine receives a subject id plus
//! an eligibility flag and refuses to evaluate quota for unverified subjects.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::SubjectId;

/// Subject as known to the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectIdentity {
    pub subject_id: SubjectId,
    /// Verified accounts may consume
    pub verified: bool,
}

impl SubjectIdentity {
    pub fn verified(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            verified: true,
        }
    }

    pub fn unverified(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            verified: false,
        }
    }
}

/// Resolves subjects
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identity(&self, subject_id: &SubjectId) -> Result<Option<SubjectIdentity>>;
}
