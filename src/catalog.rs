//! Resource Catalog seam
//!
//! The catalog is an upstream collaborator. The engine only needs to know
//! whether a resource exists and is active, its category, and the payload
//! handed back when a consumption is accepted or replayed. The download
//! counter lives on the resource and is bumped by the consumption commit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::ResourceId;

/// A consumable resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    pub category: String,
    /// Inactive resources cannot be consumed
    pub active: bool,
    /// Where the subject fetches the goods from
    pub location: String,
    /// Accepted, non-replayed consumptions
    #[serde(default)]
    pub download_count: u64,
}

impl Resource {
    pub fn new(
        id: ResourceId,
        title: impl Into<String>,
        category: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            category: category.into(),
            active: true,
            location: location.into(),
            download_count: 0,
        }
    }

    /// Payload returned on accepted and replayed outcomes
    pub fn access_payload(&self) -> AccessPayload {
        AccessPayload {
            resource_id: self.id.clone(),
            title: self.title.clone(),
            location: self.location.clone(),
        }
    }
}

/// What the subject receives for a granted consumption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPayload {
    pub resource_id: ResourceId,
    pub title: String,
    pub location: String,
}

/// Lookup of resources by id
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    async fn resource(&self, id: &ResourceId) -> Result<Option<Resource>>;
}
