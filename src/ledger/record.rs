//! Consumption records and history paging

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::catalog::Resource;
use crate::error::{QuotaError, Result};
use crate::ids::{ResourceId, SubjectId};

/// Largest page `history` will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Channel a consumption request arrived through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceChannel {
    #[default]
    Web,
    Mobile,
    Api,
    Bot,
}

impl std::fmt::Display for SourceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceChannel::Web => write!(f, "web"),
            SourceChannel::Mobile => write!(f, "mobile"),
            SourceChannel::Api => write!(f, "api"),
            SourceChannel::Bot => write!(f, "bot"),
        }
    }
}

impl FromStr for SourceChannel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "mobile" => Ok(Self::Mobile),
            "api" => Ok(Self::Api),
            "bot" => Ok(Self::Bot),
            _ => Err(format!("Invalid source channel: {}", s)),
        }
    }
}

/// Client metadata captured with each consumption
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub address: Option<String>,
    pub user_agent: Option<String>,
}

/// One accepted consumption, immutable once written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub id: Uuid,
    pub subject_id: SubjectId,
    pub resource_id: ResourceId,
    pub timestamp: DateTime<Utc>,
    pub channel: SourceChannel,
    pub client: ClientMeta,
    /// Resource category at the time of consumption
    pub category: String,
}

impl ConsumptionRecord {
    pub fn new(
        subject_id: SubjectId,
        resource: &Resource,
        channel: SourceChannel,
        client: ClientMeta,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject_id,
            resource_id: resource.id.clone(),
            timestamp,
            channel,
            client,
            category: resource.category.clone(),
        }
    }
}

/// Validated 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self> {
        if page == 0 {
            return Err(QuotaError::invalid("page", "pages start at 1"));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(QuotaError::invalid(
                "page_size",
                format!("must be between 1 and {}", MAX_PAGE_SIZE),
            ));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Records to skip before this page
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

/// A page of history, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub items: Vec<ConsumptionRecord>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub has_more: bool,
}

impl HistoryPage {
    /// Slice a newest-first iterator into the requested page
    pub fn from_newest_first<'a, I>(records: I, total: usize, request: PageRequest) -> Self
    where
        I: Iterator<Item = &'a ConsumptionRecord>,
    {
        let items: Vec<ConsumptionRecord> = records
            .skip(request.offset())
            .take(request.page_size() as usize)
            .cloned()
            .collect();
        let has_more = request.offset() + items.len() < total;
        Self {
            items,
            page: request.page(),
            page_size: request.page_size(),
            total: total as u64,
            has_more,
        }
    }
}
