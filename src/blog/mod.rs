//! Blog Records
//!
//! Records are stored and returned verbatim; the payload is never validated.

mod reader;
mod writer;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

use crate::error::{Error, Result};

pub use reader::BlogReader;
pub use writer::WriteCoordinator;

/// Default page number
pub const DEFAULT_PAGE: u32 = 1;

/// Default page size
pub const DEFAULT_LIMIT: u32 = 5;

/// `source` reported for responses served from the cache
pub const CACHE_SOURCE: &str = "cache";

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct BlogRecord {
    pub id: i64,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Serialized as `{id, ...data fields, created_at}`. A payload that is not a
/// JSON object is kept under `data`.
impl Serialize for BlogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match &self.data {
            serde_json::Value::Object(fields) => {
                if !fields.contains_key("id") {
                    map.serialize_entry("id", &self.id)?;
                }
                for (k, v) in fields {
                    if k != "created_at" {
                        map.serialize_entry(k, v)?;
                    }
                }
            }
            other => {
                map.serialize_entry("id", &self.id)?;
                map.serialize_entry("data", other)?;
            }
        }
        map.serialize_entry("created_at", &self.created_at)?;
        map.end()
    }
}

/// Pagination parameters of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Result<Self> {
        let req = Self { page, limit };
        req.validate()?;
        Ok(req)
    }

    /// Both values must be positive
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 || self.limit == 0 {
            return Err(Error::InvalidRequest(format!(
                "page and limit must be positive integers (page={}, limit={})",
                self.page, self.limit
            )));
        }
        Ok(())
    }

    /// Number of records to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Cache key for this read shape
    pub fn cache_key(&self) -> String {
        format!("blogs:page={}:limit={}", self.page, self.limit)
    }
}

/// One page of records as returned to clients
#[derive(Debug, Clone, serde::Serialize)]
pub struct BlogPage {
    /// `"cache"` or the name of the replica that served the read
    pub source: String,
    pub page: u32,
    pub limit: u32,
    pub size: usize,
    pub blogs: Vec<BlogRecord>,
}
