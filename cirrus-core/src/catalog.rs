//! Data-driven error catalog.
//!
//! The catalog is loaded once at start-up from a JSON array and then shared
//! read-only (usually behind an `Arc`). Lookups never fail: unknown codes
//! resolve to a fixed fallback entry.

use std::{collections::HashMap, fmt, fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::error::AccountError;

/// Status used for the fallback entry and for entries that omit one.
pub const INTERNAL_STATUS: u16 = 500;

const UNKNOWN_MESSAGE: &str = "Unknown error";

/// A resolved catalog entry. This is the error value transports send back to
/// callers; `status` stays server-side and only selects the response status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub description: String,
    #[serde(
        default = "default_status",
        alias = "http_code",
        alias = "transport_status",
        skip_serializing
    )]
    pub status: u16,
}

fn default_status() -> u16 {
    INTERNAL_STATUS
}

impl CatalogError {
    pub fn unknown() -> Self {
        Self {
            code: 0,
            message: UNKNOWN_MESSAGE.to_string(),
            description: String::new(),
            status: INTERNAL_STATUS,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.code == 0
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(encoded) => f.write_str(&encoded),
            Err(_) => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to read error catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse error catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable code → entry mapping.
#[derive(Debug, Clone, Default)]
pub struct ErrorCatalog {
    entries: HashMap<i32, CatalogError>,
}

impl ErrorCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = CatalogError>,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.code, entry))
            .collect();
        Self { entries }
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogLoadError> {
        let entries: Vec<CatalogError> = serde_json::from_str(raw)?;
        Ok(Self::from_entries(entries))
    }

    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| {
            CatalogLoadError::Io {
                path: path.display().to_string(),
                source,
            }
        })?;
        Self::from_json(&raw)
    }

    /// Load the catalog from `path`, degrading to an empty catalog when the
    /// file is missing or malformed. The service still starts in that case;
    /// every lookup then returns the fallback entry.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(catalog) => {
                debug!(
                    path = %path.display(),
                    entries = catalog.len(),
                    "error catalog loaded"
                );
                catalog
            }
            Err(err) => {
                error!(
                    path = %path.display(),
                    error = %err,
                    "failed to load error catalog"
                );
                Self::empty()
            }
        }
    }

    pub fn get_error(&self, code: impl Into<i32>) -> CatalogError {
        self.entries
            .get(&code.into())
            .cloned()
            .unwrap_or_else(CatalogError::unknown)
    }

    pub fn resolve(&self, err: &AccountError) -> CatalogError {
        self.get_error(err.code())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
