//! Adapter configuration.
//!
//! Loaded from RON. Every field has a default, so an empty `()` document (or
//! no document at all) gives the stock behaviour:
//!
//! ```ron
//! (
//!     object_store: (
//!         delimiter: "/",
//!         location_property: "location",
//!         default_location_property: "default_location",
//!     ),
//!     smb: (
//!         forget_failed_credentials: true,
//!     ),
//! )
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::VfsResult;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Flat-namespace adapter settings.
    pub object_store: ObjectStoreConfig,
    /// Hierarchical adapter settings.
    pub smb: SmbConfig,
}

impl VfsConfig {
    /// Parse a RON document.
    pub fn from_ron(text: &str) -> VfsResult<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> VfsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }
}

/// Flat-namespace (bucket/object) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Delimiter folding keys into pseudo-directories when listing.
    pub delimiter: String,
    /// Location property naming the region a new bucket is created in.
    pub location_property: String,
    /// Location property flagging "use the backend's default placement".
    pub default_location_property: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            delimiter: "/".to_string(),
            location_property: "location".to_string(),
            default_location_property: "default_location".to_string(),
        }
    }
}

/// Hierarchical (SMB) settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmbConfig {
    /// Unregister an inline credential when its target cannot be opened.
    pub forget_failed_credentials: bool,
}

impl Default for SmbConfig {
    fn default() -> Self {
        Self {
            forget_failed_credentials: true,
        }
    }
}
