//! Multisite blog descriptor.

use serde::{Deserialize, Serialize};

/// One blog of a multisite install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogInfo {
    pub id: i64,
    pub site: i64,
    /// Blog path with the slashes stripped, e.g. `foo` for `/foo/`
    pub name: String,
    pub public: bool,
}
