//! API request and response models.

use serde::{Deserialize, Serialize};

/// Body of GET and POST /blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistBody {
    /// Blocked host substrings.
    pub blacklist: Vec<String>,
}
