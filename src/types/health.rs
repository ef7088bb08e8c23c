use serde::{Deserialize, Serialize};

/// Response of the service's health probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// `"healthy"` when the service is up.
    pub status: String,

    /// Server-local time of the probe, as reported.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Service version.
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthResponse {
    /// Returns true if the service reports itself healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
