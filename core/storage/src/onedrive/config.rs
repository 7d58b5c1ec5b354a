//! Endpoint and timeout configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Microsoft Graph REST base URL.
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0/";
/// Microsoft identity platform base URL (tenant is appended).
pub const LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Per-call timeouts, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Every call without a dedicated tier.
    pub default_secs: u64,
    /// Item deletion.
    pub delete_secs: u64,
    /// Content upload.
    pub upload_secs: u64,
}

impl Timeouts {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_secs: 30,
            delete_secs: 10,
            upload_secs: 300,
        }
    }
}

/// Configuration shared by the token manager and the Graph client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Graph REST base; relative API paths are joined onto it.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Identity platform base; `/{tenant}/oauth2/v2.0/...` is appended.
    #[serde(default = "default_login_base")]
    pub login_base: String,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_api_base() -> String {
    GRAPH_API_BASE.to_string()
}

fn default_login_base() -> String {
    LOGIN_BASE.to_string()
}

fn default_user_agent() -> String {
    format!("OneIndex/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            login_base: default_login_base(),
            user_agent: default_user_agent(),
            timeouts: Timeouts::default(),
        }
    }
}
