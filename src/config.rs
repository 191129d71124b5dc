//! M3UA deployment configuration

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::{RoleConfig, TrafficModeType};

/// Configuration for one signaling endpoint (one association's worth of
/// ASP/AS provisioning)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M3uaConfig {
    /// Endpoint name, used in log statements
    pub name: String,
    /// Node role, exchange style and IPSP sub-role
    #[serde(flatten)]
    pub role: RoleConfig,
    /// Application servers this endpoint serves
    #[serde(default)]
    pub app_servers: Vec<AppServerConfig>,
    /// ASPs and their AS assignments
    #[serde(default)]
    pub asps: Vec<AspConfig>,
}

/// One Application Server definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppServerConfig {
    pub name: String,
    /// `None` binds the AS to the null routing context of the association
    #[serde(default)]
    pub routing_contexts: Option<Vec<u32>>,
    /// Pre-configured traffic mode; absent means the first ASP-Active
    /// exchange negotiates it
    #[serde(default)]
    pub traffic_mode: Option<TrafficModeType>,
}

/// One ASP definition and its AS assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspConfig {
    pub name: String,
    pub app_server: String,
}

impl Default for M3uaConfig {
    fn default() -> Self {
        Self {
            name: "m3ua".to_string(),
            role: RoleConfig::default(),
            app_servers: Vec::new(),
            asps: Vec::new(),
        }
    }
}

impl M3uaConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-entity consistency before provisioning
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut as_names = std::collections::HashSet::new();
        let mut null_context_as: Option<&str> = None;
        let mut contexts = std::collections::HashSet::new();

        for app_server in &self.app_servers {
            if !as_names.insert(app_server.name.as_str()) {
                return Err(ConfigError::DuplicateAppServer(app_server.name.clone()));
            }
            match &app_server.routing_contexts {
                None => {
                    if null_context_as.is_some() {
                        return Err(ConfigError::Invalid(format!(
                            "multiple application servers bound to the null routing context: {} and {}",
                            null_context_as.unwrap_or_default(),
                            app_server.name
                        )));
                    }
                    null_context_as = Some(&app_server.name);
                }
                Some(rcs) => {
                    if rcs.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "application server {} has an empty routing context list",
                            app_server.name
                        )));
                    }
                    for &rc in rcs {
                        if !contexts.insert(rc) {
                            return Err(ConfigError::DuplicateRoutingContext(rc));
                        }
                    }
                }
            }
        }

        let mut asp_names = std::collections::HashSet::new();
        for asp in &self.asps {
            if !asp_names.insert(asp.name.as_str()) {
                return Err(ConfigError::DuplicateAsp(asp.name.clone()));
            }
            if !as_names.contains(asp.app_server.as_str()) {
                return Err(ConfigError::UnknownAppServer(asp.app_server.clone()));
            }
        }

        Ok(())
    }
}
