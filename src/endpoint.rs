//! Signaling endpoint: the explicitly injected context shared by handlers
//!
//! Owns the deployment role, the routing-context table, the administrative
//! started flag and the outbound transport. Tests build isolated instances
//! per scenario; nothing here is process-global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::appserver::AppServer;
use crate::asp::Asp;
use crate::config::M3uaConfig;
use crate::errors::{ConfigError, Result};
use crate::messages::M3uaMessage;
use crate::transport::TransportWriter;
use crate::types::{RoleConfig, TrafficModeType};

/// One M3UA signaling endpoint
pub struct M3uaEndpoint {
    name: String,
    role: RoleConfig,
    /// Administrative flag, toggled from a management thread. Read relaxed:
    /// an acknowledgment racing a stop may still slip through.
    started: AtomicBool,
    /// Routing context -> resolved ASP
    routes: DashMap<u32, Arc<Asp>>,
    /// The ASP answering for the null routing context, if one is bound
    null_rc_asp: RwLock<Option<Arc<Asp>>>,
    app_servers: RwLock<Vec<Arc<AppServer>>>,
    asps: RwLock<Vec<Arc<Asp>>>,
    transport: Box<dyn TransportWriter>,
}

impl std::fmt::Debug for M3uaEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("M3uaEndpoint")
            .field("name", &self.name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl M3uaEndpoint {
    pub fn new(name: impl Into<String>, role: RoleConfig, transport: Box<dyn TransportWriter>) -> Self {
        Self {
            name: name.into(),
            role,
            started: AtomicBool::new(false),
            routes: DashMap::new(),
            null_rc_asp: RwLock::new(None),
            app_servers: RwLock::new(Vec::new()),
            asps: RwLock::new(Vec::new()),
            transport,
        }
    }

    /// Build and provision an endpoint from configuration
    pub fn from_config(config: &M3uaConfig, transport: Box<dyn TransportWriter>) -> Result<Self> {
        config.validate()?;

        let endpoint = Self::new(config.name.clone(), config.role, transport);
        for app_server in &config.app_servers {
            endpoint.create_app_server(
                &app_server.name,
                app_server.routing_contexts.clone(),
                app_server.traffic_mode,
            )?;
        }
        for asp in &config.asps {
            endpoint.create_asp(&asp.name, &asp.app_server)?;
        }
        Ok(endpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> RoleConfig {
        self.role
    }

    /// Define an Application Server on this endpoint
    pub fn create_app_server(
        &self,
        name: &str,
        routing_contexts: Option<Vec<u32>>,
        traffic_mode: Option<TrafficModeType>,
    ) -> std::result::Result<Arc<AppServer>, ConfigError> {
        let mut app_servers = self.app_servers.write();
        if app_servers.iter().any(|a| a.name() == name) {
            return Err(ConfigError::DuplicateAppServer(name.to_string()));
        }
        if let Some(rcs) = &routing_contexts {
            if rcs.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "application server {name} has an empty routing context list"
                )));
            }
        }

        let app_server = AppServer::new(name, routing_contexts, traffic_mode, self.role);
        app_servers.push(app_server.clone());
        Ok(app_server)
    }

    /// Define an ASP, attach it to its AS and bind the AS's routing contexts
    /// to it in the resolution table
    pub fn create_asp(&self, name: &str, as_name: &str) -> std::result::Result<Arc<Asp>, ConfigError> {
        let app_server = self
            .app_server(as_name)
            .ok_or_else(|| ConfigError::UnknownAppServer(as_name.to_string()))?;

        let mut asps = self.asps.write();
        if asps.iter().any(|a| a.name() == name) {
            return Err(ConfigError::DuplicateAsp(name.to_string()));
        }

        match app_server.routing_context() {
            None => {
                let null_slot = self.null_rc_asp.read();
                if let Some(existing) = null_slot.as_ref() {
                    return Err(ConfigError::NullContextTaken(existing.name().to_string()));
                }
            }
            Some(rcs) => {
                for &rc in rcs {
                    if self.routes.contains_key(&rc) {
                        return Err(ConfigError::DuplicateRoutingContext(rc));
                    }
                }
            }
        }

        let asp = Asp::new(name, &app_server, self.role);
        app_server.add_member(asp.clone());
        match app_server.routing_context() {
            None => *self.null_rc_asp.write() = Some(asp.clone()),
            Some(rcs) => {
                for &rc in rcs {
                    self.routes.insert(rc, asp.clone());
                }
            }
        }
        asps.push(asp.clone());
        Ok(asp)
    }

    pub fn app_server(&self, name: &str) -> Option<Arc<AppServer>> {
        self.app_servers
            .read()
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    /// Resolve a routing context identifier to its ASP
    pub fn resolve(&self, rc: u32) -> Option<Arc<Asp>> {
        self.routes.get(&rc).map(|entry| entry.value().clone())
    }

    /// Resolve the single ASP configured for the null routing context
    pub fn resolve_null_rc(&self) -> Option<Arc<Asp>> {
        self.null_rc_asp.read().clone()
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Relaxed);
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::Relaxed);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    /// Hand an outbound message to the transport, fire-and-forget
    pub fn write(&self, msg: M3uaMessage) {
        self.transport.write(msg);
    }
}
