//! # M3UA ASP Traffic Maintenance Core
//!
//! ASP/AS traffic-state coordination for an M3UA (RFC 4666) signaling
//! endpoint:
//!
//! - **Handler** - ASP-Active/Inactive and their acknowledgments, with
//!   role/exchange eligibility, routing-context fan-out and error synthesis
//! - **Entities** - ASP and AS, each with a local and a peer state machine
//! - **FSM** - generic named-state machine with attribute bag
//! - **Endpoint** - injected context: role, routing table, started flag,
//!   outbound transport
//!
//! Wire codec, SCTP association management, the ASP-Up/Down and Notify
//! handlers, and management surfaces live outside this crate. Messages enter
//! pre-decoded and leave as objects handed to a [`TransportWriter`].
//!
//! ## Example
//! ```rust,ignore
//! use m3ua_asptm::{AspTrafficHandler, ChannelTransport, M3uaConfig, M3uaEndpoint};
//!
//! let config = M3uaConfig::from_file("m3ua.json")?;
//! let (transport, outbound) = ChannelTransport::new();
//! let endpoint = Arc::new(M3uaEndpoint::from_config(&config, Box::new(transport))?);
//! endpoint.start();
//!
//! let handler = AspTrafficHandler::new(endpoint);
//! handler.on_message(&decoded_message);
//! ```

pub mod appserver;
pub mod asp;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod fsm;
pub mod handler;
pub mod messages;
pub mod transport;
pub mod types;

// Re-exports
pub use appserver::{AppServer, AsState};
pub use asp::{Asp, AspState};
pub use config::{AppServerConfig, AspConfig, M3uaConfig};
pub use endpoint::M3uaEndpoint;
pub use errors::{ConfigError, FsmError, M3uaError, Result};
pub use fsm::{Fsm, FsmEvent};
pub use handler::AspTrafficHandler;
pub use messages::{M3uaMessage, MessageClass};
pub use transport::{ChannelTransport, TransportWriter};
pub use types::*;
