//! M3UA message objects consumed and produced by the traffic-maintenance core
//!
//! Wire encoding/decoding lives below this layer; messages arrive here
//! pre-decoded and leave as objects handed to a [`TransportWriter`].
//!
//! [`TransportWriter`]: crate::transport::TransportWriter

use crate::types::{ErrorCode, TrafficModeType};

/// M3UA Message Class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageClass {
    /// MGMT: Error / Notify
    Management = 0,
    /// ASPTM: ASP Traffic Maintenance
    Asptm = 4,
}

/// M3UA message, ASP Traffic Maintenance subset plus the management Error
#[derive(Debug, Clone)]
pub enum M3uaMessage {
    AspActive {
        traffic_mode_type: Option<TrafficModeType>,
        routing_context: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    AspActiveAck {
        traffic_mode_type: Option<TrafficModeType>,
        routing_context: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    AspInactive {
        routing_context: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    AspInactiveAck {
        routing_context: Option<Vec<u32>>,
        info_string: Option<String>,
    },
    Error {
        error_code: ErrorCode,
        routing_context: Option<Vec<u32>>,
        diagnostic_info: Option<Vec<u8>>,
    },
}

impl M3uaMessage {
    /// Get message class
    pub fn class(&self) -> MessageClass {
        match self {
            Self::Error { .. } => MessageClass::Management,
            Self::AspActive { .. }
            | Self::AspActiveAck { .. }
            | Self::AspInactive { .. }
            | Self::AspInactiveAck { .. } => MessageClass::Asptm,
        }
    }

    /// Get message type within the class
    pub fn message_type(&self) -> u8 {
        match self {
            Self::Error { .. } => 0,
            Self::AspActive { .. } => 1,
            Self::AspInactive { .. } => 2,
            Self::AspActiveAck { .. } => 3,
            Self::AspInactiveAck { .. } => 4,
        }
    }

    /// Routing context parameter, `None` being the distinguished null
    /// routing context of the association.
    pub fn routing_context(&self) -> Option<&[u32]> {
        match self {
            Self::AspActive {
                routing_context, ..
            }
            | Self::AspActiveAck {
                routing_context, ..
            }
            | Self::AspInactive {
                routing_context, ..
            }
            | Self::AspInactiveAck {
                routing_context, ..
            }
            | Self::Error {
                routing_context, ..
            } => routing_context.as_deref(),
        }
    }
}
