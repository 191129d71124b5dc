//! Common types used across the M3UA traffic-maintenance core

use serde::{Deserialize, Serialize};

/// Traffic Mode Type for M3UA (RFC 4666 section 3.5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum TrafficModeType {
    Override = 1,
    Loadshare = 2,
    Broadcast = 3,
}

impl TrafficModeType {
    /// Numeric mode discriminant as carried on the wire. Mode equality is
    /// equality of these values, independent of how the instances were built.
    pub fn mode(&self) -> u32 {
        *self as u32
    }
}

/// M3UA management Error codes (RFC 4666 section 3.8.1), restricted to the
/// codes the traffic-maintenance handlers emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    UnsupportedTrafficModeType = 0x05,
    UnexpectedMessage = 0x06,
    InvalidRoutingContext = 0x19,
}

impl ErrorCode {
    /// Raw wire value
    pub fn value(&self) -> u32 {
        *self as u32
    }
}

/// Deployment role of this signaling endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Functionality {
    /// Signaling Gateway
    Sgw,
    /// Application Server side
    As,
    /// Inter-Process Signaling Point (peer-to-peer, no gateway)
    Ipsp,
}

/// Whether both message directions are exchanged explicitly (double-ended)
/// or one side infers AS state without a Notify (single-ended).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    #[serde(rename = "de")]
    DoubleEnded,
    #[serde(rename = "se")]
    SingleEnded,
}

/// IPSP sub-role for single-ended exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpspType {
    Client,
    Server,
}

/// Role/exchange-style combination for one signaling endpoint.
///
/// The ASPTM handlers branch on this to decide which message directions the
/// endpoint is a legitimate receiver of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub functionality: Functionality,
    #[serde(default = "default_exchange")]
    pub exchange: ExchangeType,
    #[serde(default = "default_ipsp_type")]
    pub ipsp_type: IpspType,
}

fn default_exchange() -> ExchangeType {
    ExchangeType::SingleEnded
}

fn default_ipsp_type() -> IpspType {
    IpspType::Client
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            functionality: Functionality::Ipsp,
            exchange: default_exchange(),
            ipsp_type: default_ipsp_type(),
        }
    }
}

impl RoleConfig {
    /// True when this endpoint is the legitimate receiver of ASP-Active and
    /// ASP-Inactive requests.
    pub fn receives_traffic_requests(&self) -> bool {
        match self.functionality {
            Functionality::Sgw => true,
            Functionality::As => self.exchange == ExchangeType::DoubleEnded,
            Functionality::Ipsp => {
                self.exchange == ExchangeType::DoubleEnded || self.ipsp_type == IpspType::Server
            }
        }
    }

    /// True when this endpoint is the legitimate receiver of ASP-Active-Ack
    /// and ASP-Inactive-Ack acknowledgments.
    pub fn receives_traffic_acks(&self) -> bool {
        match self.functionality {
            Functionality::As => true,
            Functionality::Sgw => self.exchange == ExchangeType::DoubleEnded,
            Functionality::Ipsp => {
                self.exchange == ExchangeType::DoubleEnded || self.ipsp_type == IpspType::Client
            }
        }
    }
}
