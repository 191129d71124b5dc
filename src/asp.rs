//! Application Server Process entity
//!
//! An ASP carries two independent machines: the local FSM is this node's own
//! lifecycle for the process, the peer FSM is this node's belief about the
//! remote process, driven only by messages received from it. The two can
//! diverge transiently and that divergence is deliberately inspectable.

use std::sync::{Arc, Weak};

use crate::appserver::AppServer;
use crate::fsm::{Fsm, FsmEvent};
use crate::types::{Functionality, RoleConfig};

/// ASP lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspState {
    Down,
    Inactive,
    Active,
}

impl AspState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Down => "DOWN",
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DOWN" => Some(Self::Down),
            "INACTIVE" => Some(Self::Inactive),
            "ACTIVE" => Some(Self::Active),
            _ => None,
        }
    }
}

/// One signaling-process instance, member of exactly one [`AppServer`]
pub struct Asp {
    name: String,
    app_server: Weak<AppServer>,
    local_fsm: Option<Arc<Fsm>>,
    peer_fsm: Option<Arc<Fsm>>,
}

impl Asp {
    /// Create an ASP attached to `app_server`, wiring the FSM pair the
    /// endpoint role calls for. IPSP endpoints carry both machines whatever
    /// the exchange style, since either direction can be inferred locally.
    pub fn new(name: impl Into<String>, app_server: &Arc<AppServer>, role: RoleConfig) -> Arc<Self> {
        let name = name.into();

        let local_fsm = (role.receives_traffic_acks() || role.functionality == Functionality::Ipsp)
            .then(|| Arc::new(build_local_fsm(&name)));
        let peer_fsm = (role.receives_traffic_requests()
            || role.functionality == Functionality::Ipsp)
            .then(|| Arc::new(build_peer_fsm(&name)));

        Arc::new(Self {
            name,
            app_server: Arc::downgrade(app_server),
            local_fsm,
            peer_fsm,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning AS. `None` means the entity graph was torn down underneath the
    /// caller, a wiring fault to be logged and aborted on.
    pub fn app_server(&self) -> Option<Arc<AppServer>> {
        self.app_server.upgrade()
    }

    pub fn local_fsm(&self) -> Option<&Arc<Fsm>> {
        self.local_fsm.as_ref()
    }

    pub fn peer_fsm(&self) -> Option<&Arc<Fsm>> {
        self.peer_fsm.as_ref()
    }

    /// Snapshot of the peer FSM state, if a peer FSM is attached
    pub fn peer_state(&self) -> Option<AspState> {
        self.peer_fsm
            .as_ref()
            .and_then(|fsm| AspState::from_name(fsm.state()))
    }
}

/// Local FSM: this node's own lifecycle, driven by acknowledgments
fn build_local_fsm(asp_name: &str) -> Fsm {
    let mut fsm = Fsm::new(format!("{asp_name}-local"), AspState::Down.as_str());

    let (down, inactive, active) = (
        AspState::Down.as_str(),
        AspState::Inactive.as_str(),
        AspState::Active.as_str(),
    );

    fsm.transition(down, FsmEvent::AspUpAck, inactive);
    fsm.transition(inactive, FsmEvent::AspActiveAck, active);
    fsm.transition(active, FsmEvent::AspActiveAck, active);
    fsm.transition(active, FsmEvent::AspInactiveAck, inactive);
    fsm.transition(inactive, FsmEvent::AspInactiveAck, inactive);
    fsm.transition(inactive, FsmEvent::AspDownAck, down);

    fsm
}

/// Peer FSM: the remote process's inferred lifecycle, driven by requests
fn build_peer_fsm(asp_name: &str) -> Fsm {
    let mut fsm = Fsm::new(format!("{asp_name}-peer"), AspState::Down.as_str());

    let (down, inactive, active) = (
        AspState::Down.as_str(),
        AspState::Inactive.as_str(),
        AspState::Active.as_str(),
    );

    fsm.transition(down, FsmEvent::AspUp, inactive);
    fsm.transition(inactive, FsmEvent::AspActive, active);
    fsm.transition(active, FsmEvent::AspActive, active);
    fsm.transition(active, FsmEvent::AspInactive, inactive);
    fsm.transition(inactive, FsmEvent::AspInactive, inactive);
    fsm.transition(inactive, FsmEvent::AspDown, down);

    fsm
}
