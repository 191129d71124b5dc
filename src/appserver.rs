//! Application Server entity
//!
//! An AS groups the ASPs serving one routing-context relation and carries the
//! negotiated traffic distribution mode. Like the ASP it owns a local/peer
//! FSM pair; the peer machine is only ever driven inline on IPSP
//! deployments, where no Notify message will arrive to carry AS state.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::asp::{Asp, AspState};
use crate::errors::FsmError;
use crate::fsm::{attribute, AttrBag, Fsm, FsmEvent, ATTR_ASP};
use crate::types::{Functionality, RoleConfig, TrafficModeType};

/// AS aggregate states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsState {
    Down,
    Inactive,
    Active,
    /// Recovery window: no ASP is serving but the AS is not torn down,
    /// an operator may still reactivate a member.
    Pending,
}

impl AsState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Down => "DOWN",
            Self::Inactive => "INACTIVE",
            Self::Active => "ACTIVE",
            Self::Pending => "PENDING",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DOWN" => Some(Self::Down),
            "INACTIVE" => Some(Self::Inactive),
            "ACTIVE" => Some(Self::Active),
            "PENDING" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// One logical Application Server
pub struct AppServer {
    name: String,
    /// The AS's own routing context identifiers, echoed in acknowledgments.
    /// `None` is the single implicit context of the association.
    routing_context: Option<Vec<u32>>,
    default_traffic_mode: TrafficModeType,
    traffic_mode: Mutex<Option<TrafficModeType>>,
    /// Members in attachment order
    members: RwLock<Vec<Arc<Asp>>>,
    local_fsm: Option<Arc<Fsm>>,
    peer_fsm: Option<Arc<Fsm>>,
}

impl AppServer {
    /// Create an AS. `configured_mode` pre-sets the traffic mode from
    /// management configuration; otherwise the first ASP-Active exchange
    /// negotiates it, defaulting to Loadshare.
    pub fn new(
        name: impl Into<String>,
        routing_context: Option<Vec<u32>>,
        configured_mode: Option<TrafficModeType>,
        role: RoleConfig,
    ) -> Arc<Self> {
        let name = name.into();

        let local_fsm = (role.receives_traffic_requests()
            || role.functionality == Functionality::Ipsp)
            .then(|| Arc::new(build_local_fsm(&name)));
        let peer_fsm = (role.receives_traffic_acks() || role.functionality == Functionality::Ipsp)
            .then(|| Arc::new(build_peer_fsm(&name)));

        Arc::new(Self {
            name,
            routing_context,
            default_traffic_mode: configured_mode.unwrap_or(TrafficModeType::Loadshare),
            traffic_mode: Mutex::new(configured_mode),
            members: RwLock::new(Vec::new()),
            local_fsm,
            peer_fsm,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn routing_context(&self) -> Option<&[u32]> {
        self.routing_context.as_deref()
    }

    pub fn traffic_mode(&self) -> Option<TrafficModeType> {
        *self.traffic_mode.lock()
    }

    /// Store `mode` unconditionally. The request-direction conflict check
    /// lives in the handler; the acknowledgment direction overwrites.
    pub fn set_traffic_mode(&self, mode: TrafficModeType) {
        *self.traffic_mode.lock() = Some(mode);
    }

    /// Fix the mode to the default when neither configuration nor the first
    /// ASP-Active named one
    pub fn set_default_traffic_mode(&self) {
        *self.traffic_mode.lock() = Some(self.default_traffic_mode);
    }

    pub fn default_traffic_mode(&self) -> TrafficModeType {
        self.default_traffic_mode
    }

    pub fn add_member(&self, asp: Arc<Asp>) {
        self.members.write().push(asp);
    }

    /// Snapshot of the member list in attachment order
    pub fn members(&self) -> Vec<Arc<Asp>> {
        self.members.read().clone()
    }

    pub fn local_fsm(&self) -> Option<&Arc<Fsm>> {
        self.local_fsm.as_ref()
    }

    pub fn peer_fsm(&self) -> Option<&Arc<Fsm>> {
        self.peer_fsm.as_ref()
    }

    /// Snapshot of the local FSM state, if a local FSM is attached
    pub fn local_state(&self) -> Option<AsState> {
        self.local_fsm
            .as_ref()
            .and_then(|fsm| AsState::from_name(fsm.state()))
    }

    /// Snapshot of the peer FSM state, if a peer FSM is attached
    pub fn peer_state(&self) -> Option<AsState> {
        self.peer_fsm
            .as_ref()
            .and_then(|fsm| AsState::from_name(fsm.state()))
    }
}

/// Local FSM: this node's aggregate view, driven by member ASP transitions
fn build_local_fsm(as_name: &str) -> Fsm {
    let mut fsm = Fsm::new(format!("{as_name}-local"), AsState::Down.as_str());

    let (down, inactive, active, pending) = (
        AsState::Down.as_str(),
        AsState::Inactive.as_str(),
        AsState::Active.as_str(),
        AsState::Pending.as_str(),
    );

    fsm.transition(down, FsmEvent::AspActive, active);
    fsm.transition(inactive, FsmEvent::AspActive, active);
    fsm.transition(pending, FsmEvent::AspActive, active);
    fsm.transition(active, FsmEvent::AspActive, active);
    fsm.transition_with(
        active,
        FsmEvent::AspInactive,
        pending,
        Box::new(stay_active_while_siblings_serve),
    );
    fsm.transition(pending, FsmEvent::AspInactive, pending);

    fsm
}

/// Peer FSM: the remote's inferred aggregate view
fn build_peer_fsm(as_name: &str) -> Fsm {
    let mut fsm = Fsm::new(format!("{as_name}-peer"), AsState::Down.as_str());

    let (down, inactive, active, pending) = (
        AsState::Down.as_str(),
        AsState::Inactive.as_str(),
        AsState::Active.as_str(),
        AsState::Pending.as_str(),
    );

    fsm.transition(down, FsmEvent::AsStateChangeActive, active);
    fsm.transition(inactive, FsmEvent::AsStateChangeActive, active);
    fsm.transition(pending, FsmEvent::AsStateChangeActive, active);
    fsm.transition(active, FsmEvent::AsStateChangeActive, active);
    fsm.transition(active, FsmEvent::AsStateChangePending, pending);

    fsm
}

/// AS-local ASP_INACTIVE action: one member going inactive only degrades the
/// AS when no other member's peer FSM is still Active. Member peer FSMs are
/// read one lock at a time; the scan is not atomic with this transition.
fn stay_active_while_siblings_serve(attrs: &mut AttrBag) -> Result<Option<&'static str>, FsmError> {
    let asp = attribute::<Arc<Asp>>(attrs, ATTR_ASP)?;

    let Some(app_server) = asp.app_server() else {
        return Ok(None);
    };

    for member in app_server.members() {
        if member.name() == asp.name() {
            continue;
        }
        if member.peer_state() == Some(AspState::Active) {
            return Ok(Some(AsState::Active.as_str()));
        }
    }

    Ok(None)
}
