//! ASP Traffic Maintenance handler
//!
//! Receives decoded ASP-Active/ASP-Inactive messages and their
//! acknowledgments, validates them against the endpoint role and routing
//! contexts, drives the ASP and AS state machines, negotiates the traffic
//! mode on first activation and emits the matching acknowledgment or Error.
//!
//! No failure escapes these entry points: protocol rejections become Error
//! messages on the wire, wiring faults and transition rejections are logged
//! and abort only the ASP being processed.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::asp::{Asp, AspState};
use crate::endpoint::M3uaEndpoint;
use crate::fsm::{FsmEvent, ATTR_ASP, ATTR_MESSAGE};
use crate::messages::M3uaMessage;
use crate::types::{ErrorCode, Functionality, TrafficModeType};

/// The traffic-state coordinator for one endpoint
pub struct AspTrafficHandler {
    endpoint: Arc<M3uaEndpoint>,
}

impl AspTrafficHandler {
    pub fn new(endpoint: Arc<M3uaEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Dispatch one decoded ASPTM message to its entry point
    pub fn on_message(&self, msg: &M3uaMessage) {
        match msg {
            M3uaMessage::AspActive { .. } => self.on_asp_active(msg),
            M3uaMessage::AspActiveAck { .. } => self.on_asp_active_ack(msg),
            M3uaMessage::AspInactive { .. } => self.on_asp_inactive(msg),
            M3uaMessage::AspInactiveAck { .. } => self.on_asp_inactive_ack(msg),
            other => debug!(
                endpoint = self.endpoint.name(),
                class = ?other.class(),
                "ignoring non-ASPTM message"
            ),
        }
    }

    /// ASP-Active, request direction
    pub fn on_asp_active(&self, msg: &M3uaMessage) {
        let (traffic_mode, rc) = match msg {
            M3uaMessage::AspActive {
                traffic_mode_type,
                routing_context,
                ..
            } => (*traffic_mode_type, routing_context.as_deref()),
            _ => {
                warn!(endpoint = self.endpoint.name(), "on_asp_active called with wrong message kind");
                return;
            }
        };

        if !self.endpoint.role().receives_traffic_requests() {
            self.send_error(None, ErrorCode::UnexpectedMessage);
            return;
        }

        match rc {
            None => match self.endpoint.resolve_null_rc() {
                Some(asp) => self.activate(&asp, msg, traffic_mode),
                None => error!(
                    endpoint = self.endpoint.name(),
                    "ASP ACTIVE with null routing context but no ASP bound to it, dropping"
                ),
            },
            Some(rcs) => {
                for &rc in rcs {
                    match self.endpoint.resolve(rc) {
                        Some(asp) => self.activate(&asp, msg, traffic_mode),
                        None => {
                            self.send_error(Some(vec![rc]), ErrorCode::InvalidRoutingContext);
                            error!(
                                endpoint = self.endpoint.name(),
                                rc, "ASP ACTIVE for unknown routing context, sent back error"
                            );
                        }
                    }
                }
            }
        }
    }

    /// ASP-Active-Ack, acknowledgment direction
    pub fn on_asp_active_ack(&self, msg: &M3uaMessage) {
        // Management stop races in-flight acknowledgments; discard silently.
        if !self.endpoint.is_started() {
            return;
        }

        let (traffic_mode, rc) = match msg {
            M3uaMessage::AspActiveAck {
                traffic_mode_type,
                routing_context,
                ..
            } => (*traffic_mode_type, routing_context.as_deref()),
            _ => {
                warn!(endpoint = self.endpoint.name(), "on_asp_active_ack called with wrong message kind");
                return;
            }
        };

        if !self.endpoint.role().receives_traffic_acks() {
            self.send_error(rc.map(<[u32]>::to_vec), ErrorCode::UnexpectedMessage);
            return;
        }

        match rc {
            None => match self.endpoint.resolve_null_rc() {
                Some(asp) => self.acknowledge_active(&asp, traffic_mode),
                None => error!(
                    endpoint = self.endpoint.name(),
                    "ASP ACTIVE ACK with null routing context but no ASP bound to it, dropping"
                ),
            },
            Some(rcs) => {
                for &rc in rcs {
                    match self.endpoint.resolve(rc) {
                        Some(asp) => self.acknowledge_active(&asp, traffic_mode),
                        // No Error on the acknowledgment path: the peer
                        // acked a context we never asked about.
                        None => warn!(
                            endpoint = self.endpoint.name(),
                            rc, "ASP ACTIVE ACK for unknown routing context, skipping"
                        ),
                    }
                }
            }
        }
    }

    /// ASP-Inactive, request direction
    pub fn on_asp_inactive(&self, msg: &M3uaMessage) {
        let rc = match msg {
            M3uaMessage::AspInactive {
                routing_context, ..
            } => routing_context.as_deref(),
            _ => {
                warn!(endpoint = self.endpoint.name(), "on_asp_inactive called with wrong message kind");
                return;
            }
        };

        if !self.endpoint.role().receives_traffic_requests() {
            self.send_error(None, ErrorCode::UnexpectedMessage);
            return;
        }

        match rc {
            None => match self.endpoint.resolve_null_rc() {
                Some(asp) => self.deactivate(&asp, msg),
                None => error!(
                    endpoint = self.endpoint.name(),
                    "ASP INACTIVE with null routing context but no ASP bound to it, dropping"
                ),
            },
            Some(rcs) => {
                for &rc in rcs {
                    match self.endpoint.resolve(rc) {
                        Some(asp) => self.deactivate(&asp, msg),
                        None => {
                            self.send_error(Some(vec![rc]), ErrorCode::InvalidRoutingContext);
                            error!(
                                endpoint = self.endpoint.name(),
                                rc, "ASP INACTIVE for unknown routing context, sent back error"
                            );
                        }
                    }
                }
            }
        }
    }

    /// ASP-Inactive-Ack, acknowledgment direction
    pub fn on_asp_inactive_ack(&self, msg: &M3uaMessage) {
        if !self.endpoint.is_started() {
            return;
        }

        let rc = match msg {
            M3uaMessage::AspInactiveAck {
                routing_context, ..
            } => routing_context.as_deref(),
            _ => {
                warn!(endpoint = self.endpoint.name(), "on_asp_inactive_ack called with wrong message kind");
                return;
            }
        };

        if !self.endpoint.role().receives_traffic_acks() {
            self.send_error(rc.map(<[u32]>::to_vec), ErrorCode::UnexpectedMessage);
            return;
        }

        match rc {
            None => match self.endpoint.resolve_null_rc() {
                Some(asp) => self.acknowledge_inactive(&asp),
                None => error!(
                    endpoint = self.endpoint.name(),
                    "ASP INACTIVE ACK with null routing context but no ASP bound to it, dropping"
                ),
            },
            Some(rcs) => {
                for &rc in rcs {
                    match self.endpoint.resolve(rc) {
                        Some(asp) => self.acknowledge_inactive(&asp),
                        None => {
                            self.send_error(Some(vec![rc]), ErrorCode::InvalidRoutingContext);
                            error!(
                                endpoint = self.endpoint.name(),
                                rc, "ASP INACTIVE ACK for unknown routing context, sent back error"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Per-ASP ASP-Active: traffic mode negotiation, acknowledgment, signals
    fn activate(&self, asp: &Arc<Asp>, msg: &M3uaMessage, traffic_mode: Option<TrafficModeType>) {
        let Some(app_server) = asp.app_server() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP ACTIVE but the ASP has no owning AS"
            );
            return;
        };

        match app_server.traffic_mode() {
            Some(current) => {
                // Mode already fixed; a conflicting request is a protocol
                // error, a matching or absent one changes nothing.
                if let Some(requested) = traffic_mode {
                    if requested.mode() != current.mode() {
                        self.send_error(
                            app_server.routing_context().map(<[u32]>::to_vec),
                            ErrorCode::UnsupportedTrafficModeType,
                        );
                        return;
                    }
                }
            }
            None => {
                // First activation fixes the mode for the AS's service life.
                match traffic_mode {
                    Some(requested) => app_server.set_traffic_mode(requested),
                    None => app_server.set_default_traffic_mode(),
                }
            }
        }

        let Some(asp_peer_fsm) = asp.peer_fsm() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP ACTIVE but peer FSM for ASP is not attached"
            );
            return;
        };
        let Some(as_local_fsm) = app_server.local_fsm() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP ACTIVE but local FSM for AS is not attached"
            );
            return;
        };

        // The acknowledgment goes out before any signaling and is never
        // retracted if a signal fails.
        self.endpoint.write(M3uaMessage::AspActiveAck {
            traffic_mode_type: app_server.traffic_mode(),
            routing_context: app_server.routing_context().map(<[u32]>::to_vec),
            info_string: None,
        });

        asp_peer_fsm.set_attribute(ATTR_MESSAGE, msg.clone());
        let result = asp_peer_fsm.signal(FsmEvent::AspActive).and_then(|_| {
            as_local_fsm.set_attribute(ATTR_ASP, asp.clone());
            as_local_fsm.signal(FsmEvent::AspActive)
        });
        if let Err(e) = result {
            error!(endpoint = self.endpoint.name(), asp = asp.name(), error = %e, "ASP ACTIVE rejected by FSM");
        }
    }

    /// Per-ASP ASP-Active-Ack: store the effective mode, drive our own FSM,
    /// and on IPSP synthesize the AS transition no Notify will ever carry
    fn acknowledge_active(&self, asp: &Arc<Asp>, traffic_mode: Option<TrafficModeType>) {
        let Some(app_server) = asp.app_server() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP ACTIVE ACK but the ASP has no owning AS"
            );
            return;
        };

        let mode = traffic_mode.unwrap_or_else(|| app_server.default_traffic_mode());
        app_server.set_traffic_mode(mode);

        let Some(asp_local_fsm) = asp.local_fsm() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP ACTIVE ACK but local FSM for ASP is not attached"
            );
            return;
        };

        let result = asp_local_fsm.signal(FsmEvent::AspActiveAck).and_then(|_| {
            if self.endpoint.role().functionality == Functionality::Ipsp {
                let Some(as_peer_fsm) = app_server.peer_fsm() else {
                    error!(
                        endpoint = self.endpoint.name(),
                        asp = asp.name(),
                        app_server = app_server.name(),
                        "received ASP ACTIVE ACK but peer FSM for AS is not attached"
                    );
                    return Ok(());
                };
                as_peer_fsm.set_attribute(ATTR_ASP, asp.clone());
                as_peer_fsm.signal(FsmEvent::AsStateChangeActive)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            error!(endpoint = self.endpoint.name(), asp = asp.name(), error = %e, "ASP ACTIVE ACK rejected by FSM");
        }
    }

    /// Per-ASP ASP-Inactive: acknowledgment, then signals. No traffic mode
    /// negotiation on deactivation.
    fn deactivate(&self, asp: &Arc<Asp>, msg: &M3uaMessage) {
        let Some(app_server) = asp.app_server() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP INACTIVE but the ASP has no owning AS"
            );
            return;
        };

        let Some(asp_peer_fsm) = asp.peer_fsm() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP INACTIVE but peer FSM for ASP is not attached"
            );
            return;
        };
        let Some(as_local_fsm) = app_server.local_fsm() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP INACTIVE but local FSM for AS is not attached"
            );
            return;
        };

        self.endpoint.write(M3uaMessage::AspInactiveAck {
            routing_context: app_server.routing_context().map(<[u32]>::to_vec),
            info_string: None,
        });

        asp_peer_fsm.set_attribute(ATTR_MESSAGE, msg.clone());
        let result = asp_peer_fsm.signal(FsmEvent::AspInactive).and_then(|_| {
            as_local_fsm.set_attribute(ATTR_ASP, asp.clone());
            as_local_fsm.signal(FsmEvent::AspInactive)
        });
        if let Err(e) = result {
            error!(endpoint = self.endpoint.name(), asp = asp.name(), error = %e, "ASP INACTIVE rejected by FSM");
        }
    }

    /// Per-ASP ASP-Inactive-Ack: drive our own FSM, then on IPSP apply the
    /// Loadshare quorum rule before degrading the AS
    fn acknowledge_inactive(&self, asp: &Arc<Asp>) {
        let Some(app_server) = asp.app_server() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP INACTIVE ACK but the ASP has no owning AS"
            );
            return;
        };

        let Some(asp_local_fsm) = asp.local_fsm() else {
            error!(
                endpoint = self.endpoint.name(),
                asp = asp.name(),
                "received ASP INACTIVE ACK but local FSM for ASP is not attached"
            );
            return;
        };

        let result = asp_local_fsm.signal(FsmEvent::AspInactiveAck).and_then(|_| {
            if self.endpoint.role().functionality == Functionality::Ipsp {
                let Some(as_peer_fsm) = app_server.peer_fsm() else {
                    error!(
                        endpoint = self.endpoint.name(),
                        asp = asp.name(),
                        app_server = app_server.name(),
                        "received ASP INACTIVE ACK but peer FSM for AS is not attached"
                    );
                    return Ok(());
                };

                // Loadshare quorum: while any member's peer FSM is still
                // Active the AS keeps serving, suppress the transition.
                // Member states are read one lock at a time; a concurrent
                // activation during the scan is an accepted race.
                if app_server.traffic_mode().map(|m| m.mode())
                    == Some(TrafficModeType::Loadshare.mode())
                {
                    for member in app_server.members() {
                        if member.peer_state() == Some(AspState::Active) {
                            return Ok(());
                        }
                    }
                }

                // Pending, not down: an operator may still reactivate.
                as_peer_fsm.set_attribute(ATTR_ASP, asp.clone());
                as_peer_fsm.signal(FsmEvent::AsStateChangePending)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            error!(endpoint = self.endpoint.name(), asp = asp.name(), error = %e, "ASP INACTIVE ACK rejected by FSM");
        }
    }

    /// One-shot Error message. Invalid routing context errors carry exactly
    /// the one unresolvable identifier; role rejections carry none.
    fn send_error(&self, routing_context: Option<Vec<u32>>, code: ErrorCode) {
        self.endpoint.write(M3uaMessage::Error {
            error_code: code,
            routing_context,
            diagnostic_info: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appserver::AsState;
    use crate::transport::ChannelTransport;
    use crate::types::{ExchangeType, IpspType, RoleConfig};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        endpoint: Arc<M3uaEndpoint>,
        handler: AspTrafficHandler,
        rx: UnboundedReceiver<M3uaMessage>,
    }

    fn harness(role: RoleConfig) -> Harness {
        // RUST_LOG=m3ua_asptm=debug surfaces transition traces when a
        // scenario fails
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let (transport, rx) = ChannelTransport::new();
        let endpoint = Arc::new(M3uaEndpoint::new("test", role, Box::new(transport)));
        endpoint.start();
        let handler = AspTrafficHandler::new(endpoint.clone());
        Harness {
            endpoint,
            handler,
            rx,
        }
    }

    fn sgw_role() -> RoleConfig {
        RoleConfig {
            functionality: Functionality::Sgw,
            exchange: ExchangeType::SingleEnded,
            ipsp_type: IpspType::Client,
        }
    }

    fn as_de_role() -> RoleConfig {
        RoleConfig {
            functionality: Functionality::As,
            exchange: ExchangeType::DoubleEnded,
            ipsp_type: IpspType::Client,
        }
    }

    fn ipsp_se_client_role() -> RoleConfig {
        RoleConfig {
            functionality: Functionality::Ipsp,
            exchange: ExchangeType::SingleEnded,
            ipsp_type: IpspType::Client,
        }
    }

    fn asp_active(rc: Option<Vec<u32>>, mode: Option<TrafficModeType>) -> M3uaMessage {
        M3uaMessage::AspActive {
            traffic_mode_type: mode,
            routing_context: rc,
            info_string: None,
        }
    }

    fn asp_active_ack(rc: Option<Vec<u32>>, mode: Option<TrafficModeType>) -> M3uaMessage {
        M3uaMessage::AspActiveAck {
            traffic_mode_type: mode,
            routing_context: rc,
            info_string: None,
        }
    }

    fn asp_inactive(rc: Option<Vec<u32>>) -> M3uaMessage {
        M3uaMessage::AspInactive {
            routing_context: rc,
            info_string: None,
        }
    }

    fn asp_inactive_ack(rc: Option<Vec<u32>>) -> M3uaMessage {
        M3uaMessage::AspInactiveAck {
            routing_context: rc,
            info_string: None,
        }
    }

    /// Drive an ASP's peer FSM to a given state directly (setup shortcut for
    /// lifecycle steps owned by the state-maintenance handler)
    fn arm_peer(asp: &Arc<Asp>, state: AspState) {
        let peer = asp.peer_fsm().unwrap();
        peer.signal(FsmEvent::AspUp).unwrap();
        if state == AspState::Active {
            peer.signal(FsmEvent::AspActive).unwrap();
        }
    }

    fn arm_local(asp: &Arc<Asp>, state: AspState) {
        let local = asp.local_fsm().unwrap();
        local.signal(FsmEvent::AspUpAck).unwrap();
        if state == AspState::Active {
            local.signal(FsmEvent::AspActiveAck).unwrap();
        }
    }

    #[test]
    fn test_asp_active_negotiates_default_loadshare() {
        let mut h = harness(sgw_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_peer(&asp, AspState::Inactive);

        h.handler.on_message(&asp_active(Some(vec![100]), None));

        let app_server = h.endpoint.app_server("as1").unwrap();
        assert_eq!(app_server.traffic_mode(), Some(TrafficModeType::Loadshare));
        assert_eq!(asp.peer_state(), Some(AspState::Active));
        assert_eq!(app_server.local_state(), Some(AsState::Active));

        match h.rx.try_recv().unwrap() {
            M3uaMessage::AspActiveAck {
                traffic_mode_type,
                routing_context,
                ..
            } => {
                assert_eq!(traffic_mode_type, Some(TrafficModeType::Loadshare));
                assert_eq!(routing_context, Some(vec![100]));
            }
            other => panic!("expected ASP ACTIVE ACK, got {other:?}"),
        }
        assert!(h.rx.try_recv().is_err());
    }

    #[test]
    fn test_asp_active_mode_conflict_rejected_without_signals() {
        let mut h = harness(sgw_role());
        h.endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Override))
            .unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_peer(&asp, AspState::Inactive);

        h.handler
            .on_message(&asp_active(Some(vec![100]), Some(TrafficModeType::Broadcast)));

        match h.rx.try_recv().unwrap() {
            M3uaMessage::Error {
                error_code,
                routing_context,
                ..
            } => {
                assert_eq!(error_code, ErrorCode::UnsupportedTrafficModeType);
                assert_eq!(routing_context, Some(vec![100]));
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert!(h.rx.try_recv().is_err());

        // neither FSM moved
        assert_eq!(asp.peer_state(), Some(AspState::Inactive));
        let app_server = h.endpoint.app_server("as1").unwrap();
        assert_eq!(app_server.traffic_mode(), Some(TrafficModeType::Override));
        assert_eq!(app_server.local_state(), Some(AsState::Down));
    }

    #[test]
    fn test_asp_active_matching_mode_accepted() {
        let mut h = harness(sgw_role());
        h.endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Override))
            .unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_peer(&asp, AspState::Inactive);

        h.handler
            .on_message(&asp_active(Some(vec![100]), Some(TrafficModeType::Override)));

        assert!(matches!(
            h.rx.try_recv().unwrap(),
            M3uaMessage::AspActiveAck { .. }
        ));
        assert_eq!(asp.peer_state(), Some(AspState::Active));
    }

    #[test]
    fn test_asp_active_partial_routing_context_fanout() {
        let mut h = harness(sgw_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_peer(&asp, AspState::Inactive);

        // R1 valid, R2 invalid: one Error for R2, asp for R1 still activated
        h.handler.on_message(&asp_active(Some(vec![100, 200]), None));

        assert_eq!(asp.peer_state(), Some(AspState::Active));

        let mut acks = 0;
        let mut errors = Vec::new();
        while let Ok(msg) = h.rx.try_recv() {
            match msg {
                M3uaMessage::AspActiveAck { .. } => acks += 1,
                M3uaMessage::Error {
                    error_code,
                    routing_context,
                    ..
                } => errors.push((error_code, routing_context)),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(acks, 1);
        assert_eq!(
            errors,
            vec![(ErrorCode::InvalidRoutingContext, Some(vec![200]))]
        );
    }

    #[test]
    fn test_asp_active_ineligible_role_unexpected_message() {
        let mut h = harness(ipsp_se_client_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_peer(&asp, AspState::Inactive);

        h.handler.on_message(&asp_active(Some(vec![100]), None));

        match h.rx.try_recv().unwrap() {
            M3uaMessage::Error {
                error_code,
                routing_context,
                ..
            } => {
                assert_eq!(error_code, ErrorCode::UnexpectedMessage);
                assert!(routing_context.is_none());
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(asp.peer_state(), Some(AspState::Inactive));
    }

    #[test]
    fn test_asp_active_null_rc_without_binding_drops_silently() {
        let mut h = harness(sgw_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        h.endpoint.create_asp("asp1", "as1").unwrap();

        // no ASP bound to the null routing context: no Error either, the
        // event has no addressable target
        h.handler.on_message(&asp_active(None, None));
        assert!(h.rx.try_recv().is_err());
    }

    #[test]
    fn test_asp_active_ack_as_role_sets_default_mode() {
        let h = harness(as_de_role());
        h.endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Override))
            .unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_local(&asp, AspState::Inactive);

        h.handler.on_message(&asp_active_ack(Some(vec![100]), None));

        let app_server = h.endpoint.app_server("as1").unwrap();
        // effective mode falls back to the AS default
        assert_eq!(app_server.traffic_mode(), Some(TrafficModeType::Override));
        assert_eq!(
            asp.local_fsm().unwrap().state(),
            AspState::Active.as_str()
        );
        // not IPSP: no AS peer transition synthesized
        assert_eq!(app_server.peer_state(), Some(AsState::Down));
    }

    #[test]
    fn test_asp_active_ack_ipsp_synthesizes_as_transition() {
        let h = harness(ipsp_se_client_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_local(&asp, AspState::Inactive);

        h.handler
            .on_message(&asp_active_ack(Some(vec![100]), Some(TrafficModeType::Override)));

        let app_server = h.endpoint.app_server("as1").unwrap();
        assert_eq!(app_server.traffic_mode(), Some(TrafficModeType::Override));
        assert_eq!(asp.local_fsm().unwrap().state(), AspState::Active.as_str());
        // no Notify will arrive on IPSP, the AS peer FSM moved inline
        assert_eq!(app_server.peer_state(), Some(AsState::Active));
    }

    #[test]
    fn test_asp_active_ack_discarded_when_stopped() {
        let h = harness(ipsp_se_client_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_local(&asp, AspState::Inactive);
        h.endpoint.stop();

        h.handler.on_message(&asp_active_ack(Some(vec![100]), None));

        assert_eq!(
            asp.local_fsm().unwrap().state(),
            AspState::Inactive.as_str()
        );
        assert!(h.endpoint.app_server("as1").unwrap().traffic_mode().is_none());
    }

    #[test]
    fn test_asp_active_ack_ineligible_role_unexpected_message() {
        let mut h = harness(sgw_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        h.endpoint.create_asp("asp1", "as1").unwrap();

        h.handler.on_message(&asp_active_ack(Some(vec![100]), None));

        match h.rx.try_recv().unwrap() {
            M3uaMessage::Error {
                error_code,
                routing_context,
                ..
            } => {
                assert_eq!(error_code, ErrorCode::UnexpectedMessage);
                assert_eq!(routing_context, Some(vec![100]));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_asp_active_ack_unknown_rc_skipped_without_error() {
        let mut h = harness(as_de_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_local(&asp, AspState::Inactive);

        h.handler.on_message(&asp_active_ack(Some(vec![999, 100]), None));

        // the unknown id is skipped, the valid one still lands, no Error
        assert_eq!(asp.local_fsm().unwrap().state(), AspState::Active.as_str());
        assert!(h.rx.try_recv().is_err());
    }

    #[test]
    fn test_asp_inactive_ack_unknown_rc_gets_error() {
        let mut h = harness(as_de_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_local(&asp, AspState::Active);

        h.handler.on_message(&asp_inactive_ack(Some(vec![999, 100])));

        // unlike the Active-Ack path, an unknown id here is error-reported,
        // and the valid one still lands
        match h.rx.try_recv().unwrap() {
            M3uaMessage::Error {
                error_code,
                routing_context,
                ..
            } => {
                assert_eq!(error_code, ErrorCode::InvalidRoutingContext);
                assert_eq!(routing_context, Some(vec![999]));
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert!(h.rx.try_recv().is_err());
        assert_eq!(
            asp.local_fsm().unwrap().state(),
            AspState::Inactive.as_str()
        );
    }

    #[test]
    fn test_asp_inactive_acks_then_degrades_as() {
        let mut h = harness(sgw_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        let asp = h.endpoint.create_asp("asp1", "as1").unwrap();
        arm_peer(&asp, AspState::Inactive);
        h.handler.on_message(&asp_active(Some(vec![100]), None));
        let _ack = h.rx.try_recv().unwrap();

        h.handler.on_message(&asp_inactive(Some(vec![100])));

        match h.rx.try_recv().unwrap() {
            M3uaMessage::AspInactiveAck {
                routing_context, ..
            } => assert_eq!(routing_context, Some(vec![100])),
            other => panic!("expected ASP INACTIVE ACK, got {other:?}"),
        }
        assert_eq!(asp.peer_state(), Some(AspState::Inactive));
        let app_server = h.endpoint.app_server("as1").unwrap();
        // only member went inactive: the AS drops to Pending
        assert_eq!(app_server.local_state(), Some(AsState::Pending));
    }

    #[test]
    fn test_asp_inactive_multi_rc_fanout() {
        let mut h = harness(sgw_role());
        h.endpoint.create_app_server("as1", Some(vec![100]), None).unwrap();
        h.endpoint.create_app_server("as2", Some(vec![200]), None).unwrap();
        let asp1 = h.endpoint.create_asp("asp1", "as1").unwrap();
        let asp2 = h.endpoint.create_asp("asp2", "as2").unwrap();
        for asp in [&asp1, &asp2] {
            arm_peer(asp, AspState::Active);
        }

        h.handler.on_message(&asp_inactive(Some(vec![100, 200])));

        assert_eq!(asp1.peer_state(), Some(AspState::Inactive));
        assert_eq!(asp2.peer_state(), Some(AspState::Inactive));
        let mut acks = 0;
        while let Ok(msg) = h.rx.try_recv() {
            assert!(matches!(msg, M3uaMessage::AspInactiveAck { .. }));
            acks += 1;
        }
        assert_eq!(acks, 2);
    }

    #[test]
    fn test_loadshare_quorum_suppresses_as_degrade() {
        let h = harness(ipsp_se_client_role());
        let app_server = h
            .endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Loadshare))
            .unwrap();
        let b = h.endpoint.create_asp("b", "as1").unwrap();
        // sibling member served by another association, attached directly
        let a = Asp::new("a", &app_server, h.endpoint.role());
        app_server.add_member(a.clone());

        arm_peer(&a, AspState::Active);
        arm_peer(&b, AspState::Active);
        arm_local(&b, AspState::Active);
        app_server
            .peer_fsm()
            .unwrap()
            .signal(FsmEvent::AsStateChangeActive)
            .unwrap();

        h.handler.on_message(&asp_inactive_ack(Some(vec![100])));

        assert_eq!(b.local_fsm().unwrap().state(), AspState::Inactive.as_str());
        // sibling a is still Active: the AS-level transition is suppressed
        assert_eq!(app_server.peer_state(), Some(AsState::Active));
    }

    #[test]
    fn test_no_quorum_moves_as_peer_to_pending() {
        let h = harness(ipsp_se_client_role());
        let app_server = h
            .endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Loadshare))
            .unwrap();
        let b = h.endpoint.create_asp("b", "as1").unwrap();
        let a = Asp::new("a", &app_server, h.endpoint.role());
        app_server.add_member(a.clone());

        arm_peer(&a, AspState::Inactive);
        arm_peer(&b, AspState::Inactive);
        arm_local(&b, AspState::Active);
        app_server
            .peer_fsm()
            .unwrap()
            .signal(FsmEvent::AsStateChangeActive)
            .unwrap();

        h.handler.on_message(&asp_inactive_ack(Some(vec![100])));

        // pending, not down: the AS survives for reactivation
        assert_eq!(app_server.peer_state(), Some(AsState::Pending));
    }

    #[test]
    fn test_quorum_holds_across_repeated_acks() {
        let h = harness(ipsp_se_client_role());
        let app_server = h
            .endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Loadshare))
            .unwrap();
        let b = h.endpoint.create_asp("b", "as1").unwrap();
        let a = Asp::new("a", &app_server, h.endpoint.role());
        app_server.add_member(a.clone());

        arm_peer(&a, AspState::Active);
        arm_peer(&b, AspState::Active);
        arm_local(&b, AspState::Inactive);
        app_server
            .peer_fsm()
            .unwrap()
            .signal(FsmEvent::AsStateChangeActive)
            .unwrap();

        // activate and deactivate b twice; sibling a keeps the quorum alive
        for _ in 0..2 {
            h.handler.on_message(&asp_active_ack(Some(vec![100]), None));
            h.handler.on_message(&asp_inactive_ack(Some(vec![100])));
            assert_eq!(app_server.peer_state(), Some(AsState::Active));
        }
    }

    #[test]
    fn test_override_mode_skips_quorum() {
        let h = harness(ipsp_se_client_role());
        let app_server = h
            .endpoint
            .create_app_server("as1", Some(vec![100]), Some(TrafficModeType::Override))
            .unwrap();
        let b = h.endpoint.create_asp("b", "as1").unwrap();
        let a = Asp::new("a", &app_server, h.endpoint.role());
        app_server.add_member(a.clone());

        // even with an Active sibling, Override does not keep the AS up
        arm_peer(&a, AspState::Active);
        arm_local(&b, AspState::Active);
        app_server
            .peer_fsm()
            .unwrap()
            .signal(FsmEvent::AsStateChangeActive)
            .unwrap();

        h.handler.on_message(&asp_inactive_ack(Some(vec![100])));
        assert_eq!(app_server.peer_state(), Some(AsState::Pending));
    }
}
