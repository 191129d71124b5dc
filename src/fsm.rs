//! Generic finite state machine
//!
//! Named states, a mutable attribute bag and transition dispatch. Each entity
//! (ASP or AS) owns its own instances; `signal` is a monitor, so concurrent
//! signals to one machine are mutually exclusive and every call fully
//! completes before returning.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;

use crate::errors::FsmError;

/// Attribute key for the message that triggered the transition
pub const ATTR_MESSAGE: &str = "message";
/// Attribute key for the ASP that triggered an AS-level transition
pub const ATTR_ASP: &str = "asp";

/// Events the traffic-maintenance machines are driven by.
///
/// ASP-Up/Down events belong to the state-maintenance handler; they are part
/// of the shared lifecycle the machines model, so they are declared here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsmEvent {
    AspUp,
    AspUpAck,
    AspDown,
    AspDownAck,
    AspActive,
    AspActiveAck,
    AspInactive,
    AspInactiveAck,
    AsStateChangeActive,
    AsStateChangePending,
}

impl fmt::Display for FsmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AspUp => "ASP_UP",
            Self::AspUpAck => "ASP_UP_ACK",
            Self::AspDown => "ASP_DOWN",
            Self::AspDownAck => "ASP_DOWN_ACK",
            Self::AspActive => "ASP_ACTIVE",
            Self::AspActiveAck => "ASP_ACTIVE_ACK",
            Self::AspInactive => "ASP_INACTIVE",
            Self::AspInactiveAck => "ASP_INACTIVE_ACK",
            Self::AsStateChangeActive => "AS_STATE_CHANGE_ACTIVE",
            Self::AsStateChangePending => "AS_STATE_CHANGE_PENDING",
        };
        write!(f, "{name}")
    }
}

/// Attribute bag passed to transition actions
pub type AttrBag = HashMap<&'static str, Box<dyn Any + Send>>;

/// Action run while the transition executes. Returning `Ok(Some(state))`
/// overrides the registered destination state.
pub type TransitionAction =
    Box<dyn Fn(&mut AttrBag) -> Result<Option<&'static str>, FsmError> + Send + Sync>;

struct Transition {
    to: &'static str,
    action: Option<TransitionAction>,
}

struct Inner {
    state: &'static str,
    attrs: AttrBag,
}

/// A named state machine with a monitor around its mutable state.
///
/// The transition table is built at construction time and immutable
/// afterwards, so lookups run without the lock.
pub struct Fsm {
    name: String,
    transitions: HashMap<(&'static str, FsmEvent), Transition>,
    inner: Mutex<Inner>,
}

impl Fsm {
    pub fn new(name: impl Into<String>, initial: &'static str) -> Self {
        Self {
            name: name.into(),
            transitions: HashMap::new(),
            inner: Mutex::new(Inner {
                state: initial,
                attrs: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a transition from `from` to `to` on `event`
    pub fn transition(&mut self, from: &'static str, event: FsmEvent, to: &'static str) {
        self.transitions
            .insert((from, event), Transition { to, action: None });
    }

    /// Register a transition whose action may redirect the destination state
    pub fn transition_with(
        &mut self,
        from: &'static str,
        event: FsmEvent,
        to: &'static str,
        action: TransitionAction,
    ) {
        self.transitions.insert(
            (from, event),
            Transition {
                to,
                action: Some(action),
            },
        );
    }

    /// Current state name
    pub fn state(&self) -> &'static str {
        self.inner.lock().state
    }

    /// Store an attribute for the next transition action to read
    pub fn set_attribute<T: Any + Send>(&self, key: &'static str, value: T) {
        self.inner.lock().attrs.insert(key, Box::new(value));
    }

    /// Drive the machine with `event`. Fails with
    /// [`FsmError::UnknownTransition`] when nothing is registered for the
    /// current (state, event) pair, leaving the state untouched.
    pub fn signal(&self, event: FsmEvent) -> Result<(), FsmError> {
        let mut inner = self.inner.lock();

        let transition = self.transitions.get(&(inner.state, event)).ok_or_else(|| {
            FsmError::UnknownTransition {
                fsm: self.name.clone(),
                state: inner.state,
                event,
            }
        })?;

        let mut next = transition.to;
        if let Some(action) = &transition.action {
            if let Some(redirect) = action(&mut inner.attrs)? {
                next = redirect;
            }
        }

        debug!(fsm = %self.name, from = inner.state, to = next, event = %event, "transition");
        inner.state = next;
        Ok(())
    }
}

/// Read a typed attribute out of the bag, for use inside transition actions
pub fn attribute<'a, T: Any>(attrs: &'a AttrBag, key: &'static str) -> Result<&'a T, FsmError> {
    attrs
        .get(key)
        .and_then(|v| v.downcast_ref::<T>())
        .ok_or(FsmError::MissingAttribute { key })
}
