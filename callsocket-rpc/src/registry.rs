use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, OnceLock},
};

use k_lock::Mutex;
use tokio::sync::mpsc;

use crate::{CallContext, Error, Payload, Status};

/// What the connection delivers to one call's read direction.
#[derive(Debug)]
pub(crate) enum Inbound {
    Message(Payload),
    /// The peer closed its send direction.
    End,
    /// The call's terminal status. `OK` ends the stream.
    Status(Status),
}

/// How the connection reaches one in-flight call.
#[derive(Debug)]
pub(crate) struct CallRoute {
    pub inbound: mpsc::UnboundedSender<Inbound>,
    pub context: CallContext,
    /// Set by the connection as soon as the terminal status is known.
    pub terminal: Arc<OnceLock<Status>>,
}

/// The in-flight calls of one connection, shared between the connection's
/// router and the calls themselves.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallRegistry {
    state: Arc<Mutex<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    calls: HashMap<u64, CallRoute>,
    closed: bool,
}

impl CallRegistry {
    // The mutex is held only for map operations. It can't be poisoned unless the allocator panics.
    #[allow(clippy::expect_used)]
    fn with_state<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        let mut state = self.state.lock().expect("brief internal mutex must work");
        f(&mut state)
    }

    /// Track a call. The route must be registered before the call's first frame is sent,
    /// or its replies could be missed.
    pub fn register(&self, call_id: u64, route: CallRoute) -> crate::Result<()> {
        self.with_state(|state| {
            if state.closed {
                return Err(Error::ConnectionIsClosed);
            }
            match state.calls.entry(call_id) {
                Entry::Occupied(_) => Err(Error::ProtocolViolation("call id is already in use")),
                Entry::Vacant(vacant) => {
                    vacant.insert(route);
                    Ok(())
                }
            }
        })
    }

    /// Hand an inbound item to a call. False when the call is not tracked or no longer reading.
    pub fn deliver(&self, call_id: u64, inbound: Inbound) -> bool {
        self.with_state(|state| match state.calls.get(&call_id) {
            Some(route) => route.inbound.send(inbound).is_ok(),
            None => false,
        })
    }

    pub fn remove(&self, call_id: u64) -> Option<CallRoute> {
        self.with_state(|state| state.calls.remove(&call_id))
    }

    /// Stop accepting calls and take every in-flight route.
    pub fn close(&self) -> Vec<(u64, CallRoute)> {
        self.with_state(|state| {
            state.closed = true;
            state.calls.drain().collect()
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.with_state(|state| state.calls.len())
    }
}
