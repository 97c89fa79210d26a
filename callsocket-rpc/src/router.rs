use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use callsocket::{MessageReactor, ReactorStatus};

use crate::{
    registry::{CallRegistry, Inbound},
    server::CallAcceptor,
    Frame, FrameKind, Status,
};

/// The message reactor of an rpc connection. It routes each inbound frame to its call.
///
/// When the connection ends, the router is dropped with it: every in-flight client
/// call fails with `INTERNAL`, and every in-flight server call's context is canceled.
#[derive(Debug)]
pub struct CallRouter {
    calls: CallRegistry,
    acceptor: Option<CallAcceptor>,
    is_alive: Arc<AtomicBool>,
}

impl CallRouter {
    pub(crate) fn client(calls: CallRegistry, is_alive: Arc<AtomicBool>) -> Self {
        Self {
            calls,
            acceptor: None,
            is_alive,
        }
    }

    pub(crate) fn server(calls: CallRegistry, acceptor: CallAcceptor) -> Self {
        Self {
            calls,
            acceptor: Some(acceptor),
            is_alive: Arc::new(AtomicBool::new(true)),
        }
    }

    fn is_server(&self) -> bool {
        self.acceptor.is_some()
    }

    fn on_status(&mut self, call_id: u64, status: Status) {
        match self.calls.remove(call_id) {
            Some(route) => {
                log::debug!("{call_id} completed: {status}");
                let _ = route.terminal.set(status.clone());
                if route.inbound.send(Inbound::Status(status)).is_err() {
                    log::trace!("{call_id} completed after its reader went away");
                }
            }
            None => log::debug!("{call_id} status for untracked call: {status}"),
        }
    }

    fn on_cancel(&mut self, call_id: u64, cause: Status) {
        match self.calls.remove(call_id) {
            Some(route) => {
                log::debug!("{call_id} canceled by client: {cause}");
                route.context.cancel(cause);
            }
            None => log::debug!("{call_id} cancel for untracked call"),
        }
    }
}

impl MessageReactor for CallRouter {
    type Inbound = Frame;

    fn on_inbound_message(&mut self, frame: Self::Inbound) -> ReactorStatus {
        let call_id = frame.call_id;
        let kind = match FrameKind::try_from(frame.kind) {
            Ok(kind) => kind,
            Err(e) => {
                log::warn!("{call_id} ignoring frame of unknown kind: {e:?}");
                return ReactorStatus::Continue;
            }
        };
        log::trace!("{call_id} inbound {kind:?}");
        match (kind, self.is_server()) {
            (FrameKind::Open, true) => {
                if let Some(acceptor) = self.acceptor.as_mut() {
                    acceptor.accept(frame);
                }
            }
            (FrameKind::Message, _) => {
                if !self.calls.deliver(call_id, Inbound::Message(frame.into_payload())) {
                    log::debug!("{call_id} dropping message for a call that is not reading");
                }
            }
            (FrameKind::CloseSend, true) => {
                if !self.calls.deliver(call_id, Inbound::End) {
                    log::debug!("{call_id} dropping close for a call that is not reading");
                }
            }
            (FrameKind::Cancel, true) => self.on_cancel(call_id, frame.to_status()),
            (FrameKind::Status, false) => self.on_status(call_id, frame.to_status()),
            (kind, is_server) => {
                log::warn!(
                    "{call_id} ignoring {kind:?} frame on the {} side",
                    if is_server { "server" } else { "client" }
                );
            }
        }
        ReactorStatus::Continue
    }
}

impl Drop for CallRouter {
    fn drop(&mut self) {
        self.is_alive.store(false, Ordering::Relaxed);
        let in_flight = self.calls.close();
        if !in_flight.is_empty() {
            log::info!("connection closed with {} calls in flight", in_flight.len());
        }
        let is_server = self.is_server();
        for (call_id, route) in in_flight {
            if is_server {
                route.context.cancel(Status::canceled("connection closed"));
            } else {
                let status = Status::internal("connection closed");
                log::debug!("{call_id} failed: {status}");
                let _ = route.terminal.set(status.clone());
                let _ = route.inbound.send(Inbound::Status(status));
            }
        }
    }
}
