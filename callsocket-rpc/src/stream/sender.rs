use std::sync::Arc;

use super::{CallGuard, DirectionState, Side};
use crate::{CallContext, Frame, Payload, Status};

/// The local write direction of a call.
#[derive(Debug)]
pub struct StreamSender {
    guard: Arc<CallGuard>,
    state: DirectionState,
}

impl StreamSender {
    pub(super) fn new(guard: Arc<CallGuard>) -> Self {
        Self {
            guard,
            state: DirectionState::Open,
        }
    }

    pub(crate) fn context(&self) -> &CallContext {
        &self.guard.context
    }

    /// State of this direction.
    pub fn state(&self) -> DirectionState {
        self.state
    }

    /// Send one message to the peer. Messages arrive in the order they are sent.
    ///
    /// Fails with `INTERNAL` after `close_send`, with the context's cause once it is
    /// done, or with the call's status once it has completed. Waits while the
    /// connection's outbound queue is full.
    pub async fn send(&mut self, payload: Payload) -> Result<(), Status> {
        if self.state != DirectionState::Open {
            return Err(Status::internal("send after close_send"));
        }
        self.guard.check_live()?;

        let call_id = self.guard.call_id;
        let frame = Frame::message(call_id, payload);
        let sent = tokio::select! {
            biased;
            cause = self.guard.context.done() => Err(cause),
            sent = self.guard.outbound.send(frame) => Ok(sent),
        };
        match sent {
            Ok(Ok(())) => {
                log::trace!("{call_id} sent message");
                Ok(())
            }
            Ok(Err(_closed)) => {
                self.state = DirectionState::Closed;
                Err(Status::internal("connection closed"))
            }
            Err(cause) => {
                self.guard.abandon(&cause);
                Err(cause)
            }
        }
    }

    /// Signal that no more messages will be sent. Does not wait for the peer to read.
    ///
    /// Idempotent: calling it again does nothing.
    pub async fn close_send(&mut self) -> Result<(), Status> {
        if self.state != DirectionState::Open {
            return Ok(());
        }
        self.state = DirectionState::HalfClosed;
        // The server's end of stream is its trailing status, sent when the handler finishes.
        if self.guard.side == Side::Server || self.guard.terminal.get().is_some() {
            return Ok(());
        }
        let call_id = self.guard.call_id;
        log::trace!("{call_id} closing send");
        self.guard
            .outbound
            .send(Frame::close_send(call_id))
            .await
            .map_err(|_closed| Status::internal("connection closed"))
    }
}
