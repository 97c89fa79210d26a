use std::sync::Arc;

use tokio::sync::mpsc;

use super::{CallGuard, DirectionState, Side};
use crate::{registry::Inbound, Payload, Status};

/// The remote write direction of a call, as seen locally.
#[derive(Debug)]
pub struct StreamReceiver {
    guard: Arc<CallGuard>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    state: DirectionState,
    /// Once set, every later `recv` returns this: `Ok` for the end marker.
    outcome: Option<Result<(), Status>>,
}

enum Event {
    Inbound(Option<Inbound>),
    Done(Status),
}

impl StreamReceiver {
    pub(super) fn new(guard: Arc<CallGuard>, inbound: mpsc::UnboundedReceiver<Inbound>) -> Self {
        Self {
            guard,
            inbound,
            state: DirectionState::Open,
            outcome: None,
        }
    }

    /// State of this direction.
    pub fn state(&self) -> DirectionState {
        self.state
    }

    /// Wait for the next message.
    ///
    /// `Ok(None)` is the end marker: the peer finished sending. After the end marker or
    /// a failure, every later call returns the same result again. A failure is the
    /// call's status, or the context's cause if it is done first.
    pub async fn recv(&mut self) -> Result<Option<Payload>, Status> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone().map(|()| None);
        }
        if let Some(cause) = self.guard.context.err() {
            return Err(self.fail(cause));
        }

        let event = tokio::select! {
            biased;
            inbound = self.inbound.recv() => Event::Inbound(inbound),
            cause = self.guard.context.done() => Event::Done(cause),
        };
        match event {
            Event::Inbound(Some(Inbound::Message(payload))) => Ok(Some(payload)),
            Event::Inbound(Some(Inbound::End)) => {
                log::trace!("{} peer closed send", self.guard.call_id);
                self.end();
                Ok(None)
            }
            Event::Inbound(Some(Inbound::Status(status))) => {
                if status.is_ok() {
                    self.end();
                    Ok(None)
                } else {
                    Err(self.fail(status))
                }
            }
            Event::Inbound(None) => {
                let cause = self
                    .guard
                    .context
                    .err()
                    .unwrap_or_else(|| Status::internal("call is no longer routed"));
                Err(self.fail(cause))
            }
            Event::Done(cause) => Err(self.fail(cause)),
        }
    }

    /// Stop reading. Later `recv`s fail with `INTERNAL`, unless the stream already ended.
    ///
    /// A client that stops reading an unfinished call abandons it.
    pub fn close_recv(&mut self) {
        if self.outcome.is_none() {
            let cause = Status::canceled("receive closed");
            self.guard.abandon(&cause);
            self.outcome = Some(Err(Status::internal("recv after close_recv")));
        }
        self.state = DirectionState::Closed;
        self.inbound.close();
    }

    /// Record a terminal failure for this direction.
    pub(crate) fn fail(&mut self, cause: Status) -> Status {
        if self.guard.side == Side::Client {
            self.guard.abandon(&cause);
        }
        log::debug!("{} receive failed: {cause}", self.guard.call_id);
        self.state = DirectionState::Closed;
        self.outcome = Some(Err(cause.clone()));
        cause
    }

    fn end(&mut self) {
        self.state = DirectionState::Closed;
        self.outcome = Some(Ok(()));
    }
}
