use std::sync::Arc;

use tokio::sync::mpsc;

use super::{Dispatcher, HandlerFuture};
use crate::{
    registry::{CallRegistry, CallRoute},
    stream::Side,
    CallContext, CallStream, Frame, Status,
};

/// Turns `Open` frames into running calls.
///
/// Every accepted call gets a fresh context and stream, and runs as its own task.
/// Unrouted calls fail with `UNKNOWN` before any handler runs.
#[derive(Debug)]
pub(crate) struct CallAcceptor {
    dispatcher: Arc<Dispatcher>,
    outbound: mpsc::Sender<Frame>,
    calls: CallRegistry,
}

impl CallAcceptor {
    pub fn new(dispatcher: Arc<Dispatcher>, outbound: mpsc::Sender<Frame>, calls: CallRegistry) -> Self {
        Self {
            dispatcher,
            outbound,
            calls,
        }
    }

    pub fn accept(&mut self, open: Frame) {
        let call_id = open.call_id;
        let convention = open.convention();
        let Some((registered_convention, handler)) = self.dispatcher.lookup(&open.method) else {
            log::warn!("{call_id} unknown method {}", open.method);
            self.reject(call_id, Status::unknown(format!("unknown method {}", open.method)));
            return;
        };
        if registered_convention != convention {
            log::warn!(
                "{call_id} {} is {registered_convention}, but was called as {convention}",
                open.method
            );
            self.reject(
                call_id,
                Status::internal(format!(
                    "{} is {registered_convention}, but was called as {convention}",
                    open.method
                )),
            );
            return;
        }

        let context = match open.budget() {
            Some(budget) => CallContext::background().with_deadline(budget),
            None => CallContext::background(),
        };
        let (inbound_sender, inbound) = mpsc::unbounded_channel();
        let terminal = Arc::default();
        let route = CallRoute {
            inbound: inbound_sender,
            context: context.clone(),
            terminal: Arc::clone(&terminal),
        };
        if let Err(e) = self.calls.register(call_id, route) {
            log::error!("{call_id} could not accept call: {e}");
            return;
        }
        log::debug!("{call_id} accepted {convention} call to {}", open.method);

        let stream = CallStream::new(
            Side::Server,
            call_id,
            convention,
            context.clone(),
            self.outbound.clone(),
            self.calls.clone(),
            inbound,
            terminal,
        );
        let call = handler.call(context.clone(), stream);
        tokio::spawn(run_call(
            call_id,
            call,
            context,
            self.outbound.clone(),
            self.calls.clone(),
        ));
    }

    /// Fail a call that never reached a handler.
    fn reject(&self, call_id: u64, status: Status) {
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            if outbound.send(Frame::status(call_id, &status)).await.is_err() {
                log::debug!("{call_id} connection closed before rejection was sent");
            }
        });
    }
}

/// Drive one call to its terminal status, then report it.
///
/// The handler is polled before the context, so a handler that watches its
/// context sees the cancellation and reports it itself.
async fn run_call(
    call_id: u64,
    call: HandlerFuture,
    context: CallContext,
    outbound: mpsc::Sender<Frame>,
    calls: CallRegistry,
) {
    let status = tokio::select! {
        biased;
        outcome = call => match outcome {
            Ok(()) => Status::ok(),
            Err(status) => status,
        },
        cause = context.done() => {
            log::debug!("{call_id} handler stopped: {cause}");
            cause
        }
    };
    calls.remove(call_id);
    context.cancel(Status::canceled("call completed"));
    log::debug!("{call_id} completing with {status}");
    if outbound.send(Frame::status(call_id, &status)).await.is_err() {
        log::debug!("{call_id} connection closed before status was sent");
    }
}
