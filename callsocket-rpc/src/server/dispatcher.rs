use std::{collections::HashMap, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use super::handlers;
use crate::{CallContext, CallStream, Convention, Error, MessageSink, MessageStream, Status};

/// The future a [`Handler`] returns for one call.
pub type HandlerFuture = BoxFuture<'static, Result<(), Status>>;

/// Runs one accepted call.
///
/// A handler is shared by every call to its method, concurrently, so it should not
/// hold per-call state. Returning `Ok` completes the call with `OK`; returning a
/// status completes it with that status.
pub trait Handler: Send + Sync + 'static {
    /// Start the call. The returned future runs as its own task.
    fn call(&self, context: CallContext, stream: CallStream) -> HandlerFuture;
}

impl<F> Handler for F
where
    F: Fn(CallContext, CallStream) -> HandlerFuture + Send + Sync + 'static,
{
    fn call(&self, context: CallContext, stream: CallStream) -> HandlerFuture {
        self(context, stream)
    }
}

struct DispatchEntry {
    convention: Convention,
    handler: Box<dyn Handler>,
}

/// The server's routing table, from method name to handler and calling convention.
///
/// Register every method before serving; the dispatcher is then shared immutably,
/// as an `Arc<Dispatcher>`, by every connection.
#[derive(Default)]
pub struct Dispatcher {
    methods: HashMap<String, DispatchEntry>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    /// An empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `method` to `handler`. Registering the same method twice is an error.
    pub fn register(
        &mut self,
        method: impl Into<String>,
        convention: Convention,
        handler: impl Handler,
    ) -> crate::Result<()> {
        let method = method.into();
        if self.methods.contains_key(&method) {
            log::error!("{method} is already registered");
            return Err(Error::DuplicateMethod(method));
        }
        log::debug!("registered {convention} method {method}");
        self.methods.insert(
            method,
            DispatchEntry {
                convention,
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    /// The convention and handler registered for `method`.
    pub fn lookup(&self, method: &str) -> Option<(Convention, &dyn Handler)> {
        self.methods
            .get(method)
            .map(|entry| (entry.convention, entry.handler.as_ref()))
    }

    /// Register a unary method: one request in, one response out.
    pub fn register_unary<Request, Response, F, Fut>(
        &mut self,
        method: impl Into<String>,
        handler: F,
    ) -> crate::Result<()>
    where
        Request: prost::Message + prost::Name + Default + Send + 'static,
        Response: prost::Message + prost::Name + Send + Sync + 'static,
        F: Fn(CallContext, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            method,
            Convention::Unary,
            move |context: CallContext, stream: CallStream| -> HandlerFuture {
                handlers::unary(handler.clone(), context, stream).boxed()
            },
        )
    }

    /// Register a server-streaming method: one request in, a stream of responses out.
    pub fn register_server_streaming<Request, Response, F, Fut>(
        &mut self,
        method: impl Into<String>,
        handler: F,
    ) -> crate::Result<()>
    where
        Request: prost::Message + prost::Name + Default + Send + 'static,
        Response: prost::Message + prost::Name + Send + Sync + 'static,
        F: Fn(CallContext, Request, MessageSink<Response>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            method,
            Convention::ServerStreaming,
            move |context: CallContext, stream: CallStream| -> HandlerFuture {
                handlers::server_streaming(handler.clone(), context, stream).boxed()
            },
        )
    }

    /// Register a client-streaming method: a stream of requests in, one response out.
    pub fn register_client_streaming<Request, Response, F, Fut>(
        &mut self,
        method: impl Into<String>,
        handler: F,
    ) -> crate::Result<()>
    where
        Request: prost::Message + prost::Name + Default + Send + 'static,
        Response: prost::Message + prost::Name + Send + Sync + 'static,
        F: Fn(CallContext, MessageStream<Request>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            method,
            Convention::ClientStreaming,
            move |context: CallContext, stream: CallStream| -> HandlerFuture {
                handlers::client_streaming(handler.clone(), context, stream).boxed()
            },
        )
    }

    /// Register a bidi-streaming method: independent streams of requests and responses.
    pub fn register_bidi_streaming<Request, Response, F, Fut>(
        &mut self,
        method: impl Into<String>,
        handler: F,
    ) -> crate::Result<()>
    where
        Request: prost::Message + prost::Name + Default + Send + 'static,
        Response: prost::Message + prost::Name + Send + Sync + 'static,
        F: Fn(CallContext, MessageStream<Request>, MessageSink<Response>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register(
            method,
            Convention::BidiStreaming,
            move |context: CallContext, stream: CallStream| -> HandlerFuture {
                handlers::bidi_streaming(handler.clone(), context, stream).boxed()
            },
        )
    }
}
