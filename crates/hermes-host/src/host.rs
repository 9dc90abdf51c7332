//! The in-memory host: dispatch and lifecycle.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use hermes_config::HermesConfig;
use hermes_core::{
    keys, BoxError, CallerIdentity, HandlerError, HostError, HostResult, InFlightTracker, Items,
    Resolver, ShutdownSignal,
};

use crate::completion::CompletionCell;
use crate::context::HostContext;
use crate::handler::{ConnectionHandler, HandlerRegistry};
use crate::request::{local_path_of, parse_target, FormData, SyntheticRequest};
use crate::response::SyntheticResponse;

/// Outcome of one dispatch.
pub type DispatchResult = HostResult<SyntheticResponse>;

/// A handler panicked instead of returning.
///
/// Reported to the caller as the source of [`HostError::HandlerFaulted`].
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanicked {
    message: String,
}

impl HandlerPanicked {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self { message }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Hosts connection handlers in memory and dispatches synthetic requests to them.
///
/// # Example
///
/// ```rust
/// use hermes_host::{FormData, HostContext, MemoryHost};
///
/// # #[tokio::main]
/// # async fn main() {
/// let host = MemoryHost::builder()
///     .route_fn("/echo", |ctx: HostContext| async move {
///         let msg = ctx.request().form_value("msg").unwrap_or_default().to_string();
///         ctx.response().write(msg)?;
///         Ok(())
///     })
///     .build();
///
/// let body = FormData::from([("msg".to_string(), "hi".to_string())]);
/// let response = host.post("/echo", |_| Ok(()), body).await.unwrap();
/// assert_eq!(response.read_as_string(), "hi");
///
/// host.dispose().unwrap();
/// # }
/// ```
pub struct MemoryHost {
    registry: Arc<HandlerRegistry>,
    resolver: Arc<Resolver>,
    shutdown: ShutdownSignal,
    disposed: AtomicBool,
    user: RwLock<CallerIdentity>,
    instance_name: String,
    disable_writes: bool,
    in_flight: InFlightTracker,
}

impl MemoryHost {
    /// Creates a host over `registry` with default settings.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self::builder().registry(registry).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> MemoryHostBuilder {
        MemoryHostBuilder::default()
    }

    /// Dispatches a synthetic request to the handler registered for `url`.
    ///
    /// Rejections happen synchronously, before any request is built, and are
    /// returned as an already-resolved future:
    /// 1. [`HostError::HostShutDown`] once [`dispose`](Self::dispose) has run
    /// 2. [`HostError::EndpointNotFound`] for an unparsable or non-hierarchical
    ///    URL, or when no handler serves its percent-decoded path
    /// 3. [`HostError::PreparationFailed`] if `prepare` returns an error
    ///
    /// Otherwise the handler is spawned and the returned future resolves
    /// exactly once with the response, the handler's fault, or a cancellation.
    /// Dropping the future before it resolves aborts the request.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn dispatch<P>(
        &self,
        url: &str,
        prepare: P,
        body: Option<FormData>,
        disable_writes: bool,
    ) -> DispatchFuture
    where
        P: FnOnce(&mut SyntheticRequest) -> Result<(), BoxError>,
    {
        if self.shutdown.is_requested() {
            warn!(instance = %self.instance_name, url, "Dispatch rejected: host is shut down");
            return DispatchFuture::ready(Err(HostError::HostShutDown));
        }

        let Some(target) = parse_target(url) else {
            warn!(instance = %self.instance_name, url, "Dispatch rejected: unroutable URL");
            return DispatchFuture::ready(Err(HostError::endpoint_not_found(url)));
        };
        let local_path = local_path_of(&target);
        let Some(handler) = self.registry.resolve(&local_path) else {
            warn!(instance = %self.instance_name, path = %local_path, "Dispatch rejected: no handler");
            return DispatchFuture::ready(Err(HostError::endpoint_not_found(local_path)));
        };

        let abort = CancellationToken::new();
        let mut request = SyntheticRequest::new(target, abort.clone(), body, self.user());
        if let Err(err) = prepare(&mut request) {
            warn!(
                instance = %self.instance_name,
                path = request.local_path(),
                error = %err,
                "Dispatch rejected: request preparation failed"
            );
            return DispatchFuture::ready(Err(HostError::preparation(err)));
        }

        let (cell, rx) = CompletionCell::new();
        let response = {
            let cell = Arc::clone(&cell);
            SyntheticResponse::new(
                abort.clone(),
                disable_writes,
                move |response: &SyntheticResponse| {
                    cell.try_resolve(Ok(response.clone()));
                },
            )
        };

        let items = Items::new();
        items.insert(keys::SHUTDOWN_TOKEN, self.shutdown.token());

        let span = tracing::info_span!(
            "dispatch",
            request_id = %request.request_id(),
            path = %request.local_path(),
            instance = %self.instance_name,
        );
        let method = request.method().clone();
        let ctx = HostContext::new(request, response.clone(), items);
        handler.initialize(&self.resolver, &ctx);

        let in_flight = self.in_flight.acquire();
        span.in_scope(|| debug!(%method, disable_writes, "Dispatching request"));

        tokio::spawn(
            async move {
                let _in_flight = in_flight;
                let result = run_handler(handler, ctx, &response).await;
                let resolved = cell.try_resolve(result);
                response.close();
                debug!(resolved_by_handler = resolved, "Dispatch complete");
            }
            .instrument(span),
        );

        DispatchFuture::pending(rx, abort)
    }

    /// Dispatches a GET request with no body.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn get<P>(&self, url: &str, prepare: P) -> DispatchFuture
    where
        P: FnOnce(&mut SyntheticRequest) -> Result<(), BoxError>,
    {
        self.dispatch(url, prepare, None, self.disable_writes)
    }

    /// Dispatches a POST request carrying `body` as form fields.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn post<P>(&self, url: &str, prepare: P, body: FormData) -> DispatchFuture
    where
        P: FnOnce(&mut SyntheticRequest) -> Result<(), BoxError>,
    {
        self.dispatch(url, prepare, Some(body), self.disable_writes)
    }

    /// Returns the identity attached to new requests.
    #[must_use]
    pub fn user(&self) -> CallerIdentity {
        self.user.read().clone()
    }

    /// Sets the identity attached to requests dispatched from now on.
    pub fn set_user(&self, user: CallerIdentity) {
        *self.user.write() = user;
    }

    /// Shuts the host down.
    ///
    /// Triggers the shutdown signal, so in-flight handlers observe it through
    /// their shutdown token and new dispatches fail with
    /// [`HostError::HostShutDown`], then releases the resolver. Only the first
    /// call does any work; concurrent and repeated calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ReleaseFailed`] to the first caller if a release
    /// hook failed.
    pub fn dispose(&self) -> HostResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.cancel();
        info!(
            instance = %self.instance_name,
            in_flight = self.in_flight.active(),
            "Memory host disposed"
        );
        self.resolver.release()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns the number of dispatches whose handler has not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.active()
    }

    /// Waits until no dispatch is in flight.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Returns a token cancelled when the host shuts down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.token()
    }

    /// Returns the instance name used in log spans.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Returns the default `disable_writes` used by [`get`](Self::get) and [`post`](Self::post).
    #[must_use]
    pub const fn writes_disabled_by_default(&self) -> bool {
        self.disable_writes
    }

    /// Returns the service resolver.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Returns the handler registry.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("instance_name", &self.instance_name)
            .field("registry", &self.registry)
            .field("disposed", &self.is_disposed())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryHost {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            error!(instance = %self.instance_name, error = %err, "Failed to dispose memory host");
        }
    }
}

async fn run_handler(
    handler: Arc<dyn ConnectionHandler>,
    ctx: HostContext,
    response: &SyntheticResponse,
) -> DispatchResult {
    let outcome = AssertUnwindSafe(async move { handler.process(ctx).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => Ok(response.clone()),
        Ok(Err(HandlerError::Cancelled)) => {
            debug!("Handler cancelled");
            Err(HostError::HandlerCancelled)
        }
        Ok(Err(HandlerError::Failed(err))) => {
            error!(error = %err, "Handler faulted");
            Err(HostError::HandlerFaulted(err))
        }
        Err(payload) => {
            let panicked = HandlerPanicked::from_payload(payload.as_ref());
            error!(error = %panicked, "Handler panicked");
            Err(HostError::HandlerFaulted(Box::new(panicked)))
        }
    }
}

/// Builder for [`MemoryHost`].
#[derive(Debug, Default)]
pub struct MemoryHostBuilder {
    registry: HandlerRegistry,
    resolver: Resolver,
    user: CallerIdentity,
    instance_name: Option<String>,
    disable_writes: bool,
}

impl MemoryHostBuilder {
    /// Registers a handler at `path`.
    #[must_use]
    pub fn route<H: ConnectionHandler>(mut self, path: &str, handler: H) -> Self {
        self.registry.register(path, handler);
        self
    }

    /// Registers an async closure at `path`.
    #[must_use]
    pub fn route_fn<F, Fut>(mut self, path: &str, func: F) -> Self
    where
        F: Fn(HostContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = hermes_core::HandlerResult> + Send + 'static,
    {
        self.registry.register_fn(path, func);
        self
    }

    /// Replaces the registry built so far.
    #[must_use]
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the service resolver released on dispose.
    #[must_use]
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Sets the initial caller identity.
    #[must_use]
    pub fn user(mut self, user: CallerIdentity) -> Self {
        self.user = user;
        self
    }

    /// Sets the instance name used in log spans.
    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Sets the default for `disable_writes` on [`MemoryHost::get`] and [`MemoryHost::post`].
    #[must_use]
    pub fn disable_writes(mut self, disable: bool) -> Self {
        self.disable_writes = disable;
        self
    }

    /// Applies the `[host]` section of a loaded configuration.
    #[must_use]
    pub fn config(mut self, config: &HermesConfig) -> Self {
        if let Some(name) = &config.host.instance_name {
            self.instance_name = Some(name.clone());
        }
        self.disable_writes = config.host.disable_writes;
        self
    }

    /// Builds the host.
    #[must_use]
    pub fn build(self) -> MemoryHost {
        let instance_name = self.instance_name.unwrap_or_else(default_instance_name);
        debug!(instance = %instance_name, routes = self.registry.len(), "Memory host created");

        MemoryHost {
            registry: Arc::new(self.registry),
            resolver: Arc::new(self.resolver),
            shutdown: ShutdownSignal::new(),
            disposed: AtomicBool::new(false),
            user: RwLock::new(self.user),
            instance_name,
            disable_writes: self.disable_writes,
            in_flight: InFlightTracker::new(),
        }
    }
}

fn default_instance_name() -> String {
    let process = std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "hermes".to_string());
    format!("{process}_{}", std::process::id())
}

/// Future returned by [`MemoryHost::dispatch`].
///
/// Resolves exactly once. Dropping it before it resolves aborts the request.
#[derive(Debug)]
#[must_use = "dropping a DispatchFuture aborts the request"]
pub struct DispatchFuture {
    state: DispatchState,
}

#[derive(Debug)]
enum DispatchState {
    Ready(Option<DispatchResult>),
    Pending {
        rx: oneshot::Receiver<DispatchResult>,
        abort: CancellationToken,
        done: bool,
    },
}

impl DispatchFuture {
    const fn ready(result: DispatchResult) -> Self {
        Self {
            state: DispatchState::Ready(Some(result)),
        }
    }

    const fn pending(rx: oneshot::Receiver<DispatchResult>, abort: CancellationToken) -> Self {
        Self {
            state: DispatchState::Pending {
                rx,
                abort,
                done: false,
            },
        }
    }

    /// Aborts the request. The future then resolves according to how the
    /// handler reacts.
    pub fn abort(&self) {
        if let DispatchState::Pending { abort, .. } = &self.state {
            abort.cancel();
        }
    }

    /// Returns `true` if the dispatch was rejected before a handler ran.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self.state, DispatchState::Ready(_))
    }
}

impl Future for DispatchFuture {
    type Output = DispatchResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            // Polling again after completion reports a cancellation.
            DispatchState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(HostError::HandlerCancelled)))
            }
            DispatchState::Pending { rx, done, .. } => {
                if *done {
                    return Poll::Ready(Err(HostError::HandlerCancelled));
                }
                match Pin::new(rx).poll(cx) {
                    Poll::Ready(result) => {
                        *done = true;
                        // The sender only vanishes if the runtime dropped the task.
                        Poll::Ready(result.unwrap_or(Err(HostError::HandlerCancelled)))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl Drop for DispatchFuture {
    fn drop(&mut self) {
        if let DispatchState::Pending { abort, done, .. } = &self.state {
            if !*done {
                abort.cancel();
            }
        }
    }
}
