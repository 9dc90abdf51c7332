//! Integration tests for host shutdown and teardown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hermes_config::ConfigLoader;
use hermes_core::{keys, HandlerError, HostError, Resolver};
use hermes_host::{CancelReason, HostContext, MemoryHost};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

/// Host with a `/watch` handler that reports why it was cancelled.
fn watch_host() -> (MemoryHost, mpsc::UnboundedReceiver<CancelReason>) {
    hermes_telemetry::init_test_logging();
    let (tx, rx) = mpsc::unbounded_channel();
    let host = MemoryHost::builder()
        .instance_name("lifecycle-tests")
        .route_fn("/watch", move |ctx: HostContext| {
            let tx = tx.clone();
            async move {
                let reason = ctx.cancelled().await;
                let _ = tx.send(reason);
                Err(HandlerError::Cancelled)
            }
        })
        .route_fn("/ok", |_ctx: HostContext| async { Ok(()) })
        .build();
    (host, rx)
}

#[tokio::test]
async fn test_dispatch_after_dispose() {
    let (host, _rx) = watch_host();
    host.dispose().unwrap();

    let pending = host.get("/ok", |_| Ok(()));
    assert!(pending.is_rejected());
    assert!(pending.await.unwrap_err().is_shutdown());
    assert!(host.is_disposed());
}

#[tokio::test]
async fn test_shutdown_check_precedes_routing() {
    let (host, _rx) = watch_host();
    host.dispose().unwrap();

    let err = host.get("/not-registered", |_| Ok(())).await.unwrap_err();
    assert!(matches!(err, HostError::HostShutDown));
}

#[tokio::test]
async fn test_concurrent_dispose_releases_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let mut resolver = Resolver::new();
    let counter = Arc::clone(&released);
    resolver.on_release("counter", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let host = Arc::new(MemoryHost::builder().resolver(resolver).build());
    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.dispose() })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(host.resolver().is_released());
}

#[tokio::test]
async fn test_release_failure_reported_once() {
    let mut resolver = Resolver::new();
    resolver.on_release("flaky", || Err("disk full".into()));
    let host = MemoryHost::builder().resolver(resolver).build();

    let err = host.dispose().unwrap_err();
    match err {
        HostError::ReleaseFailed { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].to_string(), "disk full");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(host.dispose().is_ok());
}

#[tokio::test]
async fn test_shutdown_reaches_in_flight_handler() {
    let (host, mut rx) = watch_host();
    let pending = host.get("/watch", |_| Ok(()));

    host.dispose().unwrap();

    let reason = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(reason, CancelReason::Shutdown);
    assert!(timeout(WAIT, pending).await.unwrap().unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_request_abort_leaves_host_running() {
    let (host, mut rx) = watch_host();
    let pending = host.get("/watch", |_| Ok(()));
    pending.abort();

    let reason = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(reason, CancelReason::Request);
    assert!(timeout(WAIT, pending).await.unwrap().unwrap_err().is_cancelled());

    assert!(!host.shutdown_token().is_cancelled());
    assert!(host.get("/ok", |_| Ok(())).await.is_ok());
}

#[tokio::test]
async fn test_dropped_future_aborts_request() {
    let (host, mut rx) = watch_host();
    drop(host.get("/watch", |_| Ok(())));

    let reason = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(reason, CancelReason::Request);
}

#[tokio::test]
async fn test_shutdown_token_in_items() {
    hermes_telemetry::init_test_logging();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let host = MemoryHost::builder()
        .route_fn("/items", move |ctx: HostContext| {
            let tx = tx.clone();
            async move {
                let token = ctx.items().get::<CancellationToken>(keys::SHUTDOWN_TOKEN);
                let _ = tx.send(token.map(|t| t.as_ref().clone()));
                Ok(())
            }
        })
        .build();

    host.get("/items", |_| Ok(())).await.unwrap();
    let token = rx.recv().await.unwrap().unwrap();

    assert!(!token.is_cancelled());
    host.dispose().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_wait_idle_after_dispose() {
    let (host, _rx) = watch_host();
    let first = host.get("/watch", |_| Ok(()));
    let second = host.get("/watch", |_| Ok(()));
    assert_eq!(host.in_flight(), 2);

    host.dispose().unwrap();
    timeout(WAIT, host.wait_idle()).await.unwrap();

    assert_eq!(host.in_flight(), 0);
    assert!(first.await.unwrap_err().is_cancelled());
    assert!(second.await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_drop_host_disposes() {
    let released = Arc::new(AtomicUsize::new(0));
    let mut resolver = Resolver::new();
    let counter = Arc::clone(&released);
    resolver.on_release("counter", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let host = MemoryHost::builder().resolver(resolver).build();
    let token = host.shutdown_token();
    drop(host);

    assert!(token.is_cancelled());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_host_from_config() {
    let config = ConfigLoader::new()
        .with_string(
            "[host]\ninstance_name = \"configured\"\ndisable_writes = true\n",
            "toml",
        )
        .unwrap()
        .load()
        .unwrap();

    let host = MemoryHost::builder()
        .config(&config)
        .route_fn("/say", |ctx: HostContext| async move {
            ctx.response().write("dropped")?;
            Ok(())
        })
        .build();

    assert_eq!(host.instance_name(), "configured");
    let response = host.get("/say", |_| Ok(())).await.unwrap();
    assert!(response.writes_disabled());
    assert!(response.body().is_empty());
    assert_eq!(response.bytes_written(), 7);
}
