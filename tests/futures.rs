use bramble::error::FutureError;
use bramble::{FutureRegistry, Request, DEFAULT_SCOPE};

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{ready, Ready};

fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl FnOnce(Request) -> Ready<io::Result<()>> + Send + 'static {
    let counter = counter.clone();
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        ready(Ok(()))
    }
}

#[tokio::test]
async fn same_name_entries_all_run() {
    let request = Request::builder().build();
    let ran = Arc::new(AtomicUsize::new(0));

    request.add_future("a", "x", counting(&ran));
    request.add_future("a", "x", counting(&ran));

    let info = request.get_future("a", "x").unwrap();
    assert_eq!(info.count, 2);
    assert_eq!(info.scope, "x");

    let report = request.execute_futures("x").unwrap().wait().await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.total(), 2);
    assert_eq!(ran.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn other_scopes_are_untouched() {
    let request = Request::builder().build();
    let x = Arc::new(AtomicUsize::new(0));
    let y = Arc::new(AtomicUsize::new(0));

    request.add_future("a", "x", counting(&x));
    request.add_future("b", "y", counting(&y));

    request.execute_futures("x").unwrap().wait().await;

    assert_eq!(x.load(Ordering::SeqCst), 1);
    assert_eq!(y.load(Ordering::SeqCst), 0);
    assert_eq!(request.registry().pending(&request, "y"), 1);

    request.execute_futures("y").unwrap().wait().await;
    assert_eq!(y.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failures_are_isolated() {
    let request = Request::builder().build();
    let ran = Arc::new(AtomicUsize::new(0));

    request.add_future("fails", "x", |_| async {
        Err(io::Error::new(io::ErrorKind::Other, "boom"))
    });
    request.add_future("panics", "x", |_| async {
        if true {
            panic!("kaboom");
        }
        Ok::<_, io::Error>(())
    });
    request.add_future("ok", "x", counting(&ran));

    let report = request.execute_futures("x").unwrap().wait().await;

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed.len(), 2);

    let mut failed: Vec<_> = report
        .failed
        .iter()
        .map(|f| (f.name.as_str(), f.error.as_str()))
        .collect();
    failed.sort();
    assert_eq!(failed, [("fails", "boom"), ("panics", "panicked: kaboom")]);
}

#[tokio::test]
async fn entries_run_at_most_once() {
    let request = Request::builder().build();
    let ran = Arc::new(AtomicUsize::new(0));

    request.add_future("a", DEFAULT_SCOPE, counting(&ran));

    request.execute_default_futures().unwrap().wait().await;
    let report = request.execute_default_futures().unwrap().wait().await;

    assert_eq!(report.total(), 0);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(matches!(
        request.get_future("a", DEFAULT_SCOPE),
        Err(FutureError::NotFound { .. })
    ));
}

#[tokio::test]
async fn entries_see_their_request() {
    let request = Request::builder().path("/orders").build();
    let (tx, rx) = tokio::sync::oneshot::channel();

    request.add_future("audit", DEFAULT_SCOPE, move |req: Request| async move {
        let current = bramble::current().map(|c| c == req);
        let _ = tx.send((req.path().to_owned(), current));
        Ok::<_, io::Error>(())
    });

    request.execute_default_futures().unwrap();
    assert_eq!(rx.await.unwrap(), ("/orders".to_owned(), Some(true)));
}

#[tokio::test]
async fn execution_runs_without_waiting() {
    let request = Request::builder().build();
    let (tx, rx) = tokio::sync::oneshot::channel();

    request.add_future("a", DEFAULT_SCOPE, move |_| async move {
        let _ = tx.send(());
        Ok::<_, io::Error>(())
    });

    drop(request.execute_default_futures().unwrap());
    drop(request);

    rx.await.unwrap();
}

#[tokio::test]
async fn get_future_not_found() {
    let request = Request::builder().build();
    request.add_future("a", "x", |_| async { Ok::<_, io::Error>(()) });

    assert_eq!(
        request.get_future("b", "x"),
        Err(FutureError::NotFound {
            name: "b".to_owned(),
            scope: "x".to_owned(),
        })
    );
    assert!(request.get_future("a", "y").is_err());
}

#[tokio::test]
async fn clear_discards_every_scope() {
    let request = Request::builder().build();
    let ran = Arc::new(AtomicUsize::new(0));

    request.add_future("a", DEFAULT_SCOPE, counting(&ran));
    request.add_future("b", "x", counting(&ran));
    request.add_future("c", "x", counting(&ran));

    assert_eq!(request.clear_futures(), 3);
    assert_eq!(request.clear_futures(), 0);

    let report = request.execute_futures("x").unwrap().wait().await;
    assert_eq!(report.total(), 0);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn shared_registry_is_keyed_by_request() {
    let registry = Arc::new(FutureRegistry::new());
    let a = Request::builder().registry(registry.clone()).build();
    let b = Request::builder().registry(registry.clone()).build();
    let ran = Arc::new(AtomicUsize::new(0));

    a.add_future("job", "x", counting(&ran));
    b.add_future("job", "x", counting(&ran));

    assert_eq!(a.clear_futures(), 1);
    assert_eq!(registry.pending(&b, "x"), 1);

    b.execute_futures("x").unwrap().wait().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn dropping_request_discards_pending() {
    let registry = Arc::new(FutureRegistry::new());
    let request = Request::builder().registry(registry.clone()).build();

    request.add_future("a", "x", |_| async { Ok::<_, io::Error>(()) });
    assert!(!registry.is_empty());

    drop(request);
    assert!(registry.is_empty());
}

#[test]
fn execute_needs_a_runtime() {
    let request = Request::builder().build();
    request.add_future("a", DEFAULT_SCOPE, |_| async { Ok::<_, io::Error>(()) });

    assert_eq!(
        request.execute_default_futures().unwrap_err(),
        FutureError::NoRuntime
    );
}

#[test]
fn explicit_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let request = Request::builder().runtime(runtime.handle().clone()).build();
    let ran = Arc::new(AtomicUsize::new(0));

    request.add_future("a", DEFAULT_SCOPE, counting(&ran));

    let execution = request.execute_default_futures().unwrap();
    let report = runtime.block_on(execution.wait());

    assert_eq!(report.succeeded, 1);
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn requests_cross_threads() {
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<Request>();
    assert_send_sync::<FutureRegistry>();
    assert_send_sync::<bramble::Execution>();
}

#[tokio::test]
async fn scope_entries_run_concurrently() {
    let request = Request::builder().build();
    let barrier = Arc::new(tokio::sync::Barrier::new(2));

    for name in ["left", "right"] {
        let barrier = barrier.clone();
        request.add_future(name, "x", move |_| async move {
            barrier.wait().await;
            Ok::<_, io::Error>(())
        });
    }

    let execution = request.execute_futures("x").unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), execution.wait())
        .await
        .expect("entries of one scope should not run one after another");

    assert_eq!(report.succeeded, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_add_and_take_stay_consistent() {
    let registry = Arc::new(FutureRegistry::new());
    let request = Request::builder().registry(registry.clone()).build();

    let adders: Vec<_> = (0..4)
        .map(|_| {
            let request = request.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    request.add_future("job", "x", |_| async { Ok::<_, io::Error>(()) });
                }
            })
        })
        .collect();

    let takers: Vec<_> = (0..2)
        .map(|i| {
            let request = request.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    if i == 0 {
                        drop(request.execute_futures("x").unwrap());
                    } else {
                        request.clear_futures();
                    }
                }
            })
        })
        .collect();

    for thread in adders.into_iter().chain(takers) {
        thread.join().unwrap();
    }

    // whatever is left must still be reachable through the request
    request.clear_futures();
    assert_eq!(registry.pending(&request, "x"), 0);
    assert!(registry.is_empty());
}
