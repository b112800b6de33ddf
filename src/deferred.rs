//! Work scheduled to run after a request's primary handling.
//!
//! Subsystems such as auditing or cache invalidation register deferred
//! entries against the current [`Request`]. Once the handler has produced
//! its response, the wrapping controller calls
//! [`execute_futures`](Request::execute_futures) for each scope it cares
//! about. Entries of one scope run concurrently, and a failing entry is
//! logged instead of reaching the original caller.

use crate::bounded::{BoxError, BoxFuture};
use crate::error::FutureError;
use crate::Request;

use std::any::Any;
use std::{fmt, mem};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use dashmap::DashMap;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};

/// The scope used when none is given.
pub const DEFAULT_SCOPE: &str = "";

type Run = Box<dyn FnOnce(Request) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

struct Entry {
    name: String,
    registered_at: SystemTime,
    // only taken out by value, the lock makes the entry `Sync`
    run: Mutex<Run>,
}

impl Entry {
    fn into_run(self) -> Run {
        self.run.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct ScopeKey {
    request: u64,
    scope: String,
}

/// A registry of deferred entries, keyed by request and scope.
///
/// One registry is typically created per process and shared by every
/// request through an `Arc`. Each `(request, scope)` pair is stored in its
/// own map slot, so unrelated requests never contend on a common lock.
#[derive(Default)]
pub struct FutureRegistry {
    scopes: DashMap<ScopeKey, Vec<Entry>>,
    // request key -> scopes that currently hold entries
    index: DashMap<u64, Vec<String>>,
}

/// A snapshot of the entries registered under one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FutureInfo {
    pub name: String,
    pub scope: String,
    /// How many entries share this name.
    pub count: usize,
    /// When the first of them was registered.
    pub registered_at: SystemTime,
}

impl FutureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deferred entry.
    ///
    /// Names need not be unique: every entry registered under a name runs.
    /// The closure receives the request it was registered for once the
    /// scope is executed.
    pub fn add<F, Fut, E>(&self, request: &Request, name: impl Into<String>, scope: &str, f: F)
    where
        F: FnOnce(Request) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let name = name.into();
        let run: Run = Box::new(
            move |request| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(async move { f(request).await.map_err(Into::into) })
            },
        );

        tracing::trace!(name = %name, scope = %scope, "registering deferred future");

        let key = ScopeKey {
            request: request.key(),
            scope: scope.to_owned(),
        };

        // lock order is always index, then scopes
        let mut scopes = self.index.entry(request.key()).or_default();

        self.scopes.entry(key).or_default().push(Entry {
            name,
            registered_at: SystemTime::now(),
            run: Mutex::new(run),
        });

        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_owned());
        }
    }

    /// Look up the entries registered under `name` in `scope`.
    pub fn get(&self, request: &Request, name: &str, scope: &str) -> Result<FutureInfo, FutureError> {
        let not_found = || FutureError::NotFound {
            name: name.to_owned(),
            scope: scope.to_owned(),
        };

        let entries = self
            .scopes
            .get(&ScopeKey {
                request: request.key(),
                scope: scope.to_owned(),
            })
            .ok_or_else(not_found)?;

        let mut matching = entries.iter().filter(|entry| entry.name == name);
        let first = matching.next().ok_or_else(not_found)?;

        Ok(FutureInfo {
            name: name.to_owned(),
            scope: scope.to_owned(),
            count: 1 + matching.count(),
            registered_at: first.registered_at,
        })
    }

    /// The number of entries waiting in `scope`.
    pub fn pending(&self, request: &Request, scope: &str) -> usize {
        self.scopes
            .get(&ScopeKey {
                request: request.key(),
                scope: scope.to_owned(),
            })
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Returns `true` if no request has pending entries.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Run every entry of `scope` in a new task.
    ///
    /// The entries are removed from the registry, so each one runs at most
    /// once. Other scopes are left untouched. The returned [`Execution`] may
    /// be awaited for a report or dropped to let the work finish in the
    /// background.
    pub fn execute(&self, request: &Request, scope: &str) -> Result<Execution, FutureError> {
        let handle = match request.runtime() {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| FutureError::NoRuntime)?,
        };

        let entries = self.take(request.key(), scope);

        tracing::debug!(
            request = %request.uid(),
            scope = %scope,
            count = entries.len(),
            "executing deferred futures"
        );

        let task = handle.spawn(run(request.clone(), scope.to_owned(), entries));
        Ok(Execution { task })
    }

    /// Discard every pending entry of `request`, in all scopes.
    ///
    /// Entries already handed to [`execute`](Self::execute) keep running.
    /// Returns the number of entries discarded.
    pub fn clear(&self, request: &Request) -> usize {
        self.discard(request.key())
    }

    pub(crate) fn discard(&self, request: u64) -> usize {
        let removed: Vec<Vec<Entry>> = match self.index.get_mut(&request) {
            Some(mut scopes) => mem::take(&mut *scopes)
                .into_iter()
                .filter_map(|scope| self.scopes.remove(&ScopeKey { request, scope }))
                .map(|(_, entries)| entries)
                .collect(),
            None => return 0,
        };

        self.index.remove_if(&request, |_, scopes| scopes.is_empty());

        // dropped outside the locks, entries may own other requests
        removed.iter().map(Vec::len).sum()
    }

    fn take(&self, request: u64, scope: &str) -> Vec<Entry> {
        let mut scopes = match self.index.get_mut(&request) {
            Some(scopes) => scopes,
            None => return Vec::new(),
        };

        let entries = self
            .scopes
            .remove(&ScopeKey {
                request,
                scope: scope.to_owned(),
            })
            .map(|(_, entries)| entries)
            .unwrap_or_default();

        scopes.retain(|s| s != scope);
        let emptied = scopes.is_empty();
        drop(scopes);

        if emptied {
            self.index.remove_if(&request, |_, scopes| scopes.is_empty());
        }

        entries
    }
}

impl fmt::Debug for FutureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureRegistry")
            .field("scopes", &self.scopes.len())
            .finish()
    }
}

async fn run(request: Request, scope: String, entries: Vec<Entry>) -> ExecutionReport {
    let mut set = JoinSet::new();

    for entry in entries {
        let request = request.clone();
        set.spawn(async move {
            let name = entry.name.clone();
            let fut = request.clone().scope((entry.into_run())(request));
            let result = AssertUnwindSafe(fut).catch_unwind().await;
            (name, result)
        });
    }

    let mut report = ExecutionReport {
        scope,
        succeeded: 0,
        failed: Vec::new(),
    };

    while let Some(joined) = set.join_next().await {
        let (name, error) = match joined {
            Ok((_, Ok(Ok(())))) => {
                report.succeeded += 1;
                continue;
            }
            Ok((name, Ok(Err(err)))) => (name, err.to_string()),
            Ok((name, Err(panic))) => (name, panic_message(panic)),
            Err(err) => ("<unknown>".to_owned(), err.to_string()),
        };

        tracing::error!(
            request = %request.uid(),
            scope = %report.scope,
            name = %name,
            error = %error,
            "deferred future failed"
        );

        report.failed.push(FailedFuture { name, error });
    }

    report
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_owned()
    }
}

/// A running execution of one scope.
#[derive(Debug)]
pub struct Execution {
    task: JoinHandle<ExecutionReport>,
}

impl Execution {
    /// Wait for every entry of the scope to finish.
    pub async fn wait(self) -> ExecutionReport {
        match self.task.await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "deferred execution task failed");
                ExecutionReport::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// The outcome of executing one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub scope: String,
    pub succeeded: usize,
    pub failed: Vec<FailedFuture>,
}

impl ExecutionReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFuture {
    pub name: String,
    pub error: String,
}
