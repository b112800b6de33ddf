//! The request being handled by the current task.
//!
//! A [`Request`] is published with [`Request::scope`] (or
//! [`Request::sync_scope`] for synchronous code) and can then be fetched
//! anywhere below that call with [`current`]. Nested scopes shadow the outer
//! binding, and the outer binding comes back when the inner scope finishes,
//! whether it returned, failed, panicked or was dropped mid-poll.

use crate::Request;

use std::future::Future;

tokio::task_local! {
    // per task, not per thread
    static CURRENT: Request;
}

/// Returns the request bound to the current task, if any.
pub fn current() -> Option<Request> {
    CURRENT.try_with(Request::clone).ok()
}

/// Run `f` with a reference to the current request, if any.
pub fn with_current<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Request) -> R,
{
    CURRENT.try_with(f).ok()
}

impl Request {
    /// Run `fut` with this request published as the current request.
    pub fn scope<F>(self, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        CURRENT.scope(self, fut)
    }

    /// Run `f` with this request published as the current request.
    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(self, f)
    }
}
