use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use futures_core::Stream;

/// An dynamically typed [`Future`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An dynamically typed [`Stream`].
///
/// Payload streams are only ever polled behind a lock, so
/// they need not be `Sync`.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// An dynamically typed [`Error`].
pub type BoxError = Box<dyn Error + Send + Sync>;
