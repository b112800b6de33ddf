use super::{lock, Request};
use crate::error::KeyNotFound;

use std::any::Any;
use std::sync::Arc;

/// A value stored in the request state.
pub type StateValue = Arc<dyn Any + Send + Sync>;

/// Free-form key/value storage that lives as long as the request.
///
/// Handlers and wrappers use it to pass data along within one request.
impl Request {
    /// Store `value` under `key`, returning the value it replaced.
    pub fn set<T>(&self, key: impl Into<String>, value: T) -> Option<StateValue>
    where
        T: Any + Send + Sync,
    {
        lock(&self.shared.state).insert(key.into(), Arc::new(value))
    }

    /// Returns the value stored under `key`, if it has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.get_any(key)?.downcast::<T>().ok()
    }

    pub fn get_any(&self, key: &str) -> Option<StateValue> {
        lock(&self.shared.state).get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.shared.state).contains_key(key)
    }

    /// Remove `key` from the state.
    pub fn delete(&self, key: &str) -> Result<StateValue, KeyNotFound> {
        lock(&self.shared.state)
            .remove(key)
            .ok_or_else(|| KeyNotFound(key.to_owned()))
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.state).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shared.state).is_empty()
    }

    /// The keys currently set, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.shared.state).keys().cloned().collect()
    }
}
