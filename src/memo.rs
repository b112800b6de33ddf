use once_cell::sync::OnceCell;

use std::fmt;

/// A value computed on first access and kept for the owner's lifetime.
///
/// Concurrent first readers block until the single computation finishes,
/// and all of them observe the stored value.
pub struct Memo<T> {
    cell: OnceCell<T>,
}

impl<T> Memo<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Returns the stored value, computing it with `f` if this is the first access.
    pub fn get_or_init<F>(&self, f: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.cell.get_or_init(f)
    }

    /// Returns the stored value without computing it.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("Memo").field(value).finish(),
            None => f.write_str("Memo(<pending>)"),
        }
    }
}
