use super::ByteStr;

use std::borrow::Cow;
use std::collections::hash_map::{self, HashMap};
use std::{fmt, iter, mem, slice};

/// A case-insensitive, multi-valued map.
///
/// Used for both request headers and query parameters. Names keep the
/// spelling of their first insertion, and names and values both iterate
/// in insertion order.
#[derive(Clone, Default)]
pub struct MultiMap {
    index: HashMap<ByteStr, usize>,
    entries: Vec<Entry>,
}

#[derive(Clone)]
struct Entry {
    name: ByteStr,
    value: Value,
}

impl MultiMap {
    pub fn new() -> MultiMap {
        MultiMap::with_capacity(16)
    }

    pub fn with_capacity(capacity: usize) -> MultiMap {
        MultiMap {
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Returns `true` if the map has at least one value for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&*fold(name))
    }

    /// The number of distinct names in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the first value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entry(name).and_then(|entry| entry.value.iter().next())
    }

    /// Returns every value stored under `name`.
    pub fn get_all(&self, name: &str) -> Values<'_> {
        self.entry(name)
            .map(|entry| entry.value.iter())
            .unwrap_or(Values {
                kind: ValuesKind::None,
            })
    }

    /// Replace all values of `name` with `value`.
    ///
    /// Returns `true` if the name was already present.
    pub fn insert(&mut self, name: impl Into<ByteStr>, value: impl Into<ByteStr>) -> bool {
        let name = name.into();
        let value = Value::One(value.into());

        match self.index.entry(fold(&name).into_owned().into()) {
            hash_map::Entry::Occupied(slot) => {
                self.entries[*slot.get()].value = value;
                true
            }
            hash_map::Entry::Vacant(slot) => {
                slot.insert(self.entries.len());
                self.entries.push(Entry { name, value });
                false
            }
        }
    }

    /// Add `value` to the values of `name`.
    pub fn append(&mut self, name: impl Into<ByteStr>, value: impl Into<ByteStr>) {
        let name = name.into();
        let value = value.into();

        match self.index.entry(fold(&name).into_owned().into()) {
            hash_map::Entry::Occupied(slot) => {
                let entry = &mut self.entries[*slot.get()];
                match &mut entry.value {
                    Value::One(old) => {
                        let old = mem::take(old);
                        entry.value = Value::Many(vec![old, value]);
                    }
                    Value::Many(values) => values.push(value),
                }
            }
            hash_map::Entry::Vacant(slot) => {
                slot.insert(self.entries.len());
                self.entries.push(Entry {
                    name,
                    value: Value::One(value),
                });
            }
        }
    }

    /// Iterate over the distinct names, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Iterate over every `(name, value)` pair.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            entries: self.entries.iter(),
            current: None,
        }
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index
            .get(&*fold(name))
            .map(|&at| &self.entries[at])
    }
}

// Lowercase only when needed; most header names already are.
fn fold(name: &str) -> Cow<'_, str> {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(name.to_ascii_lowercase())
    } else {
        Cow::Borrowed(name)
    }
}

impl<N, V> FromIterator<(N, V)> for MultiMap
where
    N: Into<ByteStr>,
    V: Into<ByteStr>,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = (N, V)>,
    {
        let mut map = MultiMap::new();
        for (name, value) in iter {
            map.append(name, value);
        }
        map
    }
}

impl fmt::Debug for MultiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|entry| (&entry.name, &entry.value)))
            .finish()
    }
}

pub struct Iter<'a> {
    entries: slice::Iter<'a, Entry>,
    current: Option<(&'a ByteStr, Values<'a>)>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((name, ref mut values)) = self.current {
                if let Some(value) = values.next() {
                    return Some((name, value));
                }

                self.current = None;
            }

            match self.entries.next() {
                Some(entry) => {
                    self.current = Some((&entry.name, entry.value.iter()));
                }
                None => return None,
            }
        }
    }
}

#[derive(Clone)]
enum Value {
    One(ByteStr),
    Many(Vec<ByteStr>),
}

impl Value {
    fn iter(&self) -> Values<'_> {
        let kind = match self {
            Value::One(value) => ValuesKind::One(iter::once(value)),
            Value::Many(values) => ValuesKind::Many(values.iter()),
        };

        Values { kind }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// An iterator over the values stored under one name.
pub struct Values<'a> {
    kind: ValuesKind<'a>,
}

enum ValuesKind<'a> {
    None,
    One(iter::Once<&'a ByteStr>),
    Many(slice::Iter<'a, ByteStr>),
}

impl<'a> Iterator for Values<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        match self.kind {
            ValuesKind::None => None,
            ValuesKind::One(ref mut o) => o.next(),
            ValuesKind::Many(ref mut m) => m.next(),
        }
        .map(|b| b.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive() {
        let mut map = MultiMap::new();
        map.append("Content-Type", "application/json");

        assert!(map.contains("content-type"));
        assert!(map.contains("CONTENT-TYPE"));
        assert_eq!(map.get("content-TYPE"), Some("application/json"));
        assert_eq!(map.keys().collect::<Vec<_>>(), ["Content-Type"]);
    }

    #[test]
    fn multiple_values() {
        let map: MultiMap = [("A", "1"), ("b", "2"), ("a", "3")].into_iter().collect();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get_all("a").collect::<Vec<_>>(), ["1", "3"]);
        assert_eq!(map.get("a"), Some("1"));
        assert_eq!(
            map.iter().collect::<Vec<_>>(),
            [("A", "1"), ("A", "3"), ("b", "2")]
        );
        assert_eq!(map.get_all("missing").count(), 0);
    }

    #[test]
    fn insert_replaces() {
        let mut map = MultiMap::new();
        map.append("x", "1");
        map.append("x", "2");

        assert!(map.insert("X", "3"));
        assert_eq!(map.get_all("x").collect::<Vec<_>>(), ["3"]);
        assert!(!map.insert("y", "4"));
    }
}
