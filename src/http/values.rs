/// Ordered multimap of string keys to values.
///
/// Keys keep the order in which they were first seen and are compared
/// case-sensitively. Adding a value to an existing key appends; nothing is
/// ever overwritten.
///
/// Headers and url-encoded forms hold text (`Values<String>`). Multipart
/// forms hold raw bytes ([`FormData`]) so file uploads survive untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Values<V = String> {
    entries: Vec<(String, Vec<V>)>,
}

/// Multipart field values, kept byte for byte.
pub type FormData = Values<Vec<u8>>;

impl<V> Default for Values<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> Values<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` under `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<V>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Returns every value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&[V]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// True if the key has at least one value.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[V])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl Values<String> {
    /// Returns the first value stored under `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.first())
            .map(|v| v.as_str())
    }

    /// Returns the last value stored under `key`.
    pub fn last(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|v| v.last())
            .map(|v| v.as_str())
    }
}

impl FormData {
    /// Returns the first value stored under `key`.
    pub fn first(&self, key: &str) -> Option<&[u8]> {
        self.get(key)
            .and_then(|v| v.first())
            .map(|v| v.as_slice())
    }
}

impl<K, T, V> FromIterator<(K, T)> for Values<V>
where
    K: Into<String>,
    T: Into<V>,
{
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (k, v) in iter {
            values.add(k, v);
        }
        values
    }
}
