//! Ordered header map with case-insensitive name lookup.

use std::fmt;

/// A case-insensitive, multi-value header map that keeps insertion order.
///
/// Request headers are stored exactly as received. Handlers use
/// [`Headers::set`] on the response side, where a later value must replace
/// an earlier one (`Content-Type` set twice keeps only the last).
///
/// # Examples
///
/// ```
/// use gaga::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Vary", "Origin");
/// headers.insert("Vary", "Accept-Encoding");
/// headers.set("content-type", "text/html");
/// headers.set("Content-Type", "application/json");
///
/// assert_eq!(headers.get_all("vary").count(), 2);
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends an entry, keeping any existing values for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single one.
    ///
    /// The replacement takes the position of the first removed entry so that
    /// header order on the wire stays stable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .inner
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(pos) => {
                self.inner[pos] = (name.clone(), value);
                let mut index = 0;
                self.inner.retain(|(k, _)| {
                    let keep = index <= pos || !k.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.inner.push((name, value)),
        }
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries named `name`, returning `true` if any existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Number of entries, not of unique names.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Accept-Encoding", "gzip");
        assert_eq!(h.get("accept-encoding"), Some("gzip"));
        assert!(h.contains("ACCEPT-ENCODING"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn set_replaces_all_previous_values_in_place() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        h.insert("X-Trace", "1");
        h.insert("content-type", "text/css");
        h.set("Content-Type", "text/html");

        let entries: Vec<_> = h.iter().collect();
        assert_eq!(entries, vec![("Content-Type", "text/html"), ("X-Trace", "1")]);
    }

    #[test]
    fn set_appends_when_absent() {
        let mut h = Headers::new();
        h.set("Vary", "Accept-Encoding");
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn remove_drops_every_value() {
        let mut h = Headers::new();
        h.insert("Set-Cookie", "a=1");
        h.insert("Set-Cookie", "b=2");
        assert!(h.remove("set-cookie"));
        assert!(h.is_empty());
        assert!(!h.remove("set-cookie"));
    }
}
