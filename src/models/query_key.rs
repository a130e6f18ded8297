use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a cached query in the client-side cache, e.g. `["students", "class-7b"]`.
///
/// A key with no non-empty segments is treated as "nothing to invalidate".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.is_empty())
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<Vec<String>> for QueryKey {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}
