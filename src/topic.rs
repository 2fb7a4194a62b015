//! Topic Paths
//!
//! Hierarchical, slash-delimited addresses for sources of live data.
//! Internally every path carries a leading slash (`/building/sensor3`);
//! broker topics never do (`building/sensor3`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// An absolute folder path with a leading slash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TopicPath(String);

impl TopicPath {
    /// Create a path, inserting the leading slash if it is missing
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        if path.starts_with('/') {
            Self(path.to_string())
        } else {
            Self(format!("/{}", path))
        }
    }

    /// Convert a broker-native topic name into a path.
    ///
    /// Always prepends exactly one slash so that `to_broker` inverts it.
    pub fn from_broker(topic: &str) -> Self {
        Self(format!("/{}", topic))
    }

    /// Broker-native topic name (the path without its leading slash)
    pub fn to_broker(&self) -> &str {
        &self.0[1..]
    }

    /// Path of a named child, e.g. `/a/b` + `x` = `/a/b/x`
    pub fn child(&self, name: &str) -> Self {
        if self.0 == "/" {
            Self(format!("/{}", name))
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopicPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for TopicPath {
    fn from(path: String) -> Self {
        if path.starts_with('/') {
            Self(path)
        } else {
            Self::new(path)
        }
    }
}

impl From<TopicPath> for String {
    fn from(path: TopicPath) -> Self {
        path.0
    }
}

impl AsRef<str> for TopicPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
