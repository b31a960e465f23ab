//! Fully-qualified queue paths.

use std::fmt;
use std::str::FromStr;

use crate::IdError;

/// A fully-qualified, dot separated queue path such as `root.users.alice`.
///
/// Every segment is a non-empty queue name made of ASCII alphanumerics,
/// `-`, `_` or `@`. The last segment is the queue's short name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueuePath(String);

impl QueuePath {
    /// Segment separator.
    pub const SEPARATOR: char = '.';

    /// Name of the root queue.
    pub const ROOT: &'static str = "root";

    /// Returns the path of the root queue.
    #[must_use]
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Parses a queue path from a string.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        for segment in s.split(Self::SEPARATOR) {
            if segment.is_empty() {
                return Err(IdError::EmptySegment {
                    path: s.to_string(),
                });
            }
            validate_segment(segment)?;
        }

        Ok(Self(s.to_string()))
    }

    /// Returns the full path as a string slice.
    pub fn full_path(&self) -> &str {
        &self.0
    }

    /// Returns the short name of the queue (the last segment).
    pub fn leaf_name(&self) -> &str {
        match self.0.rsplit_once(Self::SEPARATOR) {
            Some((_, name)) => name,
            None => &self.0,
        }
    }

    /// Returns the path of the parent queue, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<QueuePath> {
        self.0
            .rsplit_once(Self::SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Builds the path of a direct child queue.
    pub fn child(&self, name: &str) -> Result<QueuePath, IdError> {
        if name.is_empty() {
            return Err(IdError::EmptySegment {
                path: format!("{}{}", self.0, Self::SEPARATOR),
            });
        }
        validate_segment(name)?;
        Ok(Self(format!("{}{}{}", self.0, Self::SEPARATOR, name)))
    }

    /// Returns true if this is the root queue.
    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// Returns the number of segments in the path.
    pub fn depth(&self) -> usize {
        self.0.split(Self::SEPARATOR).count()
    }

    /// Iterates over path segments from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(Self::SEPARATOR)
    }
}

fn validate_segment(segment: &str) -> Result<(), IdError> {
    if segment != segment.trim() {
        return Err(IdError::InvalidSegment {
            segment: segment.to_string(),
            reason: "leading or trailing whitespace",
        });
    }

    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@')))
    {
        return Err(IdError::InvalidSegment {
            segment: segment.to_string(),
            reason: if c.is_whitespace() {
                "whitespace is not allowed"
            } else {
                "only ASCII letters, digits, '-', '_' and '@' are allowed"
            },
        });
    }

    Ok(())
}

impl fmt::Display for QueuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueuePath {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for QueuePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for QueuePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for QueuePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
