//! Topic names.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TopicError;

/// Maximum topic length in bytes.
pub const MAX_TOPIC_LEN: usize = 192;

/// A validated topic name of at most [`MAX_TOPIC_LEN`] bytes.
///
/// Topics match exactly; there are no wildcards. The empty topic is a
/// valid name like any other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    pub fn new(name: impl Into<String>) -> Result<Self, TopicError> {
        let name = name.into();
        if name.len() > MAX_TOPIC_LEN {
            return Err(TopicError::TooLong {
                len: name.len(),
                max: MAX_TOPIC_LEN,
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = TopicError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Topic {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Topic {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Topic {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_max_length() {
        let name = "t".repeat(MAX_TOPIC_LEN);
        assert_eq!(Topic::new(name.clone()).unwrap().as_str(), name);
    }

    #[test]
    fn rejects_over_max_length() {
        let err = Topic::new("t".repeat(MAX_TOPIC_LEN + 1)).unwrap_err();
        assert_eq!(
            err,
            TopicError::TooLong {
                len: MAX_TOPIC_LEN + 1,
                max: MAX_TOPIC_LEN
            }
        );
    }

    #[test]
    fn length_is_counted_in_bytes() {
        // 'é' is two bytes in UTF-8
        let name = "é".repeat(MAX_TOPIC_LEN / 2 + 1);
        assert!(Topic::new(name).is_err());
    }

    #[test]
    fn accepts_empty() {
        let topic = Topic::new("").unwrap();
        assert_eq!(topic, "");
        assert_eq!(topic.to_string(), "");
    }

    #[test]
    fn deserialize_validates() {
        let ok: Topic = serde_json::from_str("\"temp\"").unwrap();
        assert_eq!(ok, "temp");
        let empty: Topic = serde_json::from_str("\"\"").unwrap();
        assert_eq!(empty, "");
        let long = format!("\"{}\"", "t".repeat(MAX_TOPIC_LEN + 1));
        assert!(serde_json::from_str::<Topic>(&long).is_err());
    }
}
