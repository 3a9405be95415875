use crate::error::SelectorError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const SYSTEM_NAMESPACE: &str = "sys";
pub const CONVERSATION_NAMESPACE: &str = "conv";

/// A dotted path naming a variable: `sys.message`, `conv.count`, `llm.output.text`.
///
/// The first segment is the namespace (`sys`, `conv`, or a node id); the
/// second, if any, is the key. Equality is by path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableSelector {
    path: Vec<String>,
}

impl VariableSelector {
    /// Builds a selector from path segments. Segments must be non-empty and
    /// carry no surrounding whitespace, so that the path survives a round
    /// trip through its dotted form unchanged.
    pub fn new<S: Into<String>>(path: impl IntoIterator<Item = S>) -> Result<Self, SelectorError> {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty()
            || path
                .iter()
                .any(|segment| segment.is_empty() || segment.trim() != segment)
        {
            return Err(SelectorError::Invalid(path.join(".")));
        }
        Ok(Self { path })
    }

    pub fn from_string(selector: &str) -> Result<Self, SelectorError> {
        Self::new(selector.split('.'))
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn namespace(&self) -> &str {
        &self.path[0]
    }

    pub fn key(&self) -> Option<&str> {
        self.path.get(1).map(String::as_str)
    }

    /// Segments after the namespace.
    pub fn rest(&self) -> &[String] {
        &self.path[1..]
    }

    pub fn is_system(&self) -> bool {
        self.namespace() == SYSTEM_NAMESPACE
    }

    pub fn is_conversation(&self) -> bool {
        self.namespace() == CONVERSATION_NAMESPACE
    }

    /// True when the namespace is a node id rather than `sys` or `conv`.
    pub fn is_node(&self) -> bool {
        !self.is_system() && !self.is_conversation()
    }
}

impl fmt::Display for VariableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join("."))
    }
}

impl FromStr for VariableSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl Serialize for VariableSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.path.serialize(serializer)
    }
}

/// Accepts either `"conv.count"` or `["conv", "count"]`.
impl<'de> Deserialize<'de> for VariableSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Dotted(String),
            Segments(Vec<String>),
        }

        let selector = match Raw::deserialize(deserializer)? {
            Raw::Dotted(s) => Self::from_string(&s),
            Raw::Segments(path) => Self::new(path),
        };
        selector.map_err(serde::de::Error::custom)
    }
}
