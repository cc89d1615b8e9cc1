use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The declared role of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    Data,
    Compute,
    Manual,
    Finding,
    #[default]
    Unknown,
}

impl NodeKind {
    /// Case-insensitive decode; anything unrecognized becomes `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "DATA" => NodeKind::Data,
            "COMPUTE" => NodeKind::Compute,
            "MANUAL" => NodeKind::Manual,
            "FINDING" => NodeKind::Finding,
            _ => NodeKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Data => "DATA",
            NodeKind::Compute => "COMPUTE",
            NodeKind::Manual => "MANUAL",
            NodeKind::Finding => "FINDING",
            NodeKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.as_str()) }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { serializer.serialize_str(self.as_str()) }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeKind::parse(&s))
    }
}

/// A node as declared in a workflow source document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowNode {
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_decodes_case_insensitively() {
        assert_eq!(NodeKind::parse("data"), NodeKind::Data);
        assert_eq!(NodeKind::parse("Compute"), NodeKind::Compute);
        assert_eq!(NodeKind::parse("FINDING"), NodeKind::Finding);
        assert_eq!(NodeKind::parse("widget"), NodeKind::Unknown);
        assert_eq!(NodeKind::parse(""), NodeKind::Unknown);
    }

    #[test]
    fn kind_serializes_canonical_uppercase() {
        assert_eq!(serde_json::to_string(&NodeKind::Data).unwrap(), "\"DATA\"");
        let back: NodeKind = serde_json::from_str("\"manual\"").unwrap();
        assert_eq!(back, NodeKind::Manual);
    }
}
