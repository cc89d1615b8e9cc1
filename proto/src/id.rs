use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

#[derive(Debug, thiserror::Error)]
pub enum IdParseError {
    #[error("invalid ulid: {0}")]
    InvalidUlid(String),
}

macro_rules! opaque_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Ulid);

        impl $name {
            pub fn new() -> Self { Self(Ulid::new()) }

            pub fn to_bytes(&self) -> [u8; 16] { self.0.to_bytes() }
        }

        impl Default for $name {
            fn default() -> Self { Self::new() }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, concat!($prefix, "{}"), self.0) }
        }

        impl TryFrom<&str> for $name {
            type Error = IdParseError;
            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Ulid::from_string(s).map(Self).map_err(|_| IdParseError::InvalidUlid(s.to_string()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String { id.to_string() }
        }
    };
}

opaque_id!(ProjectId, "P-");
opaque_id!(RevisionId, "W-");
opaque_id!(ObjectId, "O-");
opaque_id!(RequestId, "R-");
opaque_id!(TraceId, "T-");

/// Per-project event sequence number. Strictly increasing within a project;
/// doubles as the storage key (big-endian) so key order is event order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventSeq(pub u64);

impl EventSeq {
    pub fn to_key(self) -> [u8; 8] { self.0.to_be_bytes() }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for EventSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Per-project commit sequence number; same keying scheme as [`EventSeq`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommitSeq(pub u64);

impl CommitSeq {
    pub fn to_key(self) -> [u8; 8] { self.0.to_be_bytes() }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for CommitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_round_trips_through_string() {
        let id = ProjectId::new();
        let s = id.to_string();
        assert_eq!(ProjectId::try_from(s.as_str()).unwrap(), id);
    }

    #[test]
    fn event_seq_key_order_matches_numeric_order() {
        let a = EventSeq(1).to_key();
        let b = EventSeq(256).to_key();
        assert!(a < b);
        assert_eq!(EventSeq::from_key(&b), Some(EventSeq(256)));
    }
}
