//! Opaque identifier types.
//!
//! A [`MachineTag`] names a machine record in the model; an [`InstanceId`]
//! names the provider-side instance backing it. Both are stable, opaque
//! strings — the only validation applied here is that they are non-empty,
//! because an empty identifier never names anything.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when parsing an identifier from its wire form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string was empty.
    #[error("empty {0} identifier")]
    Empty(&'static str),
}

/// Stable identifier for a machine within the model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineTag(String);

impl MachineTag {
    /// Wrap a raw tag string.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MachineTag {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::Empty("machine"));
        }
        Ok(Self(s.to_string()))
    }
}

/// Identifier assigned by the infrastructure provider once a machine is
/// provisioned.
///
/// An `InstanceId` is always non-empty; "not yet provisioned" is expressed
/// as the absence of an id, not as an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wrap a raw instance id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InstanceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::Empty("instance"));
        }
        Ok(Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_tag_roundtrip() {
        let tag: MachineTag = "42".parse().unwrap();
        assert_eq!(tag.as_str(), "42");
        assert_eq!(tag.to_string(), "42");
        assert_eq!(tag, MachineTag::new("42"));
    }

    #[test]
    fn empty_identifiers_rejected() {
        assert_eq!("".parse::<MachineTag>(), Err(IdError::Empty("machine")));
        assert_eq!("".parse::<InstanceId>(), Err(IdError::Empty("instance")));
    }

    #[test]
    fn instance_id_serde_is_transparent() {
        let id = InstanceId::new("i-abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"i-abc123\"");
        let back: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
