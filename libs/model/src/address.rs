//! Provider-reported network addresses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Network scope of an address, as reported by the provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum AddressScope {
    /// Reachable from outside the cloud.
    Public,
    /// Reachable within the cloud or region.
    CloudLocal,
    /// Only reachable on the machine itself.
    MachineLocal,
    /// Link-local, not routable.
    LinkLocal,
    /// Scope not reported.
    #[default]
    Unknown,
}

/// A network address as reported by the infrastructure provider.
///
/// Equality covers the full attribute tuple: two addresses with the same
/// value but different scopes or spaces are different addresses.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProviderAddress {
    /// The literal address: an IP or a hostname.
    pub value: String,

    /// Provider-reported scope.
    #[serde(default)]
    pub scope: AddressScope,

    /// Network space the address lives in, when the provider models spaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
}

impl ProviderAddress {
    /// An address with the given value and scope, in no particular space.
    pub fn new(value: impl Into<String>, scope: AddressScope) -> Self {
        Self {
            value: value.into(),
            scope,
            space: None,
        }
    }

    /// Attach a space name.
    pub fn in_space(mut self, space: impl Into<String>) -> Self {
        self.space = Some(space.into());
        self
    }
}

impl fmt::Display for ProviderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Compare two address sets, ignoring order.
///
/// Elements compare across their full attribute tuple. Duplicates count:
/// `[a, a]` and `[a, b]` are different sets.
pub fn addresses_equal(lhs: &[ProviderAddress], rhs: &[ProviderAddress]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut lhs: Vec<&ProviderAddress> = lhs.iter().collect();
    let mut rhs: Vec<&ProviderAddress> = rhs.iter().collect();
    lhs.sort();
    rhs.sort();
    lhs == rhs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public(value: &str) -> ProviderAddress {
        ProviderAddress::new(value, AddressScope::Public)
    }

    #[test]
    fn equality_ignores_order() {
        let a = vec![public("10.0.0.1"), public("10.0.0.2")];
        let b = vec![public("10.0.0.2"), public("10.0.0.1")];
        assert!(addresses_equal(&a, &b));
        assert!(addresses_equal(&b, &a));
    }

    #[test]
    fn equality_is_symmetric_with_duplicates() {
        let a = vec![public("10.0.0.1"), public("10.0.0.1")];
        let b = vec![public("10.0.0.1"), public("10.0.0.2")];
        assert!(!addresses_equal(&a, &b));
        assert!(!addresses_equal(&b, &a));
    }

    #[test]
    fn equality_covers_the_full_tuple() {
        let a = vec![public("10.0.0.1")];
        let b = vec![ProviderAddress::new("10.0.0.1", AddressScope::CloudLocal)];
        assert!(!addresses_equal(&a, &b));

        let c = vec![public("10.0.0.1").in_space("dmz")];
        assert!(!addresses_equal(&a, &c));
    }

    #[test]
    fn length_mismatch_is_unequal() {
        let a = vec![public("10.0.0.1")];
        assert!(!addresses_equal(&a, &[]));
        assert!(addresses_equal(&[], &[]));
    }
}
