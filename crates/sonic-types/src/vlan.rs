//! Provisionable VLAN identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name prefix of VLAN keys and interfaces (`Vlan100`).
pub const VLAN_NAME_PREFIX: &str = "Vlan";

/// VLAN tag accepted by the provisioning API (2-4094).
///
/// VLAN 1 is the switch default VLAN and 4095 is reserved, so neither can
/// be created through the API.
///
/// ```
/// use sonic_types::VlanId;
///
/// let vlan: VlanId = "100".parse().unwrap();
/// assert_eq!(vlan.name(), "Vlan100");
/// assert!(VlanId::new(1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    pub const MIN: u16 = 2;
    pub const MAX: u16 = 4094;

    /// # Errors
    ///
    /// Returns an error if `id` is outside 2-4094.
    pub fn new(id: u16) -> Result<Self, ParseError> {
        if (Self::MIN..=Self::MAX).contains(&id) {
            Ok(VlanId(id))
        } else {
            Err(ParseError::InvalidVlanId(id.to_string()))
        }
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Store key and interface name, e.g. `Vlan100`.
    pub fn name(&self) -> String {
        format!("{}{}", VLAN_NAME_PREFIX, self.0)
    }

    /// Parses a `Vlan<id>` name back into a tag.
    pub fn from_name(name: &str) -> Result<Self, ParseError> {
        name.strip_prefix(VLAN_NAME_PREFIX)
            .ok_or_else(|| ParseError::InvalidVlanId(name.to_string()))?
            .parse()
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidVlanId(s.to_string()));
        }
        let id: u16 = s
            .parse()
            .map_err(|_| ParseError::InvalidVlanId(s.to_string()))?;
        VlanId::new(id)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_range() {
        assert!(VlanId::new(2).is_ok());
        assert!(VlanId::new(4094).is_ok());
        assert!(VlanId::new(0).is_err());
        assert!(VlanId::new(1).is_err());
        assert!(VlanId::new(4095).is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!("100".parse::<VlanId>().unwrap().as_u16(), 100);
        assert!("abc".parse::<VlanId>().is_err());
        assert!("-5".parse::<VlanId>().is_err());
        assert!("".parse::<VlanId>().is_err());
        assert!("70000".parse::<VlanId>().is_err());
    }

    #[test]
    fn test_names() {
        let vlan = VlanId::new(2000).unwrap();
        assert_eq!(vlan.name(), "Vlan2000");
        assert_eq!(VlanId::from_name("Vlan2000").unwrap(), vlan);
        assert!(VlanId::from_name("Ethernet0").is_err());
    }
}
