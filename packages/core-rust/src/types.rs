//! Ledger identity types shared by every message: entity ids, parties and
//! transaction hashes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Stable linear identifier of a ledger entity across versions.
///
/// Rendered as `{external_id}_{uuid}` when an external id is present and as
/// the bare UUID otherwise. Parsing accepts both forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    /// Optional human-assigned reference carried alongside the UUID.
    pub external_id: Option<String>,
    /// The identifying UUID. Two ids are the same entity iff this matches.
    pub id: Uuid,
}

impl EntityId {
    /// Creates a fresh random entity id with no external reference.
    #[must_use]
    pub fn new() -> Self {
        Self {
            external_id: None,
            id: Uuid::new_v4(),
        }
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            external_id: None,
            id,
        }
    }

    /// Creates a fresh entity id tagged with an external reference.
    #[must_use]
    pub fn with_external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            id: Uuid::new_v4(),
        }
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.external_id {
            Some(ext) => write!(f, "{ext}_{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Error returned when a string is not a valid entity id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid entity id '{0}'")]
pub struct ParseEntityIdError(pub String);

impl FromStr for EntityId {
    type Err = ParseEntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = Uuid::parse_str(s) {
            return Ok(Self::from_uuid(id));
        }
        match s.rsplit_once('_') {
            Some((ext, tail)) if !ext.is_empty() => Uuid::parse_str(tail)
                .map(|id| Self {
                    external_id: Some(ext.to_string()),
                    id,
                })
                .map_err(|_| ParseEntityIdError(s.to_string())),
            _ => Err(ParseEntityIdError(s.to_string())),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Party
// ---------------------------------------------------------------------------

/// Attribute keys accepted in a party's distinguished name.
const PARTY_ATTRIBUTES: &[&str] = &["CN", "OU", "O", "L", "ST", "C"];

/// Attribute keys every party name must carry.
const REQUIRED_PARTY_ATTRIBUTES: &[&str] = &["O", "L", "C"];

/// A ledger participant identified by an X.500-style distinguished name,
/// e.g. `O=Member 1, L=London, C=GB`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Party {
    name: String,
}

impl Party {
    /// Returns the canonical `K=V, K=V` rendering of the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of a single attribute (e.g. `"O"`), if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.name.split(", ").find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Error returned when a string is not a valid party name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParsePartyError {
    #[error("malformed attribute '{0}' in party name")]
    MalformedAttribute(String),
    #[error("unsupported attribute '{0}' in party name")]
    UnsupportedAttribute(String),
    #[error("duplicate attribute '{0}' in party name")]
    DuplicateAttribute(String),
    #[error("party name is missing required attribute '{0}'")]
    MissingAttribute(&'static str),
}

impl FromStr for Party {
    type Err = ParsePartyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut seen: Vec<(&str, &str)> = Vec::new();
        for raw in s.split(',') {
            let (key, value) = raw
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                .ok_or_else(|| ParsePartyError::MalformedAttribute(raw.trim().to_string()))?;
            if !PARTY_ATTRIBUTES.contains(&key) {
                return Err(ParsePartyError::UnsupportedAttribute(key.to_string()));
            }
            if seen.iter().any(|(k, _)| *k == key) {
                return Err(ParsePartyError::DuplicateAttribute(key.to_string()));
            }
            seen.push((key, value));
        }
        for required in REQUIRED_PARTY_ATTRIBUTES {
            if !seen.iter().any(|(k, _)| k == required) {
                return Err(ParsePartyError::MissingAttribute(required));
            }
        }
        let name = seen
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Self { name })
    }
}

impl Serialize for Party {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for Party {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TransactionHash
// ---------------------------------------------------------------------------

/// 32-byte digest identifying a committed ledger transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHash([u8; 32]);

impl TransactionHash {
    /// The all-zero hash.
    pub const ZERO: Self = Self([0; 32]);
    /// The all-ones hash.
    pub const ALL_ONES: Self = Self([0xff; 32]);

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Upper-case hex rendering prefixed with `0x`, as used on the wire.
    #[must_use]
    pub fn to_prefixed_string(&self) -> String {
        format!("0x{self}")
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionHash({self})")
    }
}

/// Error returned when a string is not a 64-digit hex hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transaction hash '{0}'")]
pub struct ParseHashError(pub String);

impl FromStr for TransactionHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ParseHashError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_without_external_id_renders_bare_uuid() {
        let id: EntityId = "f1a27656-3b1a-4469-8e37-04d9e2764bf6".parse().unwrap();
        assert!(id.external_id.is_none());
        assert_eq!(id.to_string(), "f1a27656-3b1a-4469-8e37-04d9e2764bf6");
    }

    #[test]
    fn entity_id_with_external_id_parses_back() {
        let id = EntityId::with_external_id("shipment_42");
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(parsed.external_id.as_deref(), Some("shipment_42"));
    }

    #[test]
    fn entity_id_rejects_garbage() {
        assert!("not-an-id".parse::<EntityId>().is_err());
        assert!("_f1a27656-3b1a-4469-8e37-04d9e2764bf6".parse::<EntityId>().is_err());
    }

    #[test]
    fn party_is_normalised() {
        let party: Party = "O=Member 1,L=London ,  C=GB".parse().unwrap();
        assert_eq!(party.name(), "O=Member 1, L=London, C=GB");
        assert_eq!(party.attribute("L"), Some("London"));
        assert_eq!(party.attribute("OU"), None);
    }

    #[test]
    fn party_requires_organisation_locality_country() {
        assert_eq!(
            "O=Member 1, L=London".parse::<Party>(),
            Err(ParsePartyError::MissingAttribute("C"))
        );
        assert!(matches!(
            "O=A, L=B, C=GB, X=Y".parse::<Party>(),
            Err(ParsePartyError::UnsupportedAttribute(_))
        ));
        assert!(matches!(
            "Member 1".parse::<Party>(),
            Err(ParsePartyError::MalformedAttribute(_))
        ));
    }

    #[test]
    fn transaction_hash_renders_upper_hex_with_prefix() {
        assert_eq!(
            TransactionHash::ALL_ONES.to_prefixed_string(),
            format!("0x{}", "FF".repeat(32))
        );
        let parsed: TransactionHash = TransactionHash::ALL_ONES
            .to_prefixed_string()
            .parse()
            .unwrap();
        assert_eq!(parsed, TransactionHash::ALL_ONES);
        assert!("0x1234".parse::<TransactionHash>().is_err());
    }
}
