use crate::error::EnumConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named-entity category. Serialized with the short wire codes
/// (`LOC`, `ORG`, `PER`, `MISC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[allow(non_camel_case_types)]
pub enum EntityType {
    LOCATION,
    ORGANIZATION,
    PERSON,
    MISCELLANEOUS,
}

impl EntityType {
    /// Category order used for quotas and per-category word sets.
    pub const ALL: [EntityType; 4] = [
        EntityType::LOCATION,
        EntityType::ORGANIZATION,
        EntityType::PERSON,
        EntityType::MISCELLANEOUS,
    ];

    pub fn code(self) -> &'static str {
        match self {
            EntityType::LOCATION => "LOC",
            EntityType::ORGANIZATION => "ORG",
            EntityType::PERSON => "PER",
            EntityType::MISCELLANEOUS => "MISC",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityType::LOCATION => "Location",
            EntityType::ORGANIZATION => "Organization",
            EntityType::PERSON => "Person",
            EntityType::MISCELLANEOUS => "Miscellaneous",
        }
    }

    /// Slot of this category in `ALL`.
    pub fn index(self) -> usize {
        match self {
            EntityType::LOCATION => 0,
            EntityType::ORGANIZATION => 1,
            EntityType::PERSON => 2,
            EntityType::MISCELLANEOUS => 3,
        }
    }

    /// Lenient wire decoding: anything unrecognised is miscellaneous.
    pub fn from_code(code: &str) -> Self {
        Self::try_from(code).unwrap_or(EntityType::MISCELLANEOUS)
    }
}

impl TryFrom<&str> for EntityType {
    type Error = EnumConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOC" | "LOCATION" => Ok(EntityType::LOCATION),
            "ORG" | "ORGANIZATION" => Ok(EntityType::ORGANIZATION),
            "PER" | "PERSON" => Ok(EntityType::PERSON),
            "MISC" | "MISCELLANEOUS" => Ok(EntityType::MISCELLANEOUS),
            _ => Err(EnumConversionError::InvalidEntityType(value.to_string())),
        }
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        Self::from_code(&value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parse_accepts_codes_and_names() {
        assert_eq!(EntityType::try_from("LOC").unwrap(), EntityType::LOCATION);
        assert_eq!(
            EntityType::try_from("organization").unwrap(),
            EntityType::ORGANIZATION
        );
        assert!(EntityType::try_from("CITY").is_err());
    }

    #[test]
    fn test_unknown_wire_code_falls_back_to_misc() {
        let kind: EntityType = serde_json::from_str(r#""DATE""#).unwrap();
        assert_eq!(kind, EntityType::MISCELLANEOUS);

        let json = serde_json::to_string(&EntityType::PERSON).unwrap();
        assert_eq!(json, r#""PER""#);
    }

    #[test]
    fn test_index_matches_all_order() {
        for (slot, kind) in EntityType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), slot);
        }
    }
}
