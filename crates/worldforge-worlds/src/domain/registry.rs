//! Module definition registry.
//!
//! The catalog of topical modules every world is made of, in the order they
//! are presented, analyzed and generated. Each module lists its fields along
//! with the rules an author's text must satisfy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use worldforge_core::error::DomainError;

/// Author-supplied field values of a module, keyed by field key.
pub type FieldMap = BTreeMap<String, String>;

/// Identifies one of the fixed topical modules of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKey {
    /// Origins of the universe, gods and metaphysical laws.
    Cosmology,
    /// Continents, climates and notable places.
    Geography,
    /// Founding myths, eras and turning points.
    History,
    /// The peoples that inhabit the world and how they relate.
    Peoples,
    /// Governance, hierarchy and law.
    Societies,
    /// Beliefs, customs, arts and languages.
    Cultures,
    /// Tensions, factions and looming threats.
    Conflicts,
}

impl ModuleKey {
    /// Every module key, in registry order.
    pub const ALL: [Self; 7] = [
        Self::Cosmology,
        Self::Geography,
        Self::History,
        Self::Peoples,
        Self::Societies,
        Self::Cultures,
        Self::Conflicts,
    ];

    /// Returns the stable string form used in storage and URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cosmology => "cosmology",
            Self::Geography => "geography",
            Self::History => "history",
            Self::Peoples => "peoples",
            Self::Societies => "societies",
            Self::Cultures => "cultures",
            Self::Conflicts => "conflicts",
        }
    }

    /// Returns the registry definition for this key.
    #[must_use]
    pub fn definition(self) -> &'static ModuleDefinition {
        // MODULE_DEFINITIONS is declared in the same order as `ALL`.
        &MODULE_DEFINITIONS[self as usize]
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown module key: {s}")))
    }
}

/// Rules for a single authored field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field key, unique within its module.
    pub key: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Whether the field must be filled before publication.
    pub required: bool,
    /// Minimum number of characters, when set.
    pub min_length: Option<usize>,
    /// Maximum number of characters, when set.
    pub max_length: Option<usize>,
}

impl FieldDefinition {
    /// Checks a non-blank value against the length bounds.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the trimmed value is shorter than
    /// `min_length` or longer than `max_length`.
    pub fn validate(&self, value: &str) -> Result<(), DomainError> {
        let length = value.trim().chars().count();
        if let Some(min) = self.min_length {
            if length < min {
                return Err(DomainError::Validation(format!(
                    "field '{}' must be at least {min} characters",
                    self.key
                )));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Err(DomainError::Validation(format!(
                    "field '{}' must be at most {max} characters",
                    self.key
                )));
            }
        }
        Ok(())
    }
}

/// A topical module and its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleDefinition {
    /// Module key.
    pub key: ModuleKey,
    /// Human-readable label.
    pub label: &'static str,
    /// Fields in presentation order.
    pub fields: &'static [FieldDefinition],
}

impl ModuleDefinition {
    /// Looks up a field by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&'static FieldDefinition> {
        self.fields.iter().find(|field| field.key == key)
    }

    /// Looks up a field by key, rejecting unknown keys.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the module has no such field.
    pub fn require_field(&self, key: &str) -> Result<&'static FieldDefinition, DomainError> {
        self.field(key).ok_or_else(|| {
            DomainError::Validation(format!("unknown field '{key}' for module '{}'", self.key))
        })
    }

    /// Returns the keys of required fields that are blank in `fields`.
    #[must_use]
    pub fn missing_required(&self, fields: &FieldMap) -> Vec<String> {
        self.fields
            .iter()
            .filter(|field| field.required)
            .filter(|field| fields.get(field.key).is_none_or(|value| is_blank(value)))
            .map(|field| field.key.to_owned())
            .collect()
    }
}

/// Returns true when the text has no visible characters.
#[must_use]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Returns the full catalog in registry order.
#[must_use]
pub fn module_definitions() -> &'static [ModuleDefinition] {
    &MODULE_DEFINITIONS
}

const fn required(key: &'static str, label: &'static str) -> FieldDefinition {
    FieldDefinition {
        key,
        label,
        required: true,
        min_length: Some(10),
        max_length: Some(4000),
    }
}

const fn optional(key: &'static str, label: &'static str) -> FieldDefinition {
    FieldDefinition {
        key,
        label,
        required: false,
        min_length: None,
        max_length: Some(2000),
    }
}

static MODULE_DEFINITIONS: [ModuleDefinition; 7] = [
    ModuleDefinition {
        key: ModuleKey::Cosmology,
        label: "Cosmology",
        fields: &[
            required("origin", "Origin of the world"),
            required("metaphysics", "Metaphysical laws"),
            optional("deities", "Deities and powers"),
            optional("celestial_bodies", "Celestial bodies"),
        ],
    },
    ModuleDefinition {
        key: ModuleKey::Geography,
        label: "Geography",
        fields: &[
            required("continents", "Continents and regions"),
            required("climate", "Climate and seasons"),
            optional("landmarks", "Notable landmarks"),
        ],
    },
    ModuleDefinition {
        key: ModuleKey::History,
        label: "History",
        fields: &[
            required("founding", "Founding events"),
            required("eras", "Major eras"),
            optional("turning_points", "Turning points"),
        ],
    },
    ModuleDefinition {
        key: ModuleKey::Peoples,
        label: "Peoples",
        fields: &[
            required("races", "Peoples and races"),
            required("relations", "Relations between peoples"),
            optional("origins", "Origins and migrations"),
        ],
    },
    ModuleDefinition {
        key: ModuleKey::Societies,
        label: "Societies",
        fields: &[
            required("governance", "Governance"),
            required("social_structure", "Social structure"),
            optional("laws", "Laws and justice"),
        ],
    },
    ModuleDefinition {
        key: ModuleKey::Cultures,
        label: "Cultures",
        fields: &[
            required("beliefs", "Beliefs and religion"),
            required("customs", "Customs and rituals"),
            optional("arts", "Arts"),
            optional("languages", "Languages"),
        ],
    },
    ModuleDefinition {
        key: ModuleKey::Conflicts,
        label: "Conflicts",
        fields: &[
            required("tensions", "Central tensions"),
            required("factions", "Factions"),
            optional("threats", "Looming threats"),
        ],
    },
];
