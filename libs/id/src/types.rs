//! Identifier definitions for buses, rules, and target attachments.

use crate::{define_id, IdError, Ulid};

// =============================================================================
// Target Attachments and Requests
// =============================================================================

define_id!(TargetId, "tgt");
define_id!(RequestId, "req");

// =============================================================================
// Bus Index
// =============================================================================

/// Numeric identity of a bus within a pool.
///
/// Index 0 is reserved for the default bus; pooled buses start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusIndex(u32);

impl BusIndex {
    /// The reserved index of the default bus.
    pub const DEFAULT: Self = Self(0);

    /// The first index handed out to a pooled bus.
    pub const FIRST_POOLED: Self = Self(1);

    /// Creates a new BusIndex from a u32.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Returns true for the reserved default bus index.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for BusIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for BusIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl From<BusIndex> for u32 {
    fn from(index: BusIndex) -> Self {
        index.0
    }
}

impl serde::Serialize for BusIndex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for BusIndex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let index = u32::deserialize(deserializer)?;
        Ok(Self(index))
    }
}

// =============================================================================
// Bus Name
// =============================================================================

/// Name of a bus together with the index embedded in it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusName {
    name: String,
    index: BusIndex,
}

impl BusName {
    /// Separator between the pool prefix and the bus index.
    pub const SEPARATOR: char = '-';

    /// Longest pool prefix for which every generated rule name
    /// (`{prefix}-{index}-{ulid}`) still fits in [`RuleName::MAX_LEN`].
    pub const MAX_PREFIX_LEN: usize = RuleName::MAX_LEN - 1 - 10 - 1 - 26;

    /// Builds the name of a pooled bus: `{prefix}-{index}`.
    pub fn pooled(prefix: &str, index: BusIndex) -> Result<Self, IdError> {
        if prefix.is_empty() {
            return Err(IdError::Empty);
        }
        if prefix.len() > Self::MAX_PREFIX_LEN
            || !prefix.starts_with(|c: char| c.is_ascii_alphanumeric())
            || !is_name_charset(prefix)
        {
            return Err(IdError::InvalidFormat {
                message: format!(
                    "bus prefix '{prefix}' must be at most {} letters, digits, '.', '_' or '-', starting with a letter or digit",
                    Self::MAX_PREFIX_LEN
                ),
            });
        }
        if index.is_default() {
            return Err(IdError::InvalidIndex(index.to_string()));
        }

        Ok(Self {
            name: format!("{prefix}{}{index}", Self::SEPARATOR),
            index,
        })
    }

    /// Wraps the name of the pre-existing default bus (index 0).
    pub fn default_bus(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdError::Empty);
        }

        Ok(Self {
            name,
            index: BusIndex::DEFAULT,
        })
    }

    /// Parses a pooled bus name produced by [`BusName::pooled`].
    ///
    /// Only the canonical decimal form is accepted, so `pool-01` and `pool-+1`
    /// are rejected even though they would parse as numbers.
    pub fn parse_pooled(prefix: &str, s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((actual_prefix, raw_index)) = s.rsplit_once(Self::SEPARATOR) else {
            return Err(IdError::MissingSeparator(Self::SEPARATOR));
        };

        if actual_prefix != prefix {
            return Err(IdError::InvalidPrefix {
                expected: prefix.to_string(),
                actual: actual_prefix.to_string(),
            });
        }

        let canonical = !raw_index.is_empty()
            && raw_index.bytes().all(|b| b.is_ascii_digit())
            && !raw_index.starts_with('0');
        if !canonical {
            return Err(IdError::InvalidIndex(raw_index.to_string()));
        }

        let index: u32 = raw_index
            .parse()
            .map_err(|_| IdError::InvalidIndex(raw_index.to_string()))?;

        Self::pooled(prefix, BusIndex::new(index))
    }

    /// Returns the bus name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Returns the index embedded in the name.
    #[must_use]
    pub const fn index(&self) -> BusIndex {
        self.index
    }

    /// Returns true for the default bus.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.index.is_default()
    }
}

impl std::fmt::Display for BusName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for BusName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl serde::Serialize for BusName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.name)
    }
}

// =============================================================================
// Rule Name
// =============================================================================

/// Name of a scheduled rule.
///
/// Generated names are scoped to the bus the rule is placed on; names read
/// back from the backend are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleName(String);

impl RuleName {
    /// Generates a fresh rule name for a rule placed on `bus`.
    #[must_use]
    pub fn generate(bus: &BusName) -> Self {
        Self(format!("{}{}{}", bus, BusName::SEPARATOR, Ulid::new()))
    }

    /// Longest name the scheduling backend accepts.
    pub const MAX_LEN: usize = 64;

    /// Wraps a name that already exists (reported by the backend or chosen
    /// by the caller).
    ///
    /// Names must match `[A-Za-z0-9][A-Za-z0-9._-]*` and be at most
    /// [`RuleName::MAX_LEN`] bytes long.
    pub fn existing(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if name.is_empty() {
            return Err(IdError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(IdError::InvalidFormat {
                message: format!(
                    "rule name '{name}' is longer than {} characters",
                    Self::MAX_LEN
                ),
            });
        }
        if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) || !is_name_charset(&name) {
            return Err(IdError::InvalidFormat {
                message: format!(
                    "rule name '{name}' must start with a letter or digit and contain only letters, digits, '.', '_' or '-'"
                ),
            });
        }
        Ok(Self(name))
    }

    /// Returns the rule name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this name was generated for `bus`.
    #[must_use]
    pub fn is_scoped_to(&self, bus: &BusName) -> bool {
        self.0
            .strip_prefix(bus.as_str())
            .is_some_and(|rest| rest.starts_with(BusName::SEPARATOR))
    }
}

fn is_name_charset(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

impl std::fmt::Display for RuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for RuleName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::existing(s)
    }
}

impl serde::Serialize for RuleName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for RuleName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::existing(s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
