//! Worker roles.
//!
//! The hierarchy is fixed: one commander, one steward and `N` laborers.
//! Every role maps to exactly one pooled runner process.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Default number of laborers.
pub const DEFAULT_LABORER_COUNT: usize = 8;

/// A worker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Turns a free-form request into a concrete instruction.
    Commander,
    /// Decomposes an instruction into per-laborer subtasks.
    Steward,
    /// Executes one subtask; the index is 1-based.
    Laborer(usize),
}

impl Role {
    /// Every role for a pool with `laborer_count` laborers, in startup order.
    pub fn roster(laborer_count: usize) -> Vec<Self> {
        let mut roles = Vec::with_capacity(laborer_count + 2);
        roles.push(Self::Commander);
        roles.push(Self::Steward);
        roles.extend((1..=laborer_count).map(Self::Laborer));
        roles
    }

    /// Laborer index, if this is a laborer.
    pub const fn laborer_index(self) -> Option<usize> {
        match self {
            Self::Laborer(n) => Some(n),
            _ => None,
        }
    }

    pub const fn is_laborer(self) -> bool {
        matches!(self, Self::Laborer(_))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commander => f.write_str("commander"),
            Self::Steward => f.write_str("steward"),
            Self::Laborer(n) => write!(f, "laborer_{n}"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commander" => Ok(Self::Commander),
            "steward" => Ok(Self::Steward),
            other => other
                .strip_prefix("laborer_")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n >= 1)
                .map(Self::Laborer)
                .ok_or_else(|| Error::InvalidRole(other.to_string())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn roster_orders_commander_steward_then_laborers() {
        let roles = Role::roster(3);
        assert_eq!(
            roles,
            vec![
                Role::Commander,
                Role::Steward,
                Role::Laborer(1),
                Role::Laborer(2),
                Role::Laborer(3),
            ]
        );
        assert_eq!(Role::roster(DEFAULT_LABORER_COUNT).len(), 10);
    }

    #[test]
    fn display_and_parse_agree() {
        for role in Role::roster(8) {
            let text = role.to_string();
            assert_eq!(text.parse::<Role>().unwrap(), role);
        }
        assert_eq!(Role::Laborer(7).to_string(), "laborer_7");
    }

    #[test]
    fn parse_rejects_bad_names() {
        assert!("laborer_0".parse::<Role>().is_err());
        assert!("laborer_x".parse::<Role>().is_err());
        assert!("karo".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_text_form() {
        let json = serde_json::to_string(&Role::Laborer(2)).unwrap();
        assert_eq!(json, "\"laborer_2\"");
        let back: Role = serde_json::from_str("\"steward\"").unwrap();
        assert_eq!(back, Role::Steward);
    }
}
