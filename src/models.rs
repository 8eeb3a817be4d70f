//! Data models for sample handling and storage
//!
//! This module contains the sample classification enums, the stored
//! sample record, and the aggregate counters reported by the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::SampleError;

/// Classification label of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    /// Legitimate message
    Ham,
    /// Spam message
    Spam,
}

impl SampleType {
    /// Literal used in storage and on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ham => "ham",
            Self::Spam => "spam",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ham" => Ok(Self::Ham),
            "spam" => Ok(Self::Spam),
            other => Err(SampleError::InvalidValue {
                kind: "sample type",
                value: other.to_string(),
            }),
        }
    }
}

/// Provenance tier of a sample
///
/// `Any` is only meaningful as a read filter; stored rows are always
/// `Preset` or `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrigin {
    /// Curated, operator-supplied
    Preset,
    /// Submitted by end users
    User,
    /// No origin filter
    Any,
}

impl SampleOrigin {
    /// Literal used in storage and on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preset => "preset",
            Self::User => "user",
            Self::Any => "any",
        }
    }

    /// Whether rows can carry this origin
    #[must_use]
    pub const fn is_storable(&self) -> bool {
        !matches!(self, Self::Any)
    }
}

impl fmt::Display for SampleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleOrigin {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preset" => Ok(Self::Preset),
            "user" => Ok(Self::User),
            "any" => Ok(Self::Any),
            other => Err(SampleError::InvalidValue {
                kind: "sample origin",
                value: other.to_string(),
            }),
        }
    }
}

impl ToSql for SampleType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SampleType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for SampleOrigin {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SampleOrigin {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Database representation of a sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Database primary key
    pub id: i64,
    /// Ham or spam
    pub sample_type: SampleType,
    /// Preset or user, never `Any`
    pub origin: SampleOrigin,
    /// Sample text, unique across the store
    pub message: String,
    /// Last write time; defines recency order
    pub created_at: DateTime<Utc>,
}

/// Aggregate sample counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Spam samples of any origin
    pub total_spam: usize,
    /// Ham samples of any origin
    pub total_ham: usize,
    /// Preset spam samples
    pub preset_spam: usize,
    /// Preset ham samples
    pub preset_ham: usize,
    /// User spam samples
    pub user_spam: usize,
    /// User ham samples
    pub user_ham: usize,
}

impl SampleStats {
    /// Number of stored samples
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total_spam + self.total_ham
    }

    /// Number of preset samples
    #[must_use]
    pub const fn preset(&self) -> usize {
        self.preset_spam + self.preset_ham
    }

    /// Number of user samples
    #[must_use]
    pub const fn user(&self) -> usize {
        self.user_spam + self.user_ham
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_type_parse() {
        assert_eq!("ham".parse::<SampleType>().unwrap(), SampleType::Ham);
        assert_eq!("spam".parse::<SampleType>().unwrap(), SampleType::Spam);
        assert!("invalid".parse::<SampleType>().is_err());
        assert!("спам".parse::<SampleType>().is_err());
        assert!("Ham".parse::<SampleType>().is_err());
    }

    #[test]
    fn test_sample_origin_parse() {
        assert_eq!("preset".parse::<SampleOrigin>().unwrap(), SampleOrigin::Preset);
        assert_eq!("user".parse::<SampleOrigin>().unwrap(), SampleOrigin::User);
        assert_eq!("any".parse::<SampleOrigin>().unwrap(), SampleOrigin::Any);
        assert!("invalid".parse::<SampleOrigin>().is_err());
        assert!("用户".parse::<SampleOrigin>().is_err());
    }

    #[test]
    fn test_invalid_value_is_validation_error() {
        let err = "junk".parse::<SampleType>().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "invalid sample type: \"junk\"");
    }

    #[test]
    fn test_origin_storable() {
        assert!(SampleOrigin::Preset.is_storable());
        assert!(SampleOrigin::User.is_storable());
        assert!(!SampleOrigin::Any.is_storable());
    }

    #[test]
    fn test_stats_totals() {
        let stats = SampleStats {
            total_spam: 3,
            total_ham: 3,
            preset_spam: 1,
            preset_ham: 2,
            user_spam: 2,
            user_ham: 1,
        };
        assert_eq!(stats.total(), 6);
        assert_eq!(stats.preset(), 3);
        assert_eq!(stats.user(), 3);
    }

    #[test]
    fn test_serde_literals() {
        assert_eq!(serde_json::to_string(&SampleType::Spam).unwrap(), "\"spam\"");
        assert_eq!(serde_json::to_string(&SampleOrigin::Any).unwrap(), "\"any\"");
    }

    proptest! {
        #[test]
        fn prop_unknown_type_literals_rejected(s in "\\PC{0,16}") {
            prop_assume!(s != "ham" && s != "spam");
            prop_assert!(s.parse::<SampleType>().is_err());
        }

        #[test]
        fn prop_unknown_origin_literals_rejected(s in "\\PC{0,16}") {
            prop_assume!(s != "preset" && s != "user" && s != "any");
            prop_assert!(s.parse::<SampleOrigin>().is_err());
        }
    }
}
