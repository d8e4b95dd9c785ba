//! Job identifier newtype.
//!
//! Job identifiers travel through queue payloads and name output files.
//! Intake mints them from random UUIDs. Identifiers from other producers must
//! be 1 to 128 ASCII letters, digits, `-` or `_`, so an identifier is always a
//! safe, distinct file stem. Deserialization applies the same rules. With the
//! `sqlx` feature enabled the type maps to a PostgreSQL `TEXT` column.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Longest accepted identifier.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Opaque unique identifier of a conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier and return the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("Job identifier must not be empty"));
        }
        if trimmed.len() > MAX_JOB_ID_LEN {
            return Err(AppError::validation(format!(
                "Job identifier exceeds {MAX_JOB_ID_LEN} characters"
            )));
        }
        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')))
        {
            return Err(AppError::validation(format!(
                "Job identifier contains invalid character '{c}'"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::Type<sqlx::Postgres> for JobId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "sqlx")]
impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JobId {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Postgres as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(feature = "sqlx")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JobId {
    fn decode(
        value: <sqlx::Postgres as sqlx::Database>::ValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        <String as sqlx::Decode<'r, sqlx::Postgres>>::decode(value).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique_uuids() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!("   ".parse::<JobId>().is_err());
        assert_eq!("J1".parse::<JobId>().unwrap().as_str(), "J1");
    }

    #[test]
    fn test_parse_rejects_path_like_ids() {
        for raw in ["a/b", "../J1", "J1.mp3", "J 1", "j\\1"] {
            assert!(raw.parse::<JobId>().is_err(), "{raw} should be rejected");
        }
        assert!("x".repeat(MAX_JOB_ID_LEN + 1).parse::<JobId>().is_err());
        assert!("Job_2024-01".parse::<JobId>().is_ok());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id: JobId = "J1".parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"J1\"");
        assert_eq!(serde_json::from_str::<JobId>("\"J1\"").unwrap(), id);
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<JobId>("\"\"").is_err());
        assert!(serde_json::from_str::<JobId>("\"a/b\"").is_err());
    }
}
