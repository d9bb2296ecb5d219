use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeDelta, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Textual layout used for every persisted and serialized timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// UTC instant with whole-second precision, rendered as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn from_utc(instant: DateTime<Utc>) -> Self {
        Self(instant.trunc_subsecs(0).naive_utc())
    }

    /// Returns `None` when the result falls outside the representable range.
    pub fn checked_add_minutes(self, minutes: i64) -> Option<Self> {
        let delta = TimeDelta::try_minutes(minutes)?;
        self.0.checked_add_signed(delta).map(Self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map(Self)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A stored secret as seen by callers of the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub secret_text: String,
    pub hash: String,
    pub remaining_views: i64,
    pub created_at: Timestamp,
    /// `None` means the secret never expires by time.
    pub expires_at: Option<Timestamp>,
}

impl Secret {
    pub fn new(
        secret_text: String,
        hash: String,
        remaining_views: i64,
        created_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Self {
        Self {
            secret_text,
            hash,
            remaining_views,
            created_at,
            expires_at,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_views <= 0
    }

    /// Strictly past `expires_at`; a read at exactly the expiry second still succeeds.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(exp) if exp < now)
    }
}

/// Row layout persisted in redb as bincode-encoded bytes.
/// Timestamps are kept as their textual form so the table mirrors the wire layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRow {
    pub secret_text: String,
    pub hash_value: String,
    pub remaining_views: i64,
    pub created_at: String,
    pub expires_at: Option<String>,
}

impl From<&Secret> for SecretRow {
    fn from(secret: &Secret) -> Self {
        Self {
            secret_text: secret.secret_text.clone(),
            hash_value: secret.hash.clone(),
            remaining_views: secret.remaining_views,
            created_at: secret.created_at.to_string(),
            expires_at: secret.expires_at.map(|t| t.to_string()),
        }
    }
}

impl TryFrom<SecretRow> for Secret {
    type Error = anyhow::Error;

    fn try_from(row: SecretRow) -> Result<Self> {
        let created_at = row
            .created_at
            .parse()
            .with_context(|| format!("parse createdAt {:?}", row.created_at))?;
        let expires_at = row
            .expires_at
            .as_deref()
            .map(|s| s.parse().with_context(|| format!("parse expiresAt {s:?}")))
            .transpose()?;
        Ok(Secret::new(
            row.secret_text,
            row.hash_value,
            row.remaining_views,
            created_at,
            expires_at,
        ))
    }
}
