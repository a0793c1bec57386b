//! Column masking rules.
//!
//! Masking runs on extracted rows before they reach the QA database. NULL
//! stays NULL under every rule. `hash_email` is deterministic for a given salt,
//! so masked emails still join across tables; the other rules are random.

use std::collections::BTreeMap;
use std::str::FromStr;

use fake::faker::name::en::Name;
use fake::Fake;
use rand::Rng;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::value::{RowSet, SqlValue};
use crate::error::{Result, SyncError};

/// Replacement written for redacted values.
pub const REDACTED: &str = "****";

/// Domain appended to hashed emails.
const ANON_DOMAIN: &str = "@anon.com";

/// Hex characters of the digest kept in a hashed email.
const HASH_PREFIX_LEN: usize = 10;

/// How a column is anonymized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingRule {
    /// `hex(sha256(value || salt))[..10]@anon.com`.
    HashEmail,
    /// Synthetic full name.
    FakeName,
    /// Random digits and letters in the original positions.
    PreserveFormat,
    /// Constant `****`.
    Redact,
    /// Copy the value unchanged.
    None,
}

impl MaskingRule {
    /// Configuration name of the rule.
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskingRule::HashEmail => "hash_email",
            MaskingRule::FakeName => "fake_name",
            MaskingRule::PreserveFormat => "preserve_format",
            MaskingRule::Redact => "redact",
            MaskingRule::None => "none",
        }
    }
}

impl std::fmt::Display for MaskingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies masking rules with a fixed hash salt.
pub struct Masker {
    salt: SecretString,
}

impl std::fmt::Debug for Masker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Masker").field("salt", &"[REDACTED]").finish()
    }
}

impl Masker {
    /// Create a masker using the given salt for `hash_email`.
    pub fn new(salt: SecretString) -> Self {
        Self { salt }
    }

    /// Mask one value using the thread-local RNG.
    pub fn mask(&self, value: &SqlValue, rule: MaskingRule) -> SqlValue {
        self.mask_with_rng(value, rule, &mut rand::thread_rng())
    }

    /// Mask one value drawing randomness from `rng`.
    pub fn mask_with_rng<R: Rng + ?Sized>(
        &self,
        value: &SqlValue,
        rule: MaskingRule,
        rng: &mut R,
    ) -> SqlValue {
        if value.is_null() {
            return value.clone();
        }
        match rule {
            MaskingRule::None => value.clone(),
            MaskingRule::Redact => SqlValue::text(REDACTED),
            MaskingRule::FakeName => {
                let name: String = Name().fake_with_rng(rng);
                SqlValue::Text(name)
            }
            MaskingRule::HashEmail => {
                let plain = value.to_plain_string().unwrap_or_default();
                SqlValue::Text(self.hash_email(&plain))
            }
            MaskingRule::PreserveFormat => preserve_format(value, rng),
        }
    }

    /// Deterministic pseudonymous email for a plain value.
    pub fn hash_email(&self, plain: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(plain.as_bytes());
        hasher.update(self.salt.expose_secret().as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}{}", &digest[..HASH_PREFIX_LEN], ANON_DOMAIN)
    }

    /// Apply rules column by column to every row.
    ///
    /// A rule naming a column missing from the extracted rows is a schema
    /// mismatch; no row is modified in that case.
    pub fn mask_rows(
        &self,
        table: &str,
        rows: &mut RowSet,
        rules: &BTreeMap<String, MaskingRule>,
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(rules.len());
        for (column, rule) in rules {
            let idx = rows
                .column_index(column)
                .ok_or_else(|| SyncError::SchemaMismatch {
                    table: table.to_string(),
                    column: column.clone(),
                })?;
            if *rule != MaskingRule::None {
                targets.push((idx, *rule));
            }
        }

        let mut rng = rand::thread_rng();
        for row in rows.rows.iter_mut() {
            for &(idx, rule) in &targets {
                if let Some(cell) = row.get_mut(idx) {
                    *cell = self.mask_with_rng(cell, rule, &mut rng);
                }
            }
        }
        Ok(())
    }
}

/// Serialize a rule map for the audit trail.
pub fn rules_to_json(rules: &BTreeMap<String, MaskingRule>) -> String {
    serde_json::to_string(rules).unwrap_or_else(|_| "{}".to_string())
}

fn preserve_format<R: Rng + ?Sized>(value: &SqlValue, rng: &mut R) -> SqlValue {
    match value {
        SqlValue::I16(v) => {
            let m = random_magnitude(i64::from(*v), i64::from(i16::MAX), rng);
            SqlValue::I16(i16::try_from(m).unwrap_or(*v))
        }
        SqlValue::I32(v) => {
            let m = random_magnitude(i64::from(*v), i64::from(i32::MAX), rng);
            SqlValue::I32(i32::try_from(m).unwrap_or(*v))
        }
        SqlValue::I64(v) => SqlValue::I64(random_magnitude(*v, i64::MAX, rng)),
        SqlValue::Decimal(d) => {
            let scrambled = scramble(&d.to_string(), false, rng);
            Decimal::from_str(&scrambled)
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::Text(scrambled))
        }
        SqlValue::F64(f) => {
            let scrambled = scramble(&f.to_string(), false, rng);
            scrambled
                .parse::<f64>()
                .map(SqlValue::F64)
                .unwrap_or(SqlValue::Text(scrambled))
        }
        SqlValue::F32(f) => {
            let scrambled = scramble(&f.to_string(), false, rng);
            scrambled
                .parse::<f32>()
                .map(SqlValue::F32)
                .unwrap_or(SqlValue::Text(scrambled))
        }
        other => {
            let plain = other.to_plain_string().unwrap_or_default();
            SqlValue::Text(scramble(&plain, true, rng))
        }
    }
}

/// Random integer with the sign and decimal digit count of `original`.
fn random_magnitude<R: Rng + ?Sized>(original: i64, max: i64, rng: &mut R) -> i64 {
    let magnitude = original.unsigned_abs();
    let digits = magnitude.to_string().len() as u32;
    let value = if digits == 1 {
        rng.gen_range(0..=9)
    } else {
        let low = 10i64.pow(digits - 1);
        let high = 10i64.checked_pow(digits).map(|p| p - 1).unwrap_or(max).min(max);
        rng.gen_range(low..=high)
    };
    if original < 0 {
        -value
    } else {
        value
    }
}

/// Replace ASCII digits (and letters, when `letters` is set) with random
/// characters of the same class, keeping every other character.
fn scramble<R: Rng + ?Sized>(input: &str, letters: bool, rng: &mut R) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                char::from(b'0' + rng.gen_range(0..10u8))
            } else if letters && c.is_ascii_lowercase() {
                char::from(b'a' + rng.gen_range(0..26u8))
            } else if letters && c.is_ascii_uppercase() {
                char::from(b'A' + rng.gen_range(0..26u8))
            } else {
                c
            }
        })
        .collect()
}
