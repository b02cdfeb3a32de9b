//! One-way identifier hashing and canonical input hashing
//!
//! Raw identifiers (device, phone, email, national id) never leave this module:
//! counters and consortium records are keyed by peppered SHA-256 digests.
//! The idempotency cache key is a BLAKE3 digest of a canonical,
//! length-prefixed serialization of the scoring-relevant fields.

use crate::types::{IdentifierKind, Transaction};
use chrono::Timelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded one-way hash of an identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierHash(String);

impl IdentifierHash {
    /// Wrap an already computed digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes identifiers with a deployment-wide pepper
#[derive(Clone)]
pub struct IdentifierHasher {
    pepper: Vec<u8>,
}

impl fmt::Debug for IdentifierHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierHasher").finish_non_exhaustive()
    }
}

impl IdentifierHasher {
    /// Create new hasher
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self {
            pepper: pepper.as_ref().to_vec(),
        }
    }

    /// Hash one identifier after normalizing it for its kind
    pub fn hash(&self, kind: IdentifierKind, raw: &str) -> IdentifierHash {
        let normalized = normalize_identifier(kind, raw);
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update([0u8]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized.as_bytes());
        IdentifierHash(hex::encode(hasher.finalize()))
    }

    /// Hash every identifier present on a transaction
    pub fn hash_all(&self, tx: &Transaction) -> Vec<(IdentifierKind, IdentifierHash)> {
        tx.identifiers()
            .into_iter()
            .map(|(kind, raw)| (kind, self.hash(kind, raw)))
            .collect()
    }

    /// Opaque tenant token, so consortium records never carry raw tenant ids
    pub fn tenant_token(&self, tenant_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update(b"\0tenant\0");
        hasher.update(tenant_id.trim().as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }

    /// Opaque token for one feedback report, so consortium records can
    /// ignore a replay without learning the transaction id
    pub fn report_token(&self, tenant_id: &str, transaction_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.pepper);
        hasher.update(b"\0report\0");
        hasher.update(tenant_id.trim().as_bytes());
        hasher.update(b"\0");
        hasher.update(transaction_id.trim().as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

/// Canonical form of an identifier: equal people produce equal strings
pub fn normalize_identifier(kind: IdentifierKind, raw: &str) -> String {
    let trimmed = raw.trim();
    match kind {
        IdentifierKind::Email => trimmed.to_lowercase(),
        IdentifierKind::Phone => {
            let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
            if trimmed.starts_with('+') {
                format!("+{}", digits)
            } else {
                digits
            }
        }
        IdentifierKind::NationalId => trimmed
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase(),
        IdentifierKind::Device => trimmed.to_string(),
    }
}

/// Canonical serializer
///
/// Fixed field order, length-prefixed strings, presence markers for options,
/// normalized decimals. Same logical input, same bytes.
struct CanonicalSerializer {
    buffer: Vec<u8>,
}

impl CanonicalSerializer {
    fn new() -> Self {
        Self { buffer: Vec::with_capacity(256) }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn write_u32(&mut self, n: u32) {
        self.write_bytes(&n.to_be_bytes());
    }

    fn write_i64(&mut self, n: i64) {
        self.write_bytes(&n.to_be_bytes());
    }

    fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.write_bytes(s.as_bytes());
    }

    fn write_decimal(&mut self, d: &Decimal) {
        self.write_string(&d.normalize().to_string());
    }

    fn write_option_string(&mut self, opt: Option<&str>) {
        match opt {
            Some(s) => {
                self.write_bytes(&[1]);
                self.write_string(s);
            }
            None => self.write_bytes(&[0]),
        }
    }

    fn write_option_i64(&mut self, opt: Option<i64>) {
        match opt {
            Some(n) => {
                self.write_bytes(&[1]);
                self.write_i64(n);
            }
            None => self.write_bytes(&[0]),
        }
    }

    fn write_bool(&mut self, b: bool) {
        self.write_bytes(&[b as u8]);
    }

    fn hash(self) -> String {
        blake3::hash(&self.buffer).to_hex().to_string()
    }
}

/// Idempotency key of a transaction
///
/// Covers every field that can change the score. `transaction_id` is
/// excluded and `occurred_at` enters only through what the rules read from
/// it (device-local hour, account age in days), so a resubmission of the
/// same logical transaction under a new id collapses onto one cache entry.
pub fn input_hash(tx: &Transaction) -> String {
    let mut ser = CanonicalSerializer::new();

    ser.write_string(tx.tenant_id.trim());
    ser.write_string(tx.user_id.trim());
    ser.write_decimal(&tx.amount);
    ser.write_string(&tx.currency.trim().to_uppercase());
    ser.write_string(&tx.vertical.trim().to_lowercase());

    let device = tx
        .device_fingerprint
        .as_deref()
        .map(|v| normalize_identifier(IdentifierKind::Device, v));
    let phone = tx.phone.as_deref().map(|v| normalize_identifier(IdentifierKind::Phone, v));
    let email = tx.email.as_deref().map(|v| normalize_identifier(IdentifierKind::Email, v));
    let national_id = tx
        .national_id
        .as_deref()
        .map(|v| normalize_identifier(IdentifierKind::NationalId, v));
    ser.write_option_string(device.as_deref());
    ser.write_option_string(tx.ip_address.as_deref().map(str::trim));
    ser.write_option_string(phone.as_deref());
    ser.write_option_string(email.as_deref());
    ser.write_option_string(national_id.as_deref());

    let country = tx.country.as_deref().map(|c| c.trim().to_uppercase());
    let ip_country = tx.ip_country.as_deref().map(|c| c.trim().to_uppercase());
    ser.write_option_string(country.as_deref());
    ser.write_option_string(ip_country.as_deref());
    ser.write_option_string(tx.payment_method.as_deref().map(str::trim));
    ser.write_option_string(tx.beneficiary_id.as_deref().map(str::trim));
    ser.write_option_i64(tx.account_age_days());
    ser.write_u32(tx.local_time().hour());

    match &tx.device {
        Some(d) => {
            ser.write_bytes(&[1]);
            ser.write_bool(d.emulator);
            ser.write_bool(d.rooted);
            ser.write_bool(d.headless);
            ser.write_option_i64(d.timezone_offset_minutes.map(i64::from));
            ser.write_option_i64(d.session_duration_seconds.map(i64::from));
        }
        None => ser.write_bytes(&[0]),
    }
    match &tx.network {
        Some(n) => {
            ser.write_bytes(&[1]);
            ser.write_bool(n.vpn);
            ser.write_bool(n.proxy);
            ser.write_bool(n.tor);
            ser.write_bool(n.hosting);
        }
        None => ser.write_bytes(&[0]),
    }

    // BTreeMap iterates in key order; serde_json renders objects with sorted keys by default
    ser.write_u32(tx.context.len() as u32);
    for (key, value) in &tx.context {
        ser.write_string(key);
        ser.write_string(&value.to_string());
    }

    ser.hash()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceAttributes;
    use chrono::{Duration, TimeZone, Utc};

    fn tx() -> Transaction {
        let mut tx = Transaction::new("tx-1", "tenant-a", "user-1", Decimal::new(50000, 2), "usd", "Lending");
        tx.email = Some("Jane@Example.com ".to_string());
        tx.phone = Some("+1 (415) 555-0100".to_string());
        tx.device_fingerprint = Some("fp-123".to_string());
        tx.occurred_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        tx
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_identifier(IdentifierKind::Email, " Jane@Example.COM"), "jane@example.com");
        assert_eq!(normalize_identifier(IdentifierKind::Phone, "+1 (415) 555-0100"), "+14155550100");
        assert_eq!(normalize_identifier(IdentifierKind::Phone, "415.555.0100"), "4155550100");
        assert_eq!(normalize_identifier(IdentifierKind::NationalId, "123-45-678x"), "12345678X");
    }

    #[test]
    fn test_identifier_hash_is_one_way_and_stable() {
        let hasher = IdentifierHasher::new("pepper");
        let a = hasher.hash(IdentifierKind::Email, "jane@example.com");
        let b = hasher.hash(IdentifierKind::Email, "  JANE@example.com");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(!a.as_str().contains("jane"));

        // Same value under another kind or pepper is a different key
        assert_ne!(a, hasher.hash(IdentifierKind::Device, "jane@example.com"));
        assert_ne!(a, IdentifierHasher::new("other").hash(IdentifierKind::Email, "jane@example.com"));
    }

    #[test]
    fn test_input_hash_ignores_volatile_fields() {
        let first = tx();
        let mut second = tx();
        second.transaction_id = "tx-2".to_string();
        second.occurred_at = first.occurred_at + Duration::seconds(30);
        second.amount = Decimal::new(500, 0);
        second.currency = "USD".to_string();
        second.email = Some("jane@example.com".to_string());

        assert_eq!(input_hash(&first), input_hash(&second));
    }

    #[test]
    fn test_input_hash_sensitive_to_scoring_fields() {
        let base = input_hash(&tx());

        let mut changed = tx();
        changed.amount = Decimal::new(50001, 2);
        assert_ne!(base, input_hash(&changed));

        let mut changed = tx();
        changed.device_fingerprint = None;
        assert_ne!(base, input_hash(&changed));

        let mut changed = tx();
        changed.context.insert("channel".to_string(), serde_json::json!("mobile"));
        assert_ne!(base, input_hash(&changed));
    }

    #[test]
    fn test_input_hash_tracks_time_derived_features() {
        let mut night = tx();
        night.occurred_at = Utc.with_ymd_and_hms(2024, 5, 1, 2, 30, 0).unwrap();
        let mut noon = tx();
        noon.occurred_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_ne!(input_hash(&night), input_hash(&noon));

        // 23:30 UTC on a UTC+3 device is night locally
        let mut shifted = noon.clone();
        shifted.occurred_at = Utc.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
        shifted.device = Some(DeviceAttributes {
            timezone_offset_minutes: Some(180),
            ..DeviceAttributes::default()
        });
        assert_eq!(shifted.local_time().hour(), 2);

        let mut young = tx();
        young.account_created_at = Some(young.occurred_at - Duration::days(7));
        let mut old = young.clone();
        old.account_created_at = Some(old.occurred_at - Duration::days(40));
        assert_ne!(input_hash(&young), input_hash(&old));
    }

    #[test]
    fn test_context_order_independent() {
        let mut a = tx();
        a.context.insert("b".to_string(), serde_json::json!({"y": 1, "x": 2}));
        a.context.insert("a".to_string(), serde_json::json!(true));

        let mut b = tx();
        b.context.insert("a".to_string(), serde_json::json!(true));
        b.context.insert("b".to_string(), serde_json::json!({"x": 2, "y": 1}));

        assert_eq!(input_hash(&a), input_hash(&b));
    }
}
