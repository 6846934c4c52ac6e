//! Record validation for OHLCV-shaped batches.
//!
//! Each record goes through, in order: required-field presence, type
//! coercion, `high >= low`, `volume >= 0`, and identity-key uniqueness within
//! the current call. The first failing check is the rejection reason. A bad
//! record never aborts the batch; it is reported in `rejected`.

use crate::record::{Payload, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Field names (after translation) the validator reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OhlcvSchema {
    /// Timestamp/date field used to detect duplicates.
    pub identity: String,
    pub open: String,
    pub high: String,
    pub low: String,
    /// Close price field. Coerced when present.
    pub close: String,
    /// Reject records without a close price.
    pub require_close: bool,
    pub volume: String,
    /// Extra price fields coerced to floats when present.
    pub optional_prices: Vec<String>,
}

impl Default for OhlcvSchema {
    fn default() -> Self {
        Self {
            identity: "date".into(),
            open: "open".into(),
            high: "high".into(),
            low: "low".into(),
            close: "close".into(),
            require_close: false,
            volume: "volume".into(),
            optional_prices: Vec::new(),
        }
    }
}

impl OhlcvSchema {
    fn required_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.identity.as_str(),
            self.open.as_str(),
            self.high.as_str(),
            self.low.as_str(),
        ];
        if self.require_close {
            fields.push(self.close.as_str());
        }
        fields.push(self.volume.as_str());
        fields
    }
}

/// Why a record was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' is not a finite number: {value}")]
    NotNumeric { field: String, value: String },

    #[error("field '{field}' is not an integer: {value}")]
    NotInteger { field: String, value: String },

    #[error("identity field '{field}' is not a scalar: {value}")]
    BadIdentity { field: String, value: String },

    #[error("high {high} is below low {low} (high must be >= low)")]
    HighBelowLow { high: f64, low: f64 },

    #[error("volume {0} is negative")]
    NegativeVolume(i64),

    #[error("duplicate identity key '{0}'")]
    DuplicateIdentity(String),
}

/// A record that passed every check, with its values in canonical types.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub identity: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: Option<f64>,
    pub volume: i64,
    fields: Record,
}

impl ValidatedRecord {
    /// All fields, with the validated ones replaced by their coerced values.
    pub fn as_record(&self) -> &Record {
        &self.fields
    }

    pub fn into_record(self) -> Record {
        self.fields
    }
}

impl Serialize for ValidatedRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub record: Record,
    pub reason: RejectReason,
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Accepted records, in input order.
    pub accepted: Vec<ValidatedRecord>,
    pub rejected: Vec<Rejection>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    schema: OhlcvSchema,
}

impl RecordValidator {
    pub fn new(schema: OhlcvSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &OhlcvSchema {
        &self.schema
    }

    pub fn validate(&self, payload: Payload) -> ValidationReport {
        self.validate_batch(payload.into_records())
    }

    /// Validate one batch. Duplicate detection only spans this call.
    pub fn validate_batch(&self, records: Vec<Record>) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut seen: HashSet<String> = HashSet::new();

        for record in records {
            match self.check(&record, &seen) {
                Ok(validated) => {
                    seen.insert(validated.identity.clone());
                    report.accepted.push(validated);
                }
                Err(reason) => {
                    let shown = Value::Object(record.clone());
                    tracing::debug!(%reason, record = %shown, "skipping invalid record");
                    report.rejected.push(Rejection { record, reason });
                }
            }
        }

        tracing::debug!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "validation pass complete"
        );
        report
    }

    fn check(&self, record: &Record, seen: &HashSet<String>) -> Result<ValidatedRecord, RejectReason> {
        let schema = &self.schema;

        for field in schema.required_fields() {
            match record.get(field) {
                None | Some(Value::Null) => return Err(RejectReason::MissingField(field.to_string())),
                Some(_) => {}
            }
        }

        let identity = identity_of(&schema.identity, &record[schema.identity.as_str()])?;
        let open = price(record, &schema.open)?;
        let high = price(record, &schema.high)?;
        let low = price(record, &schema.low)?;
        let close = if has_value(record, &schema.close) {
            Some(price(record, &schema.close)?)
        } else {
            None
        };
        let volume = integer(record, &schema.volume)?;

        let mut fields = record.clone();
        fields.insert(schema.identity.clone(), Value::String(identity.clone()));
        fields.insert(schema.open.clone(), Value::from(open));
        fields.insert(schema.high.clone(), Value::from(high));
        fields.insert(schema.low.clone(), Value::from(low));
        if let Some(value) = close {
            fields.insert(schema.close.clone(), Value::from(value));
        }
        fields.insert(schema.volume.clone(), Value::from(volume));

        for field in &schema.optional_prices {
            if field == &schema.close || !has_value(record, field) {
                continue;
            }
            fields.insert(field.clone(), Value::from(price(record, field)?));
        }

        if high < low {
            return Err(RejectReason::HighBelowLow { high, low });
        }
        if volume < 0 {
            return Err(RejectReason::NegativeVolume(volume));
        }
        if seen.contains(&identity) {
            return Err(RejectReason::DuplicateIdentity(identity));
        }

        Ok(ValidatedRecord {
            identity,
            open,
            high,
            low,
            close,
            volume,
            fields,
        })
    }
}

fn has_value(record: &Record, field: &str) -> bool {
    !matches!(record.get(field), None | Some(Value::Null))
}

fn identity_of(field: &str, value: &Value) -> Result<String, RejectReason> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(RejectReason::BadIdentity {
            field: field.to_string(),
            value: other.to_string(),
        }),
    }
}

fn price(record: &Record, field: &str) -> Result<f64, RejectReason> {
    let value = &record[field];
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| RejectReason::NotNumeric {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn integer(record: &Record, field: &str) -> Result<i64, RejectReason> {
    let value = &record[field];
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RejectReason::NotInteger {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Inclusive bounds on the identity key, compared as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl IdentityRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.start.as_deref().map_or(true, |s| key >= s) && self.end.as_deref().map_or(true, |e| key <= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn bar(date: &str, high: &str, low: &str, volume: i64) -> Record {
        record(json!({
            "date": date,
            "open": "10",
            "high": high,
            "low": low,
            "volume": volume,
        }))
    }

    #[test]
    fn coerces_strings_to_canonical_types() {
        let report = RecordValidator::default().validate_batch(vec![record(json!({
            "open": "1", "high": "2", "low": "0.5", "volume": "100", "date": "2024-01-01"
        }))]);

        assert!(report.rejected.is_empty());
        let v = &report.accepted[0];
        assert_eq!(v.open, 1.0);
        assert_eq!(v.high, 2.0);
        assert_eq!(v.low, 0.5);
        assert_eq!(v.volume, 100);
        assert_eq!(v.identity, "2024-01-01");
        assert_eq!(v.as_record()["volume"], json!(100));
        assert_eq!(v.as_record()["open"], json!(1.0));
    }

    #[test]
    fn high_below_low_is_rejected() {
        let report = RecordValidator::default().validate_batch(vec![bar("d1", "1", "2", 10)]);
        assert!(report.accepted.is_empty());
        let reason = report.rejected[0].reason.to_string();
        assert!(reason.contains("high"));
        assert!(reason.contains("low"));
    }

    #[test]
    fn negative_volume_is_rejected() {
        let report = RecordValidator::default().validate_batch(vec![bar("d1", "2", "1", -1)]);
        assert_eq!(report.rejected[0].reason, RejectReason::NegativeVolume(-1));
    }

    #[test]
    fn only_second_duplicate_is_rejected() {
        let report = RecordValidator::default().validate_batch(vec![
            bar("d1", "2", "1", 10),
            bar("d2", "2", "1", 10),
            bar("d1", "3", "1", 10),
        ]);
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.accepted[0].identity, "d1");
        assert_eq!(report.accepted[0].high, 2.0);
        assert_eq!(
            report.rejected[0].reason,
            RejectReason::DuplicateIdentity("d1".into())
        );
    }

    #[test]
    fn rejected_record_does_not_claim_its_identity() {
        let report = RecordValidator::default().validate_batch(vec![
            bar("d1", "1", "2", 10),
            bar("d1", "2", "1", 10),
        ]);
        assert_eq!(report.accepted.len(), 1);
        assert!(matches!(report.rejected[0].reason, RejectReason::HighBelowLow { .. }));
    }

    #[test]
    fn duplicates_are_not_remembered_across_calls() {
        let validator = RecordValidator::default();
        let first = validator.validate_batch(vec![bar("d1", "2", "1", 10)]);
        let second = validator.validate_batch(vec![bar("d1", "2", "1", 10)]);
        assert_eq!(first.accepted.len(), 1);
        assert_eq!(second.accepted.len(), 1);
    }

    #[test]
    fn presence_is_checked_before_types() {
        let report = RecordValidator::default().validate_batch(vec![record(json!({
            "date": "d1", "open": "abc", "high": "2", "low": "1"
        }))]);
        assert_eq!(
            report.rejected[0].reason,
            RejectReason::MissingField("volume".into())
        );
    }

    #[test]
    fn null_counts_as_missing() {
        let mut r = bar("d1", "2", "1", 10);
        r.insert("open".into(), Value::Null);
        let report = RecordValidator::default().validate_batch(vec![r]);
        assert_eq!(report.rejected[0].reason, RejectReason::MissingField("open".into()));
    }

    #[test]
    fn non_numeric_price_is_rejected() {
        let report = RecordValidator::default().validate_batch(vec![bar("d1", "n/a", "1", 10)]);
        assert!(matches!(report.rejected[0].reason, RejectReason::NotNumeric { .. }));
    }

    #[test]
    fn fractional_volume_string_is_rejected() {
        let mut r = bar("d1", "2", "1", 0);
        r.insert("volume".into(), json!("10.5"));
        let report = RecordValidator::default().validate_batch(vec![r]);
        assert!(matches!(report.rejected[0].reason, RejectReason::NotInteger { .. }));
    }

    #[test]
    fn whole_float_volume_is_accepted() {
        let mut r = bar("d1", "2", "1", 0);
        r.insert("volume".into(), json!(1500.0));
        let report = RecordValidator::default().validate_batch(vec![r]);
        assert_eq!(report.accepted[0].volume, 1500);
    }

    #[test]
    fn numeric_identity_becomes_string() {
        let mut r = bar("x", "2", "1", 0);
        r.insert("date".into(), json!(1704067200));
        let report = RecordValidator::default().validate_batch(vec![r]);
        assert_eq!(report.accepted[0].identity, "1704067200");
        assert_eq!(report.accepted[0].as_record()["date"], json!("1704067200"));
    }

    #[test]
    fn optional_close_is_coerced_when_present() {
        let mut r = bar("d1", "2", "1", 0);
        r.insert("close".into(), json!("1.5"));
        let report = RecordValidator::default().validate_batch(vec![r]);
        assert_eq!(report.accepted[0].close, Some(1.5));
        assert_eq!(report.accepted[0].as_record()["close"], json!(1.5));
    }

    #[test]
    fn required_close_is_enforced() {
        let schema = OhlcvSchema {
            require_close: true,
            ..OhlcvSchema::default()
        };
        let report = RecordValidator::new(schema).validate_batch(vec![bar("d1", "2", "1", 0)]);
        assert_eq!(report.rejected[0].reason, RejectReason::MissingField("close".into()));
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn rejections_stay_below_warn() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();

        let report = tracing::subscriber::with_default(subscriber, || {
            RecordValidator::default().validate_batch(vec![bar("d1", "1", "2", 0)])
        });

        assert_eq!(report.rejected.len(), 1);
        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(!logged.contains("skipping invalid record"), "{logged}");
    }

    #[test]
    fn renamed_close_field_is_read() {
        let schema = OhlcvSchema {
            close: "close_price".into(),
            ..OhlcvSchema::default()
        };
        let mut r = bar("d1", "2", "1", 0);
        r.insert("close_price".into(), json!("1.25"));
        let report = RecordValidator::new(schema).validate_batch(vec![r]);
        assert_eq!(report.accepted[0].close, Some(1.25));
        assert_eq!(report.accepted[0].as_record()["close_price"], json!(1.25));
    }

    #[test]
    fn extra_prices_are_coerced() {
        let schema = OhlcvSchema {
            optional_prices: vec!["latest_price".into()],
            ..OhlcvSchema::default()
        };
        let mut r = bar("d1", "2", "1", 0);
        r.insert("latest_price".into(), json!("1.75"));
        let report = RecordValidator::new(schema.clone()).validate_batch(vec![r]);
        assert_eq!(report.accepted[0].as_record()["latest_price"], json!(1.75));
        assert_eq!(report.accepted[0].close, None);

        let mut bad = bar("d2", "2", "1", 0);
        bad.insert("latest_price".into(), json!("n/a"));
        let report = RecordValidator::new(schema).validate_batch(vec![bad]);
        assert!(matches!(report.rejected[0].reason, RejectReason::NotNumeric { .. }));
    }

    #[test]
    fn unrelated_fields_are_kept() {
        let mut r = bar("d1", "2", "1", 0);
        r.insert("turnover".into(), json!("1e6"));
        let report = RecordValidator::default().validate_batch(vec![r]);
        assert_eq!(report.accepted[0].as_record()["turnover"], json!("1e6"));
    }

    #[test]
    fn single_payload_is_validated() {
        let report = RecordValidator::default().validate(Payload::Single(bar("d1", "2", "1", 5)));
        assert_eq!(report.total(), 1);
        assert_eq!(report.accepted.len(), 1);
    }

    #[test]
    fn identity_range_is_inclusive() {
        let range = IdentityRange {
            start: Some("2024-01-02".into()),
            end: Some("2024-01-04".into()),
        };
        assert!(!range.contains("2024-01-01"));
        assert!(range.contains("2024-01-02"));
        assert!(range.contains("2024-01-04"));
        assert!(!range.contains("2024-01-05"));
        assert!(IdentityRange::default().contains("anything"));
    }
}
