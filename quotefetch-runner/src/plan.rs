//! Batch plan files (`batch.toml`).
//!
//! ```toml
//! # every subject crossed with every endpoint
//! subjects = ["000001", "600000"]
//! endpoints = ["hsrl_ssjy", "hsmy_lscj"]
//! start = "2024-01-01"
//!
//! [params]
//! time_frame = "dn"
//!
//! # plus explicit items
//! [[item]]
//! subject = "000001"
//! endpoint = "rzrq_margin_trading_historical_trends"
//! validate = false
//! ```
//!
//! Parameter values may be strings, numbers or booleans; all are bound as
//! their string form.

use quotefetch_core::{IdentityRange, Params};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::batch::BatchItem;
use crate::config::SettingsError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchPlan {
    pub subjects: Vec<String>,
    pub endpoints: Vec<String>,
    /// Applied to every generated and explicit item; item values win.
    pub params: BTreeMap<String, toml::Value>,
    pub query: BTreeMap<String, toml::Value>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub item: Vec<PlanItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanItem {
    pub subject: String,
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub query: BTreeMap<String, toml::Value>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub validate: Option<bool>,
}

impl BatchPlan {
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            SettingsError::Parse { message, .. } => SettingsError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Parse {
            path: "<string>".into(),
            message: e.to_string(),
        })
    }

    /// Expand into batch items: the subjects × endpoints grid first, in
    /// subject-major order, then explicit items.
    pub fn items(&self) -> Result<Vec<BatchItem>, SettingsError> {
        let shared_params = stringify(&self.params)?;
        let shared_query = stringify(&self.query)?;
        let shared_range = IdentityRange {
            start: self.start.clone(),
            end: self.end.clone(),
        };

        let mut items = Vec::with_capacity(self.subjects.len() * self.endpoints.len() + self.item.len());
        for subject in &self.subjects {
            for endpoint in &self.endpoints {
                let mut item = BatchItem::new(subject, endpoint);
                item.params = shared_params.clone();
                item.query = shared_query.clone();
                item.range = shared_range.clone();
                items.push(item);
            }
        }

        for explicit in &self.item {
            let mut params = shared_params.clone();
            params.extend(stringify(&explicit.params)?);
            let mut query = shared_query.clone();
            query.extend(stringify(&explicit.query)?);

            items.push(BatchItem {
                subject: explicit.subject.clone(),
                endpoint: explicit.endpoint.clone(),
                params,
                query,
                range: IdentityRange {
                    start: explicit.start.clone().or_else(|| self.start.clone()),
                    end: explicit.end.clone().or_else(|| self.end.clone()),
                },
                validate: explicit.validate,
            });
        }

        if items.is_empty() {
            return Err(SettingsError::Invalid("batch plan has no items".into()));
        }
        Ok(items)
    }
}

fn stringify(values: &BTreeMap<String, toml::Value>) -> Result<Params, SettingsError> {
    values
        .iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Datetime(d) => d.to_string(),
                other => {
                    return Err(SettingsError::Invalid(format!(
                        "parameter '{key}' must be a scalar, got {}",
                        other.type_str()
                    )))
                }
            };
            Ok((key.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_expands_subject_major() {
        let plan = BatchPlan::from_toml(
            r#"
            subjects = ["A", "B"]
            endpoints = ["E1", "E2"]
            "#,
        )
        .unwrap();
        let labels: Vec<String> = plan.items().unwrap().iter().map(BatchItem::label).collect();
        assert_eq!(labels, vec!["A:E1", "A:E2", "B:E1", "B:E2"]);
    }

    #[test]
    fn explicit_items_override_shared_values() {
        let plan = BatchPlan::from_toml(
            r#"
            start = "2024-01-01"

            [params]
            time_frame = "dn"
            limit = 5

            [[item]]
            subject = "000001"
            endpoint = "hsmy_lscj"
            end = "2024-06-30"
            validate = false

            [item.params]
            time_frame = "5m"
            "#,
        )
        .unwrap();

        let items = plan.items().unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.params["time_frame"], "5m");
        assert_eq!(item.params["limit"], "5");
        assert_eq!(item.range.start.as_deref(), Some("2024-01-01"));
        assert_eq!(item.range.end.as_deref(), Some("2024-06-30"));
        assert_eq!(item.validate, Some(false));
    }

    #[test]
    fn empty_plan_is_invalid() {
        let plan = BatchPlan::from_toml("").unwrap();
        assert!(matches!(plan.items(), Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn table_params_are_rejected() {
        let plan = BatchPlan::from_toml(
            r#"
            subjects = ["A"]
            endpoints = ["E"]
            [params.nested]
            x = 1
            "#,
        )
        .unwrap();
        let err = plan.items().unwrap_err();
        assert!(err.to_string().contains("'nested'"));
    }

    #[test]
    fn unknown_keys_fail_to_parse() {
        assert!(BatchPlan::from_toml("subject = \"A\"").is_err());
    }
}
