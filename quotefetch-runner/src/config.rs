//! Settings file (`settings.toml`).
//!
//! ```toml
//! [vendor]
//! base_url = "http://api.biyingapi.com/"
//! api_key = "..."
//! credential_param = "api_key"   # default
//! timeout_secs = 30              # default
//!
//! [vendor.static_params]
//! time_frame = "dn"
//!
//! [catalog]
//! endpoints = "api_data_dictionary.json"
//! fields = "api_fields_dictionary.json"
//!
//! [validation]
//! identity = "date"
//!
//! [output]
//! dir = "data"
//!
//! [batch]
//! subject_param = "stock_code"
//! strip_prefixes = ["sh", "sz"]
//! ```
//!
//! Relative catalog paths resolve against the settings file's directory.

use quotefetch_core::{CatalogStore, OhlcvSchema, StaticCredentials};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("read {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub vendor: VendorSettings,
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub validation: OhlcvSchema,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorSettings {
    pub base_url: String,
    pub api_key: String,
    /// Name of the placeholder that carries the API key.
    #[serde(default = "default_credential_param")]
    pub credential_param: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Extra parameters applied to every call; callers may override them.
    #[serde(default)]
    pub static_params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSettings {
    pub endpoints: PathBuf,
    pub fields: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub json: bool,
    pub csv: bool,
    pub text: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            json: true,
            csv: true,
            text: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Parameter name the batch subject (e.g. a stock code) is bound to.
    pub subject_param: String,
    /// Exchange prefixes removed from the front of subject ids.
    pub strip_prefixes: Vec<String>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            subject_param: "symbol".into(),
            strip_prefixes: Vec::new(),
        }
    }
}

fn default_credential_param() -> String {
    "api_key".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Settings {
    /// Load, resolve relative catalog paths, and validate.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut settings: Settings = toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            settings.catalog.endpoints = anchor(base, &settings.catalog.endpoints);
            settings.catalog.fields = anchor(base, &settings.catalog.fields);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Parse from a TOML string without touching any paths.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content).map_err(|e| SettingsError::Parse {
            path: "<string>".into(),
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.vendor.base_url.trim().is_empty() {
            return Err(SettingsError::Invalid("vendor.base_url is empty".into()));
        }
        if self.vendor.api_key.trim().is_empty() {
            return Err(SettingsError::Invalid("vendor.api_key is empty".into()));
        }
        if self.vendor.credential_param.trim().is_empty() {
            return Err(SettingsError::Invalid("vendor.credential_param is empty".into()));
        }
        if self.vendor.timeout_secs == 0 {
            return Err(SettingsError::Invalid("vendor.timeout_secs must be > 0".into()));
        }
        if self.batch.subject_param.trim().is_empty() {
            return Err(SettingsError::Invalid("batch.subject_param is empty".into()));
        }
        Ok(())
    }

    pub fn credentials(&self) -> StaticCredentials {
        self.vendor.static_params.iter().fold(
            StaticCredentials::new(&self.vendor.credential_param, &self.vendor.api_key),
            |creds, (k, v)| creds.with_param(k, v),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.vendor.timeout_secs)
    }

    pub fn load_catalog(&self) -> quotefetch_core::Result<CatalogStore> {
        CatalogStore::load(&self.catalog.endpoints, &self.catalog.fields)
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [vendor]
        base_url = "http://api.biyingapi.com/"
        api_key = "K"

        [catalog]
        endpoints = "api_data_dictionary.json"
        fields = "api_fields_dictionary.json"
    "#;

    #[test]
    fn defaults_fill_optional_sections() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.vendor.credential_param, "api_key");
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.output.dir, PathBuf::from("data"));
        assert!(settings.output.csv);
        assert_eq!(settings.batch.subject_param, "symbol");
        assert_eq!(settings.validation, OhlcvSchema::default());
    }

    #[test]
    fn credentials_include_static_params() {
        let settings = Settings::from_toml(&format!(
            "{MINIMAL}\n[vendor.static_params]\ntime_frame = \"dn\"\n"
        ))
        .unwrap();
        let creds = settings.credentials();
        assert_eq!(creds.credential(), Some("K"));
        assert_eq!(creds.params()["time_frame"], "dn");
    }

    #[test]
    fn empty_key_is_invalid() {
        let err = Settings::from_toml(&MINIMAL.replace("api_key = \"K\"", "api_key = \"\"")).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let toml = MINIMAL.replace("api_key = \"K\"", "api_key = \"K\"\ntimeout_secs = 0");
        assert!(matches!(
            Settings::from_toml(&toml).unwrap_err(),
            SettingsError::Invalid(_)
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            Settings::from_toml("[vendor").unwrap_err(),
            SettingsError::Parse { .. }
        ));
    }

    #[test]
    fn catalog_paths_resolve_against_settings_dir() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(
            settings.catalog.endpoints,
            tmp.path().join("api_data_dictionary.json")
        );
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = Settings::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn validation_section_overrides_names() {
        let toml = format!("{MINIMAL}\n[validation]\nidentity = \"t\"\nvolume = \"vol\"\n");
        let settings = Settings::from_toml(&toml).unwrap();
        assert_eq!(settings.validation.identity, "t");
        assert_eq!(settings.validation.volume, "vol");
        assert_eq!(settings.validation.open, "open");
    }
}
