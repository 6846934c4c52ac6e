//! Catalog store — the endpoint catalog and the field dictionary.
//!
//! Both tables are loaded once from structured-text files and never mutated.
//! The store is constructed explicitly and passed by reference to whatever
//! needs it; there is no global catalog.
//!
//! Accepted file formats, chosen by extension:
//! - `.json`: an array of entries, as exported by the dictionary tooling
//!   (`"API Key Combined"`, `"url_template"`, `"API Params"`, ...)
//! - `.toml`: `[[endpoint]]` / `[[mapping]]` tables with the same fields

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Whether records from an endpoint are price bars subject to validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordShape {
    Ohlcv,
    #[default]
    Raw,
}

/// One row of the endpoint catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDefinition {
    pub id: String,
    /// Path template with `{name}` placeholders, relative to the vendor base URL.
    pub url_template: String,
    pub required_params: BTreeSet<String>,
    pub shape: RecordShape,
}

impl EndpointDefinition {
    pub fn new<I, S>(id: &str, url_template: &str, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.to_string(),
            url_template: url_template.to_string(),
            required_params: required.into_iter().map(Into::into).collect(),
            shape: RecordShape::Raw,
        }
    }

    pub fn with_shape(mut self, shape: RecordShape) -> Self {
        self.shape = shape;
        self
    }
}

/// A raw vendor field name and its human-readable replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPair {
    #[serde(rename = "field_name", alias = "raw")]
    pub raw: String,
    #[serde(rename = "field_description", alias = "name")]
    pub human: String,
}

/// Ordered raw → human field names for one identifier.
///
/// The mapping is partial: keys it does not know are left alone by the
/// translator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    pub id: String,
    pairs: Vec<FieldPair>,
    lookup: HashMap<String, String>,
}

impl FieldMapping {
    pub fn new(id: &str, pairs: Vec<FieldPair>) -> Self {
        // Later pairs override earlier ones for the same raw name.
        let lookup = pairs
            .iter()
            .map(|p| (p.raw.clone(), p.human.clone()))
            .collect();
        Self {
            id: id.to_string(),
            pairs,
            lookup,
        }
    }

    pub fn from_pairs<'a>(id: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            id,
            pairs
                .into_iter()
                .map(|(raw, human)| FieldPair {
                    raw: raw.to_string(),
                    human: human.to_string(),
                })
                .collect(),
        )
    }

    pub fn empty(id: &str) -> Self {
        Self::new(id, Vec::new())
    }

    pub fn get(&self, raw: &str) -> Option<&str> {
        self.lookup.get(raw).map(String::as_str)
    }

    pub fn pairs(&self) -> &[FieldPair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Immutable endpoint catalog + field dictionary.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    endpoints: HashMap<String, EndpointDefinition>,
    fields: HashMap<String, FieldMapping>,
    empty: FieldMapping,
    fingerprint: String,
}

impl CatalogStore {
    /// Load both catalog files. Any read or parse problem is a `Config` error.
    pub fn load(endpoints_path: &Path, fields_path: &Path) -> Result<Self> {
        let endpoint_bytes = read_catalog_file(endpoints_path)?;
        let field_bytes = read_catalog_file(fields_path)?;

        let endpoints = parse_endpoints(endpoints_path, &endpoint_bytes)?;
        let mappings = parse_mappings(fields_path, &field_bytes)?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&endpoint_bytes);
        hasher.update(&field_bytes);
        let fingerprint = hasher.finalize().to_hex().to_string();

        let mut store = Self::from_parts(endpoints, mappings)?;
        store.fingerprint = fingerprint;

        tracing::info!(
            endpoints = store.endpoints.len(),
            field_mappings = store.fields.len(),
            fingerprint = %store.fingerprint,
            "catalog loaded"
        );
        Ok(store)
    }

    /// Build a store from already-parsed entries.
    ///
    /// Endpoint identifiers must be unique. For field mappings the first entry
    /// for an identifier wins.
    pub fn from_parts(endpoints: Vec<EndpointDefinition>, mappings: Vec<FieldMapping>) -> Result<Self> {
        let mut endpoint_map = HashMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if endpoint_map.contains_key(&endpoint.id) {
                return Err(PipelineError::Config(format!(
                    "duplicate endpoint identifier '{}'",
                    endpoint.id
                )));
            }
            endpoint_map.insert(endpoint.id.clone(), endpoint);
        }

        let mut field_map: HashMap<String, FieldMapping> = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            if field_map.contains_key(&mapping.id) {
                tracing::debug!(id = %mapping.id, "ignoring repeated field mapping");
                continue;
            }
            field_map.insert(mapping.id.clone(), mapping);
        }

        Ok(Self {
            endpoints: endpoint_map,
            fields: field_map,
            empty: FieldMapping::default(),
            fingerprint: String::new(),
        })
    }

    pub fn lookup_endpoint(&self, id: &str) -> Result<&EndpointDefinition> {
        self.endpoints
            .get(id)
            .ok_or_else(|| PipelineError::endpoint_not_found(id))
    }

    /// Field mapping for `id`, or an empty mapping when the dictionary has none.
    pub fn lookup_field_mapping(&self, id: &str) -> &FieldMapping {
        self.fields.get(id).unwrap_or(&self.empty)
    }

    /// Endpoint identifiers in sorted order.
    pub fn endpoint_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.endpoints.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// BLAKE3 digest of the catalog files (empty for in-memory stores).
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

// ── File formats ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EndpointEntry {
    #[serde(rename = "API Key Combined", alias = "id")]
    id: String,
    #[serde(alias = "template")]
    url_template: String,
    #[serde(rename = "API Params", alias = "params", default)]
    params: ParamSpec,
    #[serde(rename = "Record Shape", alias = "shape", default)]
    shape: RecordShape,
}

/// Declared required parameters. The dictionary export stores these as a
/// JSON-encoded object of name → description.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParamSpec {
    Encoded(String),
    Described(BTreeMap<String, Value>),
    Names(Vec<String>),
}

impl Default for ParamSpec {
    fn default() -> Self {
        Self::Names(Vec::new())
    }
}

impl ParamSpec {
    fn into_names(self, endpoint: &str) -> Result<BTreeSet<String>> {
        match self {
            Self::Names(names) => Ok(names.into_iter().collect()),
            Self::Described(map) => Ok(map.into_keys().collect()),
            Self::Encoded(text) if text.trim().is_empty() => Ok(BTreeSet::new()),
            Self::Encoded(text) => {
                let value: Value = serde_json::from_str(&text).map_err(|e| {
                    PipelineError::Config(format!("endpoint '{endpoint}': bad API Params: {e}"))
                })?;
                match value {
                    Value::Object(map) => Ok(map.into_iter().map(|(k, _)| k).collect()),
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(name) => Ok(name),
                            other => Err(PipelineError::Config(format!(
                                "endpoint '{endpoint}': parameter name must be a string, got {other}"
                            ))),
                        })
                        .collect(),
                    other => Err(PipelineError::Config(format!(
                        "endpoint '{endpoint}': API Params must be an object or list, got {other}"
                    ))),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MappingEntry {
    #[serde(rename = "API Key Combined", alias = "id")]
    id: String,
    #[serde(default)]
    fields: Vec<FieldPair>,
}

#[derive(Debug, Deserialize)]
struct EndpointTomlFile {
    #[serde(default)]
    endpoint: Vec<EndpointEntry>,
}

#[derive(Debug, Deserialize)]
struct MappingTomlFile {
    #[serde(default)]
    mapping: Vec<MappingEntry>,
}

fn read_catalog_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(PipelineError::Config(format!(
            "catalog file not found: {}",
            path.display()
        )));
    }
    std::fs::read(path)
        .map_err(|e| PipelineError::Config(format!("read {}: {e}", path.display())))
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn decode_text<'a>(path: &Path, bytes: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::Config(format!("{} is not UTF-8: {e}", path.display())))
}

fn parse_endpoints(path: &Path, bytes: &[u8]) -> Result<Vec<EndpointDefinition>> {
    let text = decode_text(path, bytes)?;
    let entries: Vec<EndpointEntry> = if is_toml(path) {
        toml::from_str::<EndpointTomlFile>(text)
            .map(|f| f.endpoint)
            .map_err(|e| PipelineError::Config(format!("parse {}: {e}", path.display())))?
    } else {
        serde_json::from_str(text)
            .map_err(|e| PipelineError::Config(format!("parse {}: {e}", path.display())))?
    };

    entries
        .into_iter()
        .map(|entry| {
            let required_params = entry.params.into_names(&entry.id)?;
            Ok(EndpointDefinition {
                id: entry.id,
                url_template: entry.url_template,
                required_params,
                shape: entry.shape,
            })
        })
        .collect()
}

fn parse_mappings(path: &Path, bytes: &[u8]) -> Result<Vec<FieldMapping>> {
    let text = decode_text(path, bytes)?;
    let entries: Vec<MappingEntry> = if is_toml(path) {
        toml::from_str::<MappingTomlFile>(text)
            .map(|f| f.mapping)
            .map_err(|e| PipelineError::Config(format!("parse {}: {e}", path.display())))?
    } else {
        serde_json::from_str(text)
            .map_err(|e| PipelineError::Config(format!("parse {}: {e}", path.display())))?
    };

    Ok(entries
        .into_iter()
        .map(|entry| FieldMapping::new(&entry.id, entry.fields))
        .collect())
}
