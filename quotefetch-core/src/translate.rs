//! Field translation — rename terse vendor keys to human-readable ones.

use crate::catalog::{CatalogStore, FieldMapping};
use crate::record::{Payload, Record};

/// Renames record keys using the field dictionary of a [`CatalogStore`].
#[derive(Debug, Clone, Copy)]
pub struct FieldTranslator<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> FieldTranslator<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    /// Translate every record of `payload` with the mapping for `id`.
    ///
    /// Never fails. Keys without a mapping (or every key, when `id` has no
    /// dictionary entry) are kept verbatim.
    pub fn translate(&self, id: &str, payload: Payload) -> Payload {
        let mapping = self.catalog.lookup_field_mapping(id);
        if mapping.is_empty() {
            return payload;
        }
        payload.map_records(|record| translate_record(mapping, record))
    }
}

/// Rename the keys of one record, keeping value order.
pub fn translate_record(mapping: &FieldMapping, record: Record) -> Record {
    record
        .into_iter()
        .map(|(key, value)| match mapping.get(&key) {
            Some(human) => (human.to_string(), value),
            None => (key, value),
        })
        .collect()
}
