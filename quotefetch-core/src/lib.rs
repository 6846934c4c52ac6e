//! quotefetch core — catalog-driven vendor API dispatch and data normalization.
//!
//! One algorithm, many catalog rows:
//! - Catalog store (endpoint catalog + field dictionary, loaded once)
//! - Parameter resolution against an endpoint's required set
//! - Request dispatch through a pluggable blocking transport
//! - Field translation from terse vendor keys to readable names
//! - OHLCV record validation with per-record rejection reasons

pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod record;
pub mod resolve;
pub mod translate;
pub mod validate;

pub use catalog::{CatalogStore, EndpointDefinition, FieldMapping, FieldPair, RecordShape};
pub use dispatch::{CannedTransport, Dispatcher, HttpResponse, ReqwestTransport, Transport};
pub use error::{ErrorKind, PipelineError, Result};
pub use record::{Params, Payload, Record};
pub use resolve::{resolve, StaticCredentials};
pub use translate::FieldTranslator;
pub use validate::{
    IdentityRange, OhlcvSchema, RecordValidator, RejectReason, Rejection, ValidatedRecord,
    ValidationReport,
};
