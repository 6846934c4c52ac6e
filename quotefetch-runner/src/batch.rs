//! Batch orchestrator — runs resolve → dispatch → translate → validate → sink
//! for each (subject, endpoint) item, one at a time.
//!
//! A failure at any stage is recorded as that item's outcome and the loop
//! moves on. The result carries explicit succeeded/failed counts.

use quotefetch_core::{
    resolve, CatalogStore, Dispatcher, ErrorKind, FieldTranslator, IdentityRange, Params,
    PipelineError, Record, RecordShape, RecordValidator, Rejection, StaticCredentials, Transport,
};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::config::{OutputSettings, Settings};
use crate::sink;

/// One fetch request in a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchItem {
    pub subject: String,
    pub endpoint: String,
    pub params: Params,
    /// Appended to the request URL as a query string.
    pub query: Params,
    /// Keep only records whose identity key falls in this range.
    pub range: IdentityRange,
    /// Force validation on or off; `None` follows the endpoint's record shape.
    pub validate: Option<bool>,
}

impl BatchItem {
    pub fn new(subject: &str, endpoint: &str) -> Self {
        Self {
            subject: subject.to_string(),
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.range = IdentityRange {
            start: start.map(String::from),
            end: end.map(String::from),
        };
        self
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.subject, self.endpoint)
    }
}

/// Pipeline stage at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lookup,
    Resolve,
    Dispatch,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lookup => "lookup",
            Self::Resolve => "resolve",
            Self::Dispatch => "dispatch",
            Self::Sink => "sink",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailureDescriptor {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub error: PipelineError,
}

impl FailureDescriptor {
    fn at(stage: Stage) -> impl FnOnce(PipelineError) -> Self {
        move |error| Self {
            stage,
            kind: error.kind(),
            error,
        }
    }
}

impl fmt::Display for FailureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.stage, self.error)
    }
}

/// What a successful item produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemReport {
    /// Translated (and, for validated items, canonicalized) records.
    pub records: Vec<Record>,
    pub rejected: Vec<Rejection>,
    /// Records dropped by the item's identity range.
    pub out_of_range: usize,
    pub validated: bool,
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Succeeded(ItemReport),
    Failed(FailureDescriptor),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn report(&self) -> Option<&ItemReport> {
        match self {
            Self::Succeeded(report) => Some(report),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureDescriptor> {
        match self {
            Self::Succeeded(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }
}

/// Summary of a batch run, in item order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub outcomes: Vec<(String, ItemOutcome)>,
    pub succeeded: usize,
    pub failed: usize,
    pub catalog_fingerprint: String,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn get(&self, label: &str) -> Option<&ItemOutcome> {
        self.outcomes
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureDescriptor)> {
        self.outcomes
            .iter()
            .filter_map(|(label, outcome)| outcome.failure().map(|f| (label.as_str(), f)))
    }
}

/// Progress callbacks for a batch run.
pub trait BatchProgress: Send {
    fn on_start(&self, item: &BatchItem, index: usize, total: usize);

    fn on_complete(&self, item: &BatchItem, index: usize, total: usize, outcome: &ItemOutcome);

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Reports progress through `tracing`.
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn on_start(&self, item: &BatchItem, index: usize, total: usize) {
        tracing::info!("[{}/{}] fetching {}", index + 1, total, item.label());
    }

    fn on_complete(&self, item: &BatchItem, _index: usize, _total: usize, outcome: &ItemOutcome) {
        if let ItemOutcome::Succeeded(report) = outcome {
            tracing::info!(
                item = %item.label(),
                records = report.records.len(),
                rejected = report.rejected.len(),
                "ok"
            );
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("batch complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Discards progress events.
pub struct NoProgress;

impl BatchProgress for NoProgress {
    fn on_start(&self, _item: &BatchItem, _index: usize, _total: usize) {}

    fn on_complete(&self, _item: &BatchItem, _index: usize, _total: usize, _outcome: &ItemOutcome) {}

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

/// Where successful items are persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkPlan {
    pub dir: PathBuf,
    pub json: bool,
    pub csv: bool,
    /// Shared append-only summary for the whole run.
    pub text: Option<PathBuf>,
}

impl SinkPlan {
    /// Plan for one run; the text summary is `{dir}/{run_label}_summary.txt`.
    pub fn from_output(output: &OutputSettings, run_label: &str) -> Self {
        Self {
            dir: output.dir.clone(),
            json: output.json,
            csv: output.csv,
            text: output
                .text
                .then(|| output.dir.join(format!("{}_summary.txt", file_stem(run_label)))),
        }
    }

    fn persist(&self, item: &BatchItem, records: &[Record]) -> quotefetch_core::Result<Vec<PathBuf>> {
        if self.csv && records.is_empty() {
            return Err(PipelineError::Schema(format!(
                "{} returned no records: cannot derive a CSV header",
                item.label()
            )));
        }

        let stem = format!("{}_{}", file_stem(&item.subject), file_stem(&item.endpoint));
        let mut written = Vec::new();
        let result = self.write_all(item, records, &stem, &mut written);
        if result.is_err() {
            // The summary is appended last, so only whole-file artifacts are here.
            for path in &written {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove partial artifact");
                }
            }
        }
        result.map(|()| written)
    }

    fn write_all(
        &self,
        item: &BatchItem,
        records: &[Record],
        stem: &str,
        written: &mut Vec<PathBuf>,
    ) -> quotefetch_core::Result<()> {
        if self.json {
            let path = self.dir.join(format!("{stem}.json"));
            sink::write_json(records, &path)?;
            written.push(path);
        }
        if self.csv {
            let path = self.dir.join(format!("{stem}.csv"));
            sink::write_csv(records, &path)?;
            written.push(path);
        }
        if let Some(path) = &self.text {
            let header = format!("source: {} / {}", item.endpoint, item.subject);
            sink::append_text(records, path, &header)?;
            written.push(path.clone());
        }
        Ok(())
    }
}

/// Replace characters that are awkward in file names.
fn file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Drives the pipeline over a list of items.
pub struct BatchRunner<'a, T: Transport> {
    catalog: &'a CatalogStore,
    dispatcher: Dispatcher<T>,
    credentials: StaticCredentials,
    validator: RecordValidator,
    subject_param: String,
    strip_prefixes: Vec<String>,
    sink: Option<SinkPlan>,
}

impl<'a, T: Transport> BatchRunner<'a, T> {
    pub fn new(catalog: &'a CatalogStore, dispatcher: Dispatcher<T>, credentials: StaticCredentials) -> Self {
        Self {
            catalog,
            dispatcher,
            credentials,
            validator: RecordValidator::default(),
            subject_param: "symbol".into(),
            strip_prefixes: Vec::new(),
            sink: None,
        }
    }

    /// Runner configured from settings: credentials, validation schema,
    /// subject handling. Persistence is added separately with [`with_sink`].
    ///
    /// [`with_sink`]: BatchRunner::with_sink
    pub fn from_settings(catalog: &'a CatalogStore, transport: T, settings: &Settings) -> Self {
        let credentials = settings.credentials();
        let dispatcher = Dispatcher::new(&settings.vendor.base_url, transport).masking(&credentials);
        Self::new(catalog, dispatcher, credentials)
            .with_validator(RecordValidator::new(settings.validation.clone()))
            .with_subject_param(&settings.batch.subject_param)
            .with_strip_prefixes(settings.batch.strip_prefixes.clone())
    }

    pub fn with_validator(mut self, validator: RecordValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_subject_param(mut self, name: &str) -> Self {
        self.subject_param = name.to_string();
        self
    }

    pub fn with_strip_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.strip_prefixes = prefixes;
        self
    }

    pub fn with_sink(mut self, sink: SinkPlan) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Run every item in order. Never fails as a whole.
    pub fn run_batch(&self, items: &[BatchItem], progress: &dyn BatchProgress) -> BatchResult {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut succeeded = 0;
        let mut failed = 0;

        for (i, item) in items.iter().enumerate() {
            progress.on_start(item, i, total);

            let outcome = match self.run_item(item) {
                Ok(report) => {
                    succeeded += 1;
                    ItemOutcome::Succeeded(report)
                }
                Err(failure) => {
                    failed += 1;
                    tracing::warn!(item = %item.label(), reason = %failure, "item failed");
                    ItemOutcome::Failed(failure)
                }
            };

            progress.on_complete(item, i, total, &outcome);
            outcomes.push((item.label(), outcome));
        }

        progress.on_batch_complete(succeeded, failed, total);

        BatchResult {
            outcomes,
            succeeded,
            failed,
            catalog_fingerprint: self.catalog.fingerprint().to_string(),
        }
    }

    /// Run one item through every stage.
    pub fn run_item(&self, item: &BatchItem) -> Result<ItemReport, FailureDescriptor> {
        let endpoint = self
            .catalog
            .lookup_endpoint(&item.endpoint)
            .map_err(FailureDescriptor::at(Stage::Lookup))?;

        let mut supplied = item.params.clone();
        supplied.insert(self.subject_param.clone(), self.normalize_subject(&item.subject));
        let resolved = resolve(endpoint, &supplied, &self.credentials)
            .map_err(FailureDescriptor::at(Stage::Resolve))?;

        let payload = self
            .dispatcher
            .dispatch_with_query(endpoint, &resolved, &item.query)
            .map_err(FailureDescriptor::at(Stage::Dispatch))?;

        let translated = FieldTranslator::new(self.catalog).translate(&endpoint.id, payload);

        let validate = item.validate.unwrap_or(endpoint.shape == RecordShape::Ohlcv);
        let (records, rejected) = if validate {
            let report = self.validator.validate(translated);
            for rejection in &report.rejected {
                tracing::warn!(item = %item.label(), reason = %rejection.reason, "record rejected");
            }
            let records = report
                .accepted
                .into_iter()
                .map(|v| v.into_record())
                .collect::<Vec<_>>();
            (records, report.rejected)
        } else {
            (translated.into_records(), Vec::new())
        };

        let (records, out_of_range) = self.apply_range(records, &item.range);

        let artifacts = match &self.sink {
            Some(plan) => plan
                .persist(item, &records)
                .map_err(FailureDescriptor::at(Stage::Sink))?,
            None => Vec::new(),
        };

        Ok(ItemReport {
            records,
            rejected,
            out_of_range,
            validated: validate,
            artifacts,
        })
    }

    fn normalize_subject(&self, subject: &str) -> String {
        for prefix in &self.strip_prefixes {
            if let Some(rest) = subject.strip_prefix(prefix.as_str()) {
                if !rest.is_empty() {
                    return rest.to_string();
                }
            }
        }
        subject.to_string()
    }

    fn apply_range(&self, records: Vec<Record>, range: &IdentityRange) -> (Vec<Record>, usize) {
        if range.is_unbounded() {
            return (records, 0);
        }
        let identity = &self.validator.schema().identity;
        let before = records.len();
        let kept: Vec<Record> = records
            .into_iter()
            .filter(|record| match record.get(identity) {
                Some(serde_json::Value::String(key)) => range.contains(key),
                Some(serde_json::Value::Number(n)) => range.contains(&n.to_string()),
                // no identity to compare: not outside the range
                _ => true,
            })
            .collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotefetch_core::{CannedTransport, EndpointDefinition, FieldMapping, HttpResponse};

    fn catalog() -> CatalogStore {
        CatalogStore::from_parts(
            vec![
                EndpointDefinition::new("E1", "/x/{sym}/{key}", ["sym"]).with_shape(RecordShape::Ohlcv),
                EndpointDefinition::new("LIST", "/list/{key}", Vec::<String>::new()),
            ],
            vec![FieldMapping::from_pairs(
                "E1",
                [("o", "open"), ("h", "high"), ("l", "low"), ("v", "volume"), ("t", "date")],
            )],
        )
        .unwrap()
    }

    fn runner<'a>(store: &'a CatalogStore, transport: &'a CannedTransport) -> BatchRunner<'a, &'a CannedTransport> {
        BatchRunner::new(
            store,
            Dispatcher::new("http://base", transport),
            StaticCredentials::new("key", "K"),
        )
        .with_subject_param("sym")
    }

    #[test]
    fn labels_join_subject_and_endpoint() {
        assert_eq!(BatchItem::new("AAPL", "E1").label(), "AAPL:E1");
    }

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(file_stem("lssj_kdj(9,3,3)"), "lssj_kdj_9_3_3_");
        assert_eq!(file_stem("000001"), "000001");
    }

    #[test]
    fn prefixes_are_stripped_from_subjects() {
        let store = catalog();
        let transport = CannedTransport::new().route("http://base/x/600000/K", HttpResponse::ok("[]"));
        let runner = runner(&store, &transport).with_strip_prefixes(vec!["sh".into(), "sz".into()]);

        let report = runner.run_item(&BatchItem::new("sh600000", "E1")).unwrap();
        assert!(report.records.is_empty());
        assert_eq!(transport.calls(), vec!["http://base/x/600000/K".to_string()]);
    }

    #[test]
    fn failure_records_stage() {
        let store = catalog();
        let transport = CannedTransport::new();
        let failure = runner(&store, &transport)
            .run_item(&BatchItem::new("A", "E1"))
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Dispatch);
        assert_eq!(failure.kind, ErrorKind::Network);
        assert!(failure.to_string().starts_with("NetworkError at dispatch"));
    }

    #[test]
    fn raw_endpoints_skip_validation() {
        let store = catalog();
        let transport =
            CannedTransport::new().route("http://base/list/K", HttpResponse::ok(r#"[{"dm": "1"}]"#));
        let report = runner(&store, &transport)
            .run_item(&BatchItem::new("ignored", "LIST"))
            .unwrap();
        assert!(!report.validated);
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn validation_can_be_forced_off() {
        let store = catalog();
        let transport =
            CannedTransport::new().route("http://base/x/A/K", HttpResponse::ok(r#"{"o": "junk"}"#));
        let mut item = BatchItem::new("A", "E1");
        item.validate = Some(false);
        let report = runner(&store, &transport).run_item(&item).unwrap();
        assert_eq!(report.records[0]["open"], "junk");
    }

    #[test]
    fn range_keeps_records_without_identity() {
        let store = catalog();
        let transport = CannedTransport::new().route(
            "http://base/list/K",
            HttpResponse::ok(r#"[{"dm":"000001","mc":"PA"},{"dm":"600000","mc":"PF"}]"#),
        );
        let mut item = BatchItem::new("all", "LIST").with_range(Some("2024-01-01"), None);
        item.validate = Some(false);
        let report = runner(&store, &transport).run_item(&item).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.out_of_range, 0);
    }

    #[test]
    fn empty_result_with_csv_writes_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = catalog();
        let transport = CannedTransport::new().route("http://base/x/EMPTY/K", HttpResponse::ok("[]"));
        let output = OutputSettings {
            dir: tmp.path().to_path_buf(),
            ..OutputSettings::default()
        };
        let failure = runner(&store, &transport)
            .with_sink(SinkPlan::from_output(&output, "run"))
            .run_item(&BatchItem::new("EMPTY", "E1"))
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Sink);
        assert_eq!(failure.kind, ErrorKind::Schema);
        assert!(!tmp.path().join("EMPTY_E1.json").exists());
        assert!(!tmp.path().join("run_summary.txt").exists());
    }

    #[test]
    fn later_sink_failure_removes_earlier_artifacts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = catalog();
        let transport =
            CannedTransport::new().route("http://base/list/K", HttpResponse::ok(r#"[{"dm":"1"}]"#));
        // the summary path is a directory, so appending to it fails
        let blocked = tmp.path().join("blocked");
        std::fs::create_dir_all(&blocked).unwrap();
        let plan = SinkPlan {
            dir: tmp.path().to_path_buf(),
            json: true,
            csv: true,
            text: Some(blocked),
        };
        let failure = runner(&store, &transport)
            .with_sink(plan)
            .run_item(&BatchItem::new("all", "LIST"))
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Sink);
        assert!(!tmp.path().join("all_LIST.json").exists());
        assert!(!tmp.path().join("all_LIST.csv").exists());
    }

    #[test]
    fn range_filters_by_identity() {
        let store = catalog();
        let body = r#"[
            {"t": "2024-01-01", "o": "1", "h": "2", "l": "1", "v": "1"},
            {"t": "2024-01-02", "o": "1", "h": "2", "l": "1", "v": "1"},
            {"t": "2024-01-03", "o": "1", "h": "2", "l": "1", "v": "1"}
        ]"#;
        let transport = CannedTransport::new().route("http://base/x/A/K", HttpResponse::ok(body));
        let item = BatchItem::new("A", "E1").with_range(Some("2024-01-02"), None);
        let report = runner(&store, &transport).run_item(&item).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.out_of_range, 1);
    }
}
