use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_gene_annotations::app::{App, ProgressEvent, ProgressSink};
use kira_gene_annotations::biomart::{BiomartClient, DatasetHandle};
use kira_gene_annotations::config::ResolvedConfig;
use kira_gene_annotations::domain::{AttributeVariant, SpeciesKey};
use kira_gene_annotations::error::KiraError;
use kira_gene_annotations::retry::Sleeper;
use kira_gene_annotations::store::Store;

const FULL_ROWS: &str = "\
ENSG00000141510\tTP53\ttumor protein p53\tprotein_coding\t17\t7661779\t7687546\t-1\t7157\tP04637
ENSG00000012048\tBRCA1\tBRCA1 DNA repair associated\tprotein_coding\t17\t43044295\t43125364\t-1\t672\tP38398
ENSG00000228630\tHOTAIR\tHOX transcript antisense RNA\tlncRNA\t12\t53962308\t53974956\t-1\t100124700\t
";

const REDUCED_ROWS: &str = "\
ENSG00000141510\tTP53\ttumor protein p53\tprotein_coding\t17\t7661779\t7687546\t-1\t7157
ENSG00000012048\tBRCA1\tBRCA1 DNA repair associated\tprotein_coding\t17\t43044295\t43125364\t-1\t672
";

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

impl Sleeper for &RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Plays back scripted resolve outcomes, then answers queries by width.
#[derive(Default)]
struct ScriptedBiomart {
    resolve_script: Mutex<VecDeque<Result<(), KiraError>>>,
    resolve_calls: Mutex<u32>,
    full_response: Option<String>,
    reduced_response: Option<String>,
    query_widths: Mutex<Vec<usize>>,
}

impl ScriptedBiomart {
    fn answering(full: Option<&str>, reduced: Option<&str>) -> Self {
        Self {
            full_response: full.map(str::to_string),
            reduced_response: reduced.map(str::to_string),
            ..Self::default()
        }
    }

    fn failing_connects(mut self, failures: usize) -> Self {
        let script = (0..failures)
            .map(|_| Err(KiraError::BiomartHttp("operation timed out".to_string())))
            .collect();
        self.resolve_script = Mutex::new(script);
        self
    }
}

impl BiomartClient for &ScriptedBiomart {
    fn resolve_dataset(
        &self,
        server_url: &str,
        dataset_id: &str,
    ) -> Result<DatasetHandle, KiraError> {
        *self.resolve_calls.lock().unwrap() += 1;
        if let Some(outcome) = self.resolve_script.lock().unwrap().pop_front() {
            outcome?;
        }
        Ok(DatasetHandle {
            server_url: server_url.to_string(),
            mart: "ENSEMBL_MART_ENSEMBL".to_string(),
            virtual_schema: "default".to_string(),
            dataset_id: dataset_id.to_string(),
            display_name: Some("Human genes (GRCh38.p14)".to_string()),
        })
    }

    fn query(&self, _dataset: &DatasetHandle, attributes: &[&str]) -> Result<String, KiraError> {
        self.query_widths.lock().unwrap().push(attributes.len());
        let response = if attributes.len() == 10 {
            &self.full_response
        } else {
            &self.reduced_response
        };
        response
            .clone()
            .ok_or_else(|| KiraError::BiomartHttp("connection reset by peer".to_string()))
    }
}

fn temp_store(temp: &tempfile::TempDir) -> Store {
    Store::new(Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap())
}

fn human() -> SpeciesKey {
    "homo-sapiens".parse().unwrap()
}

#[test]
fn full_response_writes_header_and_rows() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(FULL_ROWS), None);
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );

    let result = app.fetch(&human(), &NoopSink).unwrap();

    assert_eq!(result.variant, AttributeVariant::Full);
    assert_eq!(result.rows, 3);
    assert_eq!(result.fallback_reason, None);
    let csv = fs::read_to_string(&result.output_path).unwrap();
    let lines = csv.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "Ensembl Id,Gene symbol,Description,Gene biotype,Chromosome,Start,End,Strand,Entrez ID,UniProt ID"
    );
    assert_eq!(
        lines[3],
        "ENSG00000228630,HOTAIR,HOX transcript antisense RNA,lncRNA,12,53962308,53974956,-1,100124700,"
    );
    assert!(
        result
            .output_path
            .ends_with("data/Homo_sapiens/homo_sapiens_gene_annotations.csv")
    );
    assert_eq!(*biomart.query_widths.lock().unwrap(), vec![10]);
}

#[test]
fn narrow_full_response_falls_back_to_reduced_columns() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(REDUCED_ROWS), Some(REDUCED_ROWS));
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );

    let result = app.fetch(&human(), &NoopSink).unwrap();

    assert_eq!(result.variant, AttributeVariant::Reduced);
    assert_eq!(result.columns.len(), 9);
    assert!(!result.columns.iter().any(|column| column == "UniProt ID"));
    assert!(result.fallback_reason.unwrap().contains("attribute mismatch"));
    let csv = fs::read_to_string(&result.output_path).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.starts_with("Ensembl Id,Gene symbol,Description,"));
    assert!(!csv.contains("UniProt ID"));
    assert_eq!(*biomart.query_widths.lock().unwrap(), vec![10, 9]);
}

#[test]
fn empty_full_response_triggers_fallback() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some("\n"), Some(REDUCED_ROWS));
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );

    let result = app.fetch(&human(), &NoopSink).unwrap();
    assert_eq!(result.variant, AttributeVariant::Reduced);
    assert_eq!(result.rows, 2);
}

#[test]
fn double_query_failure_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(None, Some("ENSG1\tONLY\tTHREE\n"));
    let sleeper = RecordingSleeper::default();
    let store = temp_store(&temp);
    let path = store.annotation_path(&human());
    let app = App::with_sleeper(store, &biomart, &sleeper, ResolvedConfig::default());

    let err = app.fetch(&human(), &NoopSink).unwrap_err();

    assert_matches!(
        err,
        KiraError::FallbackFailure { original, fallback }
            if matches!(*original, KiraError::BiomartHttp(_))
                && matches!(*fallback, KiraError::AttributeMismatch { expected: 9, found: 3, .. })
    );
    assert!(!path.as_std_path().exists());
}

#[test]
fn refetch_produces_identical_bytes() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(FULL_ROWS), None);
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );

    let first = app.fetch(&human(), &NoopSink).unwrap();
    let first_bytes = fs::read(&first.output_path).unwrap();
    let second = app.fetch(&human(), &NoopSink).unwrap();
    let second_bytes = fs::read(&second.output_path).unwrap();

    assert_eq!(first.output_path, second.output_path);
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn four_transient_failures_then_success_uses_five_attempts() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(FULL_ROWS), None).failing_connects(4);
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );

    let result = app.fetch(&human(), &NoopSink).unwrap();

    assert_eq!(result.connection_attempts, 5);
    assert_eq!(*biomart.resolve_calls.lock().unwrap(), 5);
    let waits = sleeper
        .waits
        .lock()
        .unwrap()
        .iter()
        .map(|wait| wait.as_secs())
        .collect::<Vec<_>>();
    assert_eq!(waits, vec![10, 20, 40, 80]);
}

#[test]
fn exhausted_connection_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(FULL_ROWS), None).failing_connects(5);
    let sleeper = RecordingSleeper::default();
    let store = temp_store(&temp);
    let path = store.annotation_path(&human());
    let app = App::with_sleeper(store, &biomart, &sleeper, ResolvedConfig::default());

    let err = app.fetch(&human(), &NoopSink).unwrap_err();

    assert_matches!(err, KiraError::ConnectionFailure { attempts: 5, .. });
    assert_eq!(sleeper.waits.lock().unwrap().len(), 4);
    assert!(biomart.query_widths.lock().unwrap().is_empty());
    assert!(!path.as_std_path().exists());
}

#[test]
fn missing_dataset_fails_without_retrying() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(FULL_ROWS), None);
    *biomart.resolve_script.lock().unwrap() = VecDeque::from(vec![Err(
        KiraError::DatasetNotFound {
            dataset: "hsapiens_gene_ensembl".to_string(),
            server: "http://www.ensembl.org/biomart".to_string(),
        },
    )]);
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );

    let err = app.fetch(&human(), &NoopSink).unwrap_err();

    assert_matches!(err, KiraError::DatasetNotFound { .. });
    assert_eq!(*biomart.resolve_calls.lock().unwrap(), 1);
    assert!(sleeper.waits.lock().unwrap().is_empty());
}

#[test]
fn plants_species_uses_plants_server() {
    let temp = tempfile::tempdir().unwrap();
    let biomart = ScriptedBiomart::answering(Some(FULL_ROWS), None);
    let sleeper = RecordingSleeper::default();
    let app = App::with_sleeper(
        temp_store(&temp),
        &biomart,
        &sleeper,
        ResolvedConfig::default(),
    );
    let species: SpeciesKey = "arabidopsis-thaliana".parse().unwrap();

    let result = app.fetch(&species, &NoopSink).unwrap();

    assert_eq!(result.server_url, "http://plants.ensembl.org/biomart");
    assert_eq!(result.dataset_id, "athaliana_eg_gene");
    assert!(
        result
            .output_path
            .ends_with("Arabidopsis_thaliana/arabidopsis_thaliana_gene_annotations.csv")
    );
}
