use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::biomart::{BiomartClient, DatasetHandle};
use crate::config::ResolvedConfig;
use crate::domain::{AttributeSet, AttributeVariant, SpeciesKey};
use crate::error::KiraError;
use crate::retry::{Exhausted, Sleeper, ThreadSleeper, retry_with_backoff};
use crate::store::Store;
use crate::table::AnnotationTable;

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub species: String,
    pub dataset_id: String,
    pub server_url: String,
    pub mart: String,
    pub variant: AttributeVariant,
    pub columns: Vec<String>,
    pub rows: usize,
    pub output_path: String,
    pub connection_attempts: u32,
    pub fallback_reason: Option<String>,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: BiomartClient, S: Sleeper = ThreadSleeper> {
    store: Store,
    client: C,
    sleeper: S,
    config: ResolvedConfig,
}

impl<C: BiomartClient> App<C, ThreadSleeper> {
    pub fn new(store: Store, client: C, config: ResolvedConfig) -> Self {
        Self::with_sleeper(store, client, ThreadSleeper, config)
    }
}

impl<C: BiomartClient, S: Sleeper> App<C, S> {
    pub fn with_sleeper(store: Store, client: C, sleeper: S, config: ResolvedConfig) -> Self {
        Self {
            store,
            client,
            sleeper,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn fetch(
        &self,
        species: &SpeciesKey,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KiraError> {
        let result = self.fetch_species(species, sink);
        if let Err(err) = &result {
            sink.event(ProgressEvent {
                message: format!("phase=Failed; {species}: {err}"),
                elapsed: None,
            });
        }
        result
    }

    fn fetch_species(
        &self,
        species: &SpeciesKey,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KiraError> {
        let server_url = self.config.server_url(species.server());
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {species} -> {} on {server_url}",
                species.dataset_id()
            ),
            elapsed: None,
        });

        let dir = self.store.ensure_species_dir(species)?;
        sink.event(ProgressEvent {
            message: format!("phase=Prepare; output directory {dir}"),
            elapsed: None,
        });

        let (dataset, attempts) = self.connect(species, server_url, sink)?;
        let (table, fallback_reason) = self.query_with_fallback(&dataset, sink)?;

        sink.event(ProgressEvent {
            message: "phase=Store; writing csv".to_string(),
            elapsed: None,
        });
        let output_path = self.store.annotation_path(species);
        Store::write_table_atomic(&output_path, &table)?;

        let variant = table.attributes().variant();
        info!(%species, rows = table.len(), %variant, path = %output_path, "annotations saved");
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; saved {} genes ({variant} attributes) to {output_path}",
                table.len()
            ),
            elapsed: None,
        });

        Ok(FetchResult {
            species: species.as_str().to_string(),
            dataset_id: dataset.dataset_id,
            server_url: dataset.server_url,
            mart: dataset.mart,
            variant,
            columns: table
                .attributes()
                .columns()
                .into_iter()
                .map(|column| column.to_string())
                .collect(),
            rows: table.len(),
            output_path: output_path.to_string(),
            connection_attempts: attempts,
            fallback_reason,
            fetched_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    fn connect(
        &self,
        species: &SpeciesKey,
        server_url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<(DatasetHandle, u32), KiraError> {
        sink.event(ProgressEvent {
            message: format!("phase=Connect; resolving {}", species.dataset_id()),
            elapsed: None,
        });
        let policy = &self.config.retry;
        let outcome = retry_with_backoff(policy, &self.sleeper, sink, |attempt| {
            sink.event(ProgressEvent {
                message: format!("biomart.request resolve attempt={attempt}"),
                elapsed: None,
            });
            let start = Instant::now();
            let handle = self
                .client
                .resolve_dataset(server_url, species.dataset_id())?;
            let latency = start.elapsed().as_millis();
            sink.event(ProgressEvent {
                message: format!("biomart.response latency_ms={latency}"),
                elapsed: None,
            });
            Ok(handle)
        });

        outcome.map_err(|Exhausted { attempts, error }| match error {
            KiraError::DatasetNotFound { .. } => error,
            error if error.is_retryable(true) => KiraError::ConnectionFailure {
                server: server_url.to_string(),
                attempts,
                message: error.to_string(),
            },
            error => error,
        })
    }

    /// Tries each attribute variant in order; the first table that parses wins.
    fn query_with_fallback(
        &self,
        dataset: &DatasetHandle,
        sink: &dyn ProgressSink,
    ) -> Result<(AnnotationTable, Option<String>), KiraError> {
        let mut failures: Vec<KiraError> = Vec::new();
        for variant in AttributeVariant::FALLBACK_ORDER {
            let attributes = variant.attribute_set();
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Query; {variant} attribute set ({} fields)",
                    attributes.width()
                ),
                elapsed: None,
            });
            match self.query_variant(dataset, attributes, sink) {
                Ok(table) => {
                    let reason = failures.first().map(|err| err.to_string());
                    return Ok((table, reason));
                }
                Err(err) => {
                    warn!(dataset = %dataset.dataset_id, %variant, error = %err, "query failed");
                    sink.event(ProgressEvent {
                        message: format!("fallback: {variant} query failed: {err}"),
                        elapsed: None,
                    });
                    failures.push(err);
                }
            }
        }

        let fallback = failures.pop();
        let original = failures.pop();
        match (original, fallback) {
            (Some(original), Some(fallback)) => Err(KiraError::FallbackFailure {
                original: Box::new(original),
                fallback: Box::new(fallback),
            }),
            (_, Some(err)) | (Some(err), None) => Err(err),
            (None, None) => Err(KiraError::BiomartQuery(
                "no attribute set was queried".to_string(),
            )),
        }
    }

    fn query_variant(
        &self,
        dataset: &DatasetHandle,
        attributes: AttributeSet,
        sink: &dyn ProgressSink,
    ) -> Result<AnnotationTable, KiraError> {
        sink.event(ProgressEvent {
            message: "biomart.request query".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let body = self.client.query(dataset, &attributes.names())?;
        let latency = start.elapsed().as_millis();
        sink.event(ProgressEvent {
            message: format!("biomart.response latency_ms={latency}"),
            elapsed: None,
        });
        sink.event(ProgressEvent {
            message: "phase=Verify; parsing response".to_string(),
            elapsed: None,
        });
        AnnotationTable::parse_tsv(&body, attributes)
    }
}
