//! Free-text station search
//!
//! `search` is a pure case-insensitive substring match over name, address
//! and operator. `SearchSession` wraps it with the keystroke debounce and
//! guarantees that results are published in query issuance order: a
//! superseded query never overwrites the results of a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use velomap_common::{SearchResult, Station};

use crate::config::SearchConfig;
use crate::store::StationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Queries shorter than this (after trimming) yield nothing
    pub min_query_len: usize,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_query_len: 2,
            max_results: 5,
        }
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            min_query_len: config.min_query_len,
            max_results: config.max_results,
        }
    }
}

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

fn field_contains(field: Option<&str>, needle: &str) -> bool {
    field.is_some_and(|value| value.to_lowercase().contains(needle))
}

/// Stations whose name, address or operator contains `query`
///
/// No ranking: hits come in input order, truncated to `max_results`.
pub fn search(stations: &[Station], query: &str, options: &SearchOptions) -> Vec<SearchResult> {
    let needle = normalize_query(query);
    if needle.is_empty() || needle.chars().count() < options.min_query_len {
        return Vec::new();
    }

    stations
        .iter()
        .filter(|station| {
            field_contains(Some(&station.name), &needle)
                || field_contains(station.address.as_deref(), &needle)
                || field_contains(station.operator.as_deref(), &needle)
        })
        .take(options.max_results)
        .map(SearchResult::from)
        .collect()
}

/// Latest published search outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchUpdate {
    /// Issuance number of the query these results belong to
    pub generation: u64,
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// Debounced search over the store's current snapshot
pub struct SearchSession {
    store: Arc<StationStore>,
    options: SearchOptions,
    debounce: Duration,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
    results_tx: watch::Sender<SearchUpdate>,
}

impl SearchSession {
    pub fn new(store: Arc<StationStore>, options: SearchOptions, debounce: Duration) -> Self {
        let (results_tx, _) = watch::channel(SearchUpdate::default());
        Self {
            store,
            options,
            debounce,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
            results_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchUpdate> {
        self.results_tx.subscribe()
    }

    pub fn latest(&self) -> SearchUpdate {
        self.results_tx.borrow().clone()
    }

    fn replace_pending(&self, handle: Option<JoinHandle<()>>) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = handle;
    }

    /// Register a keystroke; the query runs once `debounce` passes without
    /// another submission. Returns the query's issuance number.
    pub fn submit(&self, query: impl Into<String>) -> u64 {
        let query = query.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let store = self.store.clone();
        let options = self.options;
        let debounce = self.debounce;
        let current = self.generation.clone();
        let results_tx = self.results_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if current.load(Ordering::SeqCst) != generation {
                return;
            }

            let snapshot = store.snapshot().await;
            let results = search(&snapshot.stations, &query, &options);

            if current.load(Ordering::SeqCst) != generation {
                tracing::debug!("Discarding superseded search '{}'", query);
                return;
            }

            tracing::debug!("Search '{}' found {} results", query, results.len());
            results_tx.send_replace(SearchUpdate {
                generation,
                query,
                results,
            });
        });

        self.replace_pending(Some(handle));
        generation
    }

    /// Drop the pending query and clear the published results
    pub fn clear(&self) {
        self.cancel();
        self.results_tx.send_replace(SearchUpdate {
            generation: self.generation.load(Ordering::SeqCst),
            ..Default::default()
        });
    }

    /// Abandon any pending or running query
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_pending(None);
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
