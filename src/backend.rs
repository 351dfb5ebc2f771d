//! Ties the aggregator and the reconciler together into the working set
//! the list view shows, and runs the slow operations off the caller's
//! thread behind a single-flight gate.

use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::aggregate::Aggregator;
use crate::error::{Result, TrackerError};
use crate::ledger::Reconciler;
use crate::links::canonical_url;
use crate::models::{JobStatus, LedgerRow, Listing};
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Applied,
    Discarded,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::Applied => "Applied",
            Action::Discarded => "Discarded",
        }
    }
}

pub struct Backend<S: LedgerStore> {
    aggregator: Aggregator,
    reconciler: Reconciler<S>,
    working_set: Vec<Listing>,
    applied_count: usize,
    last_refresh: Option<DateTime<Local>>,
}

impl<S: LedgerStore> Backend<S> {
    pub fn new(aggregator: Aggregator, reconciler: Reconciler<S>) -> Self {
        Self {
            aggregator,
            reconciler,
            working_set: Vec::new(),
            applied_count: 0,
            last_refresh: None,
        }
    }

    pub fn working_set(&self) -> &[Listing] {
        &self.working_set
    }

    pub fn applied_count(&self) -> usize {
        self.applied_count
    }

    pub fn last_refresh(&self) -> Option<DateTime<Local>> {
        self.last_refresh
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.aggregator.source_names()
    }

    /// Rebuilds the working set: every aggregated listing that is neither
    /// applied to nor discarded, with repeated URLs dropped (placeholder
    /// URLs excepted), in discovery order.
    pub fn refresh(&mut self, bypass_cache: bool) -> Result<&[Listing]> {
        let index = self.aggregator.aggregate(bypass_cache)?;
        if index.is_empty() {
            warn!("no listings from any source");
        }
        self.reconciler.reload(false)?;

        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut working_set = Vec::new();

        for listing in index.listings() {
            let status = self.reconciler.status_of(
                &listing.company_name,
                &listing.job_title,
                &listing.location,
                &listing.url,
            );
            if status != JobStatus::NotApplied {
                continue;
            }

            if !self.reconciler.is_placeholder(&listing.url)
                && !seen_urls.insert(canonical_url(&listing.url))
            {
                debug!(url = %listing.url, source = %listing.source, "dropping repeated URL");
                continue;
            }

            working_set.push(listing.clone());
        }

        info!(
            aggregated = index.len(),
            to_review = working_set.len(),
            "working set rebuilt"
        );

        self.working_set = working_set;
        self.applied_count = self.reconciler.applied_count();
        self.last_refresh = Some(Local::now());
        Ok(&self.working_set)
    }

    pub fn record(&mut self, action: Action, listing: &Listing) -> Result<LedgerRow> {
        let Listing {
            company_name,
            job_title,
            location,
            url,
            ..
        } = listing;

        let row = match action {
            Action::Applied => {
                let row = self.reconciler.record_applied(company_name, job_title, location, url)?;
                self.applied_count += 1;
                row
            }
            Action::Discarded => {
                self.reconciler.record_discarded(company_name, job_title, location, url)?
            }
        };

        if let Some(pos) = self.working_set.iter().position(|l| l.same_entity(listing)) {
            self.working_set.remove(pos);
        }

        Ok(row)
    }
}

/// Level-triggered completion flag: once set it stays set until reset.
#[derive(Debug, Clone, Default)]
pub struct Completion(Arc<AtomicBool>);

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Sets the flag when dropped, so a worker that unwinds still signals.
struct SignalOnDrop(Completion);

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Interval at which callers poll [`Dispatcher::poll`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum Outcome {
    Refreshed { to_review: usize },
    Recorded { action: Action, row: LedgerRow },
}

/// Runs backend operations on a worker thread, one at a time.
pub struct Dispatcher<S: LedgerStore + 'static> {
    backend: Arc<Mutex<Backend<S>>>,
    done: Completion,
    worker: Option<JoinHandle<Result<Outcome>>>,
}

impl<S: LedgerStore + 'static> Dispatcher<S> {
    pub fn new(backend: Backend<S>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            done: Completion::new(),
            worker: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts a refresh unless something is already running.
    pub fn start_refresh(&mut self, bypass_cache: bool) -> bool {
        self.start(move |backend| {
            let to_review = backend.refresh(bypass_cache)?.len();
            Ok(Outcome::Refreshed { to_review })
        })
    }

    pub fn start_record(&mut self, action: Action, listing: Listing) -> bool {
        self.start(move |backend| {
            let row = backend.record(action, &listing)?;
            Ok(Outcome::Recorded { action, row })
        })
    }

    fn start<F>(&mut self, op: F) -> bool
    where
        F: FnOnce(&mut Backend<S>) -> Result<Outcome> + Send + 'static,
    {
        if self.is_busy() {
            debug!("backend busy, ignoring request");
            return false;
        }

        self.done.reset();
        let backend = Arc::clone(&self.backend);
        let done = self.done.clone();

        self.worker = Some(thread::spawn(move || {
            let _signal = SignalOnDrop(done);
            let result = {
                let mut guard = backend.lock().unwrap_or_else(PoisonError::into_inner);
                op(&mut guard)
            };
            if let Err(e) = &result {
                error!(error = %e, "backend operation failed");
            }
            result
        }));
        true
    }

    /// Non-blocking check. Returns the outcome once the running operation
    /// has signalled completion, after which the dispatcher is idle again.
    pub fn poll(&mut self) -> Option<Result<Outcome>> {
        if !self.done.is_set() {
            return None;
        }
        let worker = self.worker.take()?;
        self.done.reset();

        // The worker has already signalled, so this join does not wait on I/O.
        Some(worker.join().unwrap_or_else(|_| {
            error!("backend worker panicked");
            Err(TrackerError::WorkerPanicked)
        }))
    }

    /// Polls at [`POLL_INTERVAL`] until the running operation finishes,
    /// calling `on_tick` between polls.
    pub fn wait(&mut self, mut on_tick: impl FnMut()) -> Option<Result<Outcome>> {
        if !self.is_busy() {
            return None;
        }
        loop {
            if let Some(outcome) = self.poll() {
                return Some(outcome);
            }
            on_tick();
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Read access to backend state. Only meaningful while idle.
    pub fn with_backend<R>(&self, f: impl FnOnce(&Backend<S>) -> R) -> R {
        let guard = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::fetch::Fetcher;
    use crate::sources::{create_source, SourceKind};
    use crate::store::memory::MemoryStore;

    const BOARD: &str = "https://board.example";

    struct StaticFetcher(&'static str);

    impl Fetcher for StaticFetcher {
        fn fetch(&self, url: &str, _bypass_cache: bool) -> Result<String> {
            if url == "https://down" {
                return Err(TrackerError::Fetch {
                    url: url.to_string(),
                    reason: "timeout".to_string(),
                });
            }
            Ok(self.0.to_string())
        }
    }

    const DOC: &str = "TABLE_START\n\
        | Acme | SWE Intern | NYC | <a href=\"https://acme.com/1\">a</a> |\n\
        | Acme | SWE Intern | SF | <a href=\"https://www.acme.com/1?utm_source=Simplify&ref=Simplify\">a</a> |\n\
        | Globex | Data Intern | Remote | <a href=\"https://globex.com/2\">a</a> |\n\
        | Initech | QA Intern | Austin | 🔒 |\n\
        | Hooli | ML Intern | Palo Alto | 🔒 |\n\
        | Umbrella | Bio Intern | Raccoon City | <a href=\"https://umbrella.com/4\">a</a> |\n\
        TABLE_END";

    fn backend(store: MemoryStore) -> Backend<MemoryStore> {
        let config = ProviderConfig {
            enabled: true,
            source_url: "https://raw".to_string(),
            display_url: BOARD.to_string(),
        };
        let aggregator = Aggregator::new(
            Box::new(StaticFetcher(DOC)),
            vec![create_source(SourceKind::MarkerTable, "Board", &config)],
        );
        let reconciler = Reconciler::new(
            store,
            "Applications",
            "Ignore",
            &[BOARD.to_string()],
            Duration::from_secs(5),
        );
        Backend::new(aggregator, reconciler)
    }

    fn ledgers() -> MemoryStore {
        let mut store = MemoryStore::with_rows(
            "Applications",
            &[["Globex Corp", "Data", "https://www.globex.com/2", "Anywhere"]],
        );
        store.sheets.insert(
            "Ignore".to_string(),
            vec![["Umbrella", "Bio Intern", "", "Raccoon City"].map(str::to_string)],
        );
        store
    }

    fn companies(listings: &[Listing]) -> Vec<(&str, &str)> {
        listings
            .iter()
            .map(|l| (l.company_name.as_str(), l.location.as_str()))
            .collect()
    }

    #[test]
    fn test_refresh_filters_and_dedups_by_url() {
        let mut backend = backend(ledgers());
        let working_set = backend.refresh(false).unwrap();

        // SF repeats the NYC URL once canonicalized; Globex is applied by
        // URL; Umbrella is discarded by triple; locked listings share the
        // placeholder URL and are both kept.
        assert_eq!(
            companies(working_set),
            vec![("Acme", "NYC"), ("Initech", "Austin"), ("Hooli", "Palo Alto")]
        );
        assert_eq!(backend.applied_count(), 1);
        assert!(backend.last_refresh().is_some());
    }

    #[test]
    fn test_record_removes_from_working_set() {
        let mut backend = backend(ledgers());
        backend.refresh(false).unwrap();
        let acme = backend.working_set()[0].clone();

        let row = backend.record(Action::Applied, &acme).unwrap();
        assert_eq!(row.row_id, 2);
        assert_eq!(backend.applied_count(), 2);
        assert_eq!(companies(backend.working_set()), vec![("Initech", "Austin"), ("Hooli", "Palo Alto")]);

        let hooli = backend.working_set()[1].clone();
        backend.record(Action::Discarded, &hooli).unwrap();
        assert_eq!(companies(backend.working_set()), vec![("Initech", "Austin")]);
        assert_eq!(backend.applied_count(), 2);
    }

    #[test]
    fn test_recorded_urls_stay_out_after_refresh() {
        let mut backend = backend(ledgers());
        backend.refresh(false).unwrap();
        let acme = backend.working_set()[0].clone();
        backend.record(Action::Applied, &acme).unwrap();

        let working_set = backend.refresh(true).unwrap();
        assert!(working_set.iter().all(|l| canonical_url(&l.url) != "https://acme.com/1"));
    }

    #[test]
    fn test_dispatcher_single_flight() {
        let mut dispatcher = Dispatcher::new(backend(ledgers()));
        assert!(!dispatcher.is_busy());

        assert!(dispatcher.start_refresh(false));
        assert!(!dispatcher.start_refresh(false));

        let outcome = dispatcher.wait(|| {}).unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Refreshed { to_review: 3 }));
        assert!(!dispatcher.is_busy());
        assert!(dispatcher.poll().is_none());

        let first = dispatcher.with_backend(|b| b.working_set()[0].clone());
        assert!(dispatcher.start_record(Action::Discarded, first));
        let outcome = dispatcher.wait(|| {}).unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Recorded { action: Action::Discarded, .. }));
        assert_eq!(dispatcher.with_backend(|b| b.working_set().len()), 2);
    }

    #[test]
    fn test_panicking_operation_still_completes() {
        let mut dispatcher = Dispatcher::new(backend(ledgers()));
        assert!(dispatcher.start(|_| panic!("refresh blew up")));

        let outcome = dispatcher.wait(|| {}).unwrap();
        assert!(matches!(outcome, Err(TrackerError::WorkerPanicked)));
        assert!(!dispatcher.is_busy());

        // The poisoned lock is recovered and the backend stays usable.
        assert!(dispatcher.start_refresh(false));
        let outcome = dispatcher.wait(|| {}).unwrap().unwrap();
        assert!(matches!(outcome, Outcome::Refreshed { to_review: 3 }));
    }

    #[test]
    fn test_completion_is_level_triggered() {
        let done = Completion::new();
        assert!(!done.is_set());
        done.set();
        assert!(done.is_set());
        assert!(done.is_set());
        done.reset();
        assert!(!done.is_set());
    }
}
