//! Application ledgers and the status reconciliation built on them.
//!
//! Two sheets back the ledgers: one row per application in "Applied",
//! one row per dismissed posting in "Discarded". Both are mirrored in
//! memory and indexed by (company, title) and by canonical URL.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::Result;
use crate::links::canonical_url;
use crate::models::{JobStatus, LedgerRow};
use crate::store::{LedgerStore, SheetRow};

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    by_title: HashMap<String, HashMap<String, Vec<LedgerRow>>>,
    by_url: HashMap<String, Vec<LedgerRow>>,
    last_row_id: usize,
}

impl Ledger {
    /// Row ids follow the sheet's 1-indexed row numbers. Blank rows keep
    /// their number but are not indexed.
    fn from_rows(rows: Vec<SheetRow>) -> Self {
        let mut ledger = Ledger::default();
        for (index, [company, title, url, location]) in rows.into_iter().enumerate() {
            ledger.last_row_id = index + 1;
            if company.is_empty() && title.is_empty() && url.is_empty() && location.is_empty() {
                continue;
            }
            ledger.insert(LedgerRow {
                row_id: index + 1,
                company_name: company,
                job_title: title,
                location,
                url,
            });
        }
        ledger
    }

    fn insert(&mut self, row: LedgerRow) {
        self.last_row_id = self.last_row_id.max(row.row_id);

        if !row.url.is_empty() {
            self.by_url
                .entry(canonical_url(&row.url))
                .or_default()
                .push(row.clone());
        }

        self.by_title
            .entry(row.company_name.clone())
            .or_default()
            .entry(row.job_title.clone())
            .or_default()
            .push(row);
    }

    fn contains_url(&self, canonical: &str) -> bool {
        self.by_url.contains_key(canonical)
    }

    fn contains(&self, company_name: &str, job_title: &str, location: &str) -> bool {
        self.by_title
            .get(company_name)
            .and_then(|titles| titles.get(job_title))
            .is_some_and(|rows| rows.iter().any(|r| r.location == location))
    }

    /// Append cursor: the next row goes to `last_row_id() + 1`.
    pub fn last_row_id(&self) -> usize {
        self.last_row_id
    }
}

pub struct Reconciler<S: LedgerStore> {
    store: S,
    applied_sheet: String,
    discarded_sheet: String,
    applied: Ledger,
    discarded: Ledger,
    /// Canonical forms of the board URLs standing in for locked listings.
    placeholders: HashSet<String>,
    cooldown: Duration,
    last_reload: Option<Instant>,
}

impl<S: LedgerStore> Reconciler<S> {
    pub fn new(
        store: S,
        applied_sheet: &str,
        discarded_sheet: &str,
        placeholder_urls: &[String],
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            applied_sheet: applied_sheet.to_string(),
            discarded_sheet: discarded_sheet.to_string(),
            applied: Ledger::default(),
            discarded: Ledger::default(),
            placeholders: placeholder_urls.iter().map(|u| canonical_url(u)).collect(),
            cooldown,
            last_reload: None,
        }
    }

    pub fn from_settings(store: S, settings: &Settings) -> Self {
        Self::new(
            store,
            &settings.applied_sheet,
            &settings.discarded_sheet,
            &settings.placeholder_urls(),
            Duration::from_secs(settings.reload_cooldown_secs),
        )
    }

    pub fn is_placeholder(&self, url: &str) -> bool {
        self.placeholders.contains(&canonical_url(url))
    }

    /// Rebuilds both ledgers from the store. Within the cooldown window a
    /// non-forced call does nothing and returns `false`.
    pub fn reload(&mut self, force: bool) -> Result<bool> {
        if !force {
            if let Some(last) = self.last_reload {
                if last.elapsed() < self.cooldown {
                    debug!("ledger reload skipped, still in cooldown");
                    return Ok(false);
                }
            }
        }

        // Build both before swapping so a failed read leaves the old view.
        let applied = Ledger::from_rows(self.store.get_all_rows(&self.applied_sheet)?);
        let discarded = Ledger::from_rows(self.store.get_all_rows(&self.discarded_sheet)?);

        info!(
            applied = applied.last_row_id(),
            discarded = discarded.last_row_id(),
            "ledgers reloaded"
        );

        self.applied = applied;
        self.discarded = discarded;
        self.last_reload = Some(Instant::now());
        Ok(true)
    }

    /// URL matches win over (company, title, location) matches, and
    /// Applied wins over Discarded at each step.
    pub fn status_of(
        &self,
        company_name: &str,
        job_title: &str,
        location: &str,
        url: &str,
    ) -> JobStatus {
        let canonical = canonical_url(url);
        if !self.placeholders.contains(&canonical) {
            if self.applied.contains_url(&canonical) {
                return JobStatus::Applied;
            }
            if self.discarded.contains_url(&canonical) {
                return JobStatus::Discarded;
            }
        }

        if self.applied.contains(company_name, job_title, location) {
            return JobStatus::Applied;
        }
        if self.discarded.contains(company_name, job_title, location) {
            return JobStatus::Discarded;
        }

        JobStatus::NotApplied
    }

    pub fn record_applied(
        &mut self,
        company_name: &str,
        job_title: &str,
        location: &str,
        url: &str,
    ) -> Result<LedgerRow> {
        let sheet = self.applied_sheet.clone();
        let row = Self::append(&mut self.store, &sheet, &mut self.applied, company_name, job_title, location, url)?;
        info!(company = company_name, title = job_title, row = row.row_id, "recorded application");
        Ok(row)
    }

    /// Unlike [`record_applied`](Self::record_applied), this reloads first
    /// (ignoring the cooldown) to pick up rows added elsewhere before
    /// choosing the next row id.
    pub fn record_discarded(
        &mut self,
        company_name: &str,
        job_title: &str,
        location: &str,
        url: &str,
    ) -> Result<LedgerRow> {
        self.reload(true)?;

        let sheet = self.discarded_sheet.clone();
        let row = Self::append(&mut self.store, &sheet, &mut self.discarded, company_name, job_title, location, url)?;
        info!(company = company_name, title = job_title, row = row.row_id, "recorded discard");
        Ok(row)
    }

    fn append(
        store: &mut S,
        sheet: &str,
        ledger: &mut Ledger,
        company_name: &str,
        job_title: &str,
        location: &str,
        url: &str,
    ) -> Result<LedgerRow> {
        let row = LedgerRow {
            row_id: ledger.last_row_id() + 1,
            company_name: company_name.to_string(),
            job_title: job_title.to_string(),
            location: location.to_string(),
            url: url.to_string(),
        };

        // Physical layout puts the URL before the location.
        store.write_row(
            sheet,
            row.row_id,
            [
                row.company_name.clone(),
                row.job_title.clone(),
                row.url.clone(),
                row.location.clone(),
            ],
        )?;

        ledger.insert(row.clone());
        Ok(row)
    }

    pub fn applied_count(&self) -> usize {
        self.applied.last_row_id()
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.last_row_id()
    }
}
