//! Listing sources, one per markdown dialect.
//!
//! Each source fetches its provider's README through the shared
//! [`Fetcher`] and turns table rows into [`Listing`]s. A row that does not
//! fit is logged and skipped; only [`TrackerError::MarkupChanged`] stops a
//! source, because it means the dialect itself is no longer what we parse.

use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, Settings};
use crate::error::{Result, TrackerError};
use crate::fetch::Fetcher;
use crate::links::{canonical_url, find_links, strip_links};
use crate::markdown::{is_separator_row, Marker, TableRow, TableRows};
use crate::models::Listing;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const SAME_COMPANY: &str = "↳";
const LOCKED: char = '🔒';
const CHECKMARK: char = '✅';

// --- Source trait ---

pub trait ListingSource: Send {
    fn provider_name(&self) -> &str;
    fn listings(&self, fetcher: &dyn Fetcher, bypass_cache: bool) -> Result<Vec<Listing>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `TABLE_START`/`TABLE_END` comments, one role per row.
    MarkerTable,
    /// Literal header row, one checkmark column per role category.
    RoleMatrix,
}

pub fn resolve_provider(name: &str) -> Option<SourceKind> {
    match name {
        "Ouckah & CS Careers" | "Pitt CSC & Simplify" => Some(SourceKind::MarkerTable),
        "Northwestern Fintech Club" => Some(SourceKind::RoleMatrix),
        _ => None,
    }
}

pub fn create_source(
    kind: SourceKind,
    provider_name: &str,
    config: &ProviderConfig,
) -> Box<dyn ListingSource> {
    match kind {
        SourceKind::MarkerTable => Box::new(MarkerTableSource::new(provider_name, config)),
        SourceKind::RoleMatrix => Box::new(RoleMatrixSource::new(provider_name, config)),
    }
}

/// Enabled, recognised providers in configuration order.
pub fn sources_from_settings(settings: &Settings) -> Vec<Box<dyn ListingSource>> {
    let mut sources = Vec::new();
    for (name, config) in &settings.providers {
        if !config.enabled {
            debug!(provider = %name, "provider disabled");
            continue;
        }
        match resolve_provider(name) {
            Some(kind) => sources.push(create_source(kind, name, config)),
            None => warn!(provider = %name, "unknown provider, skipping"),
        }
    }
    sources
}

fn log_skipped(provider: &str, skipped: usize, kept: usize) {
    if skipped > 0 {
        info!(provider, skipped, kept, "finished parsing with skipped rows");
    } else {
        debug!(provider, kept, "finished parsing");
    }
}

// --- Marker table dialect ---

pub struct MarkerTableSource {
    provider_name: String,
    source_url: String,
    display_url: String,
}

impl MarkerTableSource {
    pub fn new(provider_name: &str, config: &ProviderConfig) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            source_url: config.source_url.clone(),
            display_url: config.display_url.clone(),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Vec<Listing>> {
        let rows = TableRows::new(
            text,
            Marker::Contains("TABLE_START"),
            Some(Marker::Contains("TABLE_END")),
        );

        let mut listings = Vec::new();
        let mut last_company = String::new();
        let mut skipped = 0;

        for row in rows {
            match self.parse_row(&row, &mut last_company) {
                Ok(Some(listing)) => listings.push(listing),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    skipped += 1;
                    warn!(provider = %self.provider_name, error = %e, "skipping row");
                }
            }
        }

        log_skipped(&self.provider_name, skipped, listings.len());
        Ok(listings)
    }

    fn parse_row(&self, row: &TableRow, last_company: &mut String) -> Result<Option<Listing>> {
        let malformed = || TrackerError::Parse {
            provider: self.provider_name.clone(),
            line: row.raw.to_string(),
        };

        // | company | role | location | link | ... |
        let (Some(company), Some(role), Some(location), Some(status)) =
            (row.cell(1), row.cell(2), row.cell(3), row.cell(4))
        else {
            return Err(malformed());
        };

        if company == "Company" && role == "Role" {
            return Ok(None);
        }
        if is_separator_row(row) {
            return Ok(None);
        }

        let company_name = if company == SAME_COMPANY {
            if last_company.is_empty() {
                return Err(malformed());
            }
            last_company.clone()
        } else {
            strip_links(company)
        };
        *last_company = company_name.clone();

        let url = if status.contains(LOCKED) {
            self.display_url.clone()
        } else {
            let href = first_href(status).ok_or_else(|| TrackerError::MarkupChanged {
                provider: self.provider_name.clone(),
                line: row.raw.to_string(),
            })?;
            canonical_url(&href)
        };

        Ok(Some(Listing {
            company_name,
            job_title: role.chars().filter(char::is_ascii).collect(),
            location: clean_location(location),
            url,
            source: self.provider_name.clone(),
        }))
    }
}

impl ListingSource for MarkerTableSource {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn listings(&self, fetcher: &dyn Fetcher, bypass_cache: bool) -> Result<Vec<Listing>> {
        let text = fetcher.fetch(&self.source_url, bypass_cache)?;
        self.parse(&text)
    }
}

/// The link cell holds HTML (`<a href=..><img ..></a>`), so it goes through
/// a real HTML parser rather than a pattern.
fn first_href(cell: &str) -> Option<String> {
    let fragment = Html::parse_fragment(cell);
    fragment
        .select(&ANCHOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// `SF</br>NYC` -> `SF | NYC`, and a collapsed
/// `<details><summary>2 locations</summary>SF</br>NYC</details>` keeps
/// the summary text followed by the locations.
fn clean_location(cell: &str) -> String {
    let mut location = cell.to_string();
    for br in ["</br>", "<br/>", "<br />", "<br>"] {
        location = location.replace(br, " | ");
    }
    location
        .replace("<details><summary>", "")
        .replace("</summary>", " ")
        .replace("</details>", "")
}

// --- Role matrix dialect ---

const ROLE_MATRIX_HEADER: &str = "| Company| Location|SWE|QR|QT|Status| Notes|";

/// Column index -> title emitted for a checked cell in that column.
const ROLE_COLUMNS: [(usize, &str); 3] = [
    (3, "Software Engineer Intern"),
    (4, "Quantitative Researcher Intern"),
    (5, "Quantitative Trader Intern"),
];

pub struct RoleMatrixSource {
    provider_name: String,
    source_url: String,
}

impl RoleMatrixSource {
    pub fn new(provider_name: &str, config: &ProviderConfig) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            source_url: config.source_url.clone(),
        }
    }

    pub fn parse(&self, text: &str) -> Result<Vec<Listing>> {
        // No end marker: the table runs to the end of the document.
        let rows = TableRows::new(text, Marker::LinePrefix(ROLE_MATRIX_HEADER), None);

        let mut listings = Vec::new();
        let mut skipped = 0;

        for row in rows {
            if is_separator_row(&row) {
                continue;
            }

            // Every role column has to exist before any of them is read.
            if row.cells.len() <= ROLE_COLUMNS[ROLE_COLUMNS.len() - 1].0 {
                skipped += 1;
                let e = TrackerError::Parse {
                    provider: self.provider_name.clone(),
                    line: row.raw.to_string(),
                };
                warn!(provider = %self.provider_name, error = %e, "skipping row");
                continue;
            }

            let company_name = strip_links(&row.cells[1]);
            let location = row.cells[2].clone();

            for (column, title) in ROLE_COLUMNS {
                let cell = &row.cells[column];
                if !cell.contains(CHECKMARK) {
                    continue;
                }

                match self.role_url(cell) {
                    Ok(url) => listings.push(Listing {
                        company_name: company_name.clone(),
                        job_title: title.to_string(),
                        location: location.clone(),
                        url,
                        source: self.provider_name.clone(),
                    }),
                    Err(e) => {
                        skipped += 1;
                        warn!(provider = %self.provider_name, error = %e, line = row.raw, "skipping role");
                    }
                }
            }
        }

        log_skipped(&self.provider_name, skipped, listings.len());
        Ok(listings)
    }

    /// First inline link of the cell, else its first resolved footnote link.
    fn role_url(&self, cell: &str) -> Result<String> {
        let links = find_links(cell);
        links
            .regular
            .first()
            .or_else(|| links.footnotes.first())
            .map(|(_, url)| canonical_url(url))
            .ok_or_else(|| TrackerError::LinkExtraction {
                provider: self.provider_name.clone(),
                cell: cell.to_string(),
            })
    }
}

impl ListingSource for RoleMatrixSource {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn listings(&self, fetcher: &dyn Fetcher, bypass_cache: bool) -> Result<Vec<Listing>> {
        let text = fetcher.fetch(&self.source_url, bypass_cache)?;
        self.parse(&text)
    }
}
