use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::models::AggregateIndex;
use crate::sources::{sources_from_settings, ListingSource};

/// Fans out to every source and merges the results. Owns the fetcher so
/// one client (and one response cache) serves all providers.
pub struct Aggregator {
    fetcher: Box<dyn Fetcher>,
    sources: Vec<Box<dyn ListingSource>>,
    index: AggregateIndex,
}

impl Aggregator {
    pub fn new(fetcher: Box<dyn Fetcher>, sources: Vec<Box<dyn ListingSource>>) -> Self {
        Self {
            fetcher,
            sources,
            index: AggregateIndex::new(),
        }
    }

    pub fn from_settings(fetcher: Box<dyn Fetcher>, settings: &Settings) -> Self {
        Self::new(fetcher, sources_from_settings(settings))
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.provider_name()).collect()
    }

    /// Rebuilds the index from scratch. A source that fails to fetch is
    /// left out of this cycle; only a fatal markup error stops the pass.
    pub fn aggregate(&mut self, bypass_cache: bool) -> Result<AggregateIndex> {
        self.index = AggregateIndex::new();

        for source in &self.sources {
            let provider = source.provider_name();
            let listings = match source.listings(self.fetcher.as_ref(), bypass_cache) {
                Ok(listings) => listings,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(provider, error = %e, "source unavailable this cycle");
                    continue;
                }
            };

            let found = listings.len();
            let mut kept = 0;
            for listing in listings {
                if self.index.insert(listing) {
                    kept += 1;
                }
            }
            info!(provider, found, kept, "merged listings");
        }

        Ok(self.index.clone())
    }
}
