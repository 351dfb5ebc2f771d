use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub company_name: String,
    pub job_title: String,
    pub location: String,
    pub url: String,
    pub source: String, // provider display name
}

impl Listing {
    /// Dedup identity within a merge pass. The URL is not part of it.
    pub fn same_entity(&self, other: &Listing) -> bool {
        self.company_name == other.company_name
            && self.job_title == other.job_title
            && self.location == other.location
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub row_id: usize,
    pub company_name: String,
    pub job_title: String,
    pub location: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    NotApplied,
    Applied,
    Discarded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotApplied => "not applied",
            JobStatus::Applied => "applied",
            JobStatus::Discarded => "discarded",
        }
    }
}

/// company -> title -> listings, all in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateIndex {
    companies: IndexMap<String, IndexMap<String, Vec<Listing>>>,
}

impl AggregateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts unless an entry with the same (company, title, location)
    /// already exists. Returns whether the listing was kept.
    pub fn insert(&mut self, listing: Listing) -> bool {
        let entries = self
            .companies
            .entry(listing.company_name.clone())
            .or_default()
            .entry(listing.job_title.clone())
            .or_default();

        if entries.iter().any(|existing| existing.same_entity(&listing)) {
            return false;
        }

        entries.push(listing);
        true
    }

    pub fn listings(&self) -> impl Iterator<Item = &Listing> {
        self.companies
            .values()
            .flat_map(|titles| titles.values())
            .flatten()
    }

    #[cfg(test)]
    pub fn get(&self, company_name: &str, job_title: &str) -> &[Listing] {
        self.companies
            .get(company_name)
            .and_then(|titles| titles.get(job_title))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.listings().count()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(company: &str, title: &str, location: &str, url: &str, source: &str) -> Listing {
        Listing {
            company_name: company.to_string(),
            job_title: title.to_string(),
            location: location.to_string(),
            url: url.to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_first_seen_wins() {
        let mut index = AggregateIndex::new();
        assert!(index.insert(listing("Acme", "SWE Intern", "NYC", "https://a/1", "first")));
        assert!(!index.insert(listing("Acme", "SWE Intern", "NYC", "https://a/2", "second")));

        let kept = index.get("Acme", "SWE Intern");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].source, "first");
        assert_eq!(kept[0].url, "https://a/1");
    }

    #[test]
    fn test_location_must_be_byte_identical() {
        let mut index = AggregateIndex::new();
        assert!(index.insert(listing("Acme", "SWE Intern", "NYC", "u", "s")));
        assert!(index.insert(listing("Acme", "SWE Intern", "NYC ", "u", "s")));
        assert!(index.insert(listing("Acme", "SWE Intern", "New York, NY", "u", "s")));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_listing_serializes_with_field_names() {
        let json = serde_json::to_value(listing("Acme", "SWE Intern", "NYC", "https://a/1", "Board")).unwrap();
        assert_eq!(json["company_name"], "Acme");
        assert_eq!(json["url"], "https://a/1");
        assert_eq!(json["source"], "Board");
    }

    #[test]
    fn test_iteration_follows_discovery_order() {
        let mut index = AggregateIndex::new();
        index.insert(listing("Zeta", "Role", "A", "u1", "s"));
        index.insert(listing("Acme", "Role", "A", "u2", "s"));
        index.insert(listing("Zeta", "Other", "A", "u3", "s"));

        let urls: Vec<&str> = index.listings().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["u1", "u3", "u2"]);
    }
}
