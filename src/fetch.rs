use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};

/// Source of raw listing documents. Caching, expiry and stale fallback are
/// the implementor's business; callers only choose whether to bypass.
pub trait Fetcher: Send {
    fn fetch(&self, url: &str, bypass_cache: bool) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Response bodies keyed by URL, kept in SQLite so they survive restarts.
pub struct ResponseCache {
    conn: Connection,
}

impl ResponseCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrackerError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                url TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, url: &str) -> Result<Option<CachedResponse>> {
        let result = self.conn.query_row(
            "SELECT body, fetched_at FROM responses WHERE url = ?1",
            [url],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        );
        match result {
            Ok((body, ts)) => Ok(Some(CachedResponse {
                body,
                fetched_at: Utc.timestamp_opt(ts, 0).single().unwrap_or_default(),
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn put(&self, url: &str, body: &str) -> Result<()> {
        self.put_at(url, body, Utc::now())
    }

    pub fn put_at(&self, url: &str, body: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO responses (url, body, fetched_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET body = excluded.body, fetched_at = excluded.fetched_at",
            params![url, body, fetched_at.timestamp()],
        )?;
        Ok(())
    }
}

pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, expiry: Duration) -> bool {
    now - fetched_at < expiry
}

/// Blocking HTTP client in front of a [`ResponseCache`]. Built once at
/// startup and lent to every source.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    cache: ResponseCache,
    expiry: Duration,
}

impl HttpFetcher {
    pub fn new(cache: ResponseCache, expiry_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("apptrack/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TrackerError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cache,
            expiry: Duration::seconds(expiry_secs as i64),
        })
    }

    fn request(&self, url: &str) -> std::result::Result<String, String> {
        let response = self.client.get(url).send().map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP status {}", response.status()));
        }

        response.text().map_err(|e| e.to_string())
    }

    fn cached(&self, url: &str) -> Option<CachedResponse> {
        match self.cache.get(url) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(url, error = %e, "response cache read failed");
                None
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, bypass_cache: bool) -> Result<String> {
        let cached = if bypass_cache { None } else { self.cached(url) };

        if let Some(hit) = &cached {
            if is_fresh(hit.fetched_at, Utc::now(), self.expiry) {
                debug!(url, "serving listing document from cache");
                return Ok(hit.body.clone());
            }
        }

        match self.request(url) {
            Ok(body) => {
                if let Err(e) = self.cache.put(url, &body) {
                    warn!(url, error = %e, "response cache write failed");
                }
                Ok(body)
            }
            Err(reason) => match cached {
                Some(stale) => {
                    warn!(url, %reason, fetched_at = %stale.fetched_at, "fetch failed, serving stale copy");
                    Ok(stale.body)
                }
                None => Err(TrackerError::Fetch {
                    url: url.to_string(),
                    reason,
                }),
            },
        }
    }
}
