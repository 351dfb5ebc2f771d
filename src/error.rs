use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Transport failure with no cached body to fall back on.
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A table row that does not fit the provider's column layout.
    #[error("malformed row from {provider}: {line}")]
    Parse { provider: String, line: String },

    /// A cell that should carry a link but does not.
    #[error("no link in cell from {provider}: {cell}")]
    LinkExtraction { provider: String, cell: String },

    /// The provider's markup no longer looks like the dialect we parse.
    /// Unlike every other variant this one aborts the whole run.
    #[error("markup of {provider} changed shape, offending row: {line}")]
    MarkupChanged { provider: String, line: String },

    #[error("ledger store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    /// A background operation panicked before producing a result.
    #[error("backend worker panicked")]
    WorkerPanicked,
}

impl TrackerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::MarkupChanged { .. })
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
