use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub enabled: bool,
    /// Raw markdown document the table is read from.
    pub source_url: String,
    /// Human-facing page, also used as the URL of locked listings.
    pub display_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider display name -> provider settings, tried in this order.
    pub providers: IndexMap<String, ProviderConfig>,
    pub applied_sheet: String,
    pub discarded_sheet: String,
    pub cache_expiry_secs: u64,
    pub reload_cooldown_secs: u64,
    pub ledger_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut providers = IndexMap::new();
        providers.insert(
            "Ouckah & CS Careers".to_string(),
            ProviderConfig {
                enabled: true,
                source_url: "https://raw.githubusercontent.com/Ouckah/Summer2025-Internships/main/README.md".to_string(),
                display_url: "https://github.com/Ouckah/Summer2025-Internships".to_string(),
            },
        );
        providers.insert(
            "Pitt CSC & Simplify".to_string(),
            ProviderConfig {
                enabled: true,
                source_url: "https://raw.githubusercontent.com/SimplifyJobs/Summer2025-Internships/dev/README.md".to_string(),
                display_url: "https://github.com/SimplifyJobs/Summer2025-Internships".to_string(),
            },
        );
        providers.insert(
            "Northwestern Fintech Club".to_string(),
            ProviderConfig {
                enabled: false,
                source_url: "https://raw.githubusercontent.com/northwesternfintech/2025QuantInternships/main/README.md".to_string(),
                display_url: "https://github.com/northwesternfintech/2025QuantInternships".to_string(),
            },
        );

        Self {
            providers,
            applied_sheet: "Applications".to_string(),
            discarded_sheet: "Ignore".to_string(),
            cache_expiry_secs: 60,
            reload_cooldown_secs: 5,
            ledger_path: None,
            cache_path: None,
        }
    }
}

impl Settings {
    /// Reads the settings file, or the built-in defaults when there is none.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings file: {}", path.display()))
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(path)
    }

    /// Display URLs double as placeholders for locked listings, so they
    /// are never used to match a posting by URL.
    pub fn placeholder_urls(&self) -> Vec<String> {
        self.providers
            .values()
            .map(|p| p.display_url.clone())
            .collect()
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| data_dir().join("ledger.db"))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| cache_dir().join("listing_cache.db"))
    }

    pub fn log_path(&self) -> PathBuf {
        data_dir().join("apptrack.log")
    }

    fn default_path() -> Result<PathBuf> {
        Ok(config_dir().join("settings.json"))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "apptrack")
}

// Without a home directory everything lands in the working directory.
fn config_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn cache_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.applied_sheet, "Applications");
        assert_eq!(settings.discarded_sheet, "Ignore");
        assert_eq!(settings.reload_cooldown_secs, 5);
        assert_eq!(settings.providers.len(), 3);
        assert_eq!(settings.placeholder_urls().len(), 3);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let raw = r#"{
            "providers": {
                "Pitt CSC & Simplify": {
                    "enabled": true,
                    "source_url": "https://example.com/README.md",
                    "display_url": "https://example.com"
                }
            },
            "reload_cooldown_secs": 10
        }"#;
        let settings: Settings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.providers.len(), 1);
        assert_eq!(settings.reload_cooldown_secs, 10);
        assert_eq!(settings.cache_expiry_secs, 60);
        assert_eq!(settings.applied_sheet, "Applications");
    }

    #[test]
    fn test_provider_order_is_preserved() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        let names: Vec<&String> = back.providers.keys().collect();
        assert_eq!(
            names,
            vec!["Ouckah & CS Careers", "Pitt CSC & Simplify", "Northwestern Fintech Club"]
        );
    }
}
