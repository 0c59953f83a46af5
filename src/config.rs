use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::evidence::DEFAULT_PREVIEW_COUNT;

pub const SERVER_URL_ENV: &str = "SMARTVOTE_SERVER_URL";

/// A canned sidebar question
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Topic {
    pub title: String,
    pub query: String,
}

impl Topic {
    fn new(title: &str, query: &str) -> Self {
        Self {
            title: title.to_string(),
            query: query.to_string(),
        }
    }
}

pub fn default_topics() -> Vec<Topic> {
    vec![
        Topic::new("Climate Change", "What is the Liberal plan for climate change?"),
        Topic::new("Housing Crisis", "How will Liberals address the housing crisis?"),
        Topic::new("Healthcare", "What are the Liberal healthcare policies?"),
        Topic::new("Economic Growth", "What is the Liberal plan for economic growth?"),
        Topic::new(
            "Indigenous Reconciliation",
            "What is the Liberal approach to Indigenous reconciliation?",
        ),
        Topic::new("Immigration", "What is the Liberal immigration policy?"),
        Topic::new("Education", "What are the Liberal education policies?"),
        Topic::new("Taxes", "What tax changes are Liberals proposing?"),
    ]
}

fn default_server_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_stream_path() -> String {
    "/query-stream".to_string()
}

fn default_document_path() -> String {
    "/data/Liberal.pdf".to_string()
}

fn default_preview_count() -> usize {
    DEFAULT_PREVIEW_COUNT
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_document_path")]
    pub document_path: String,
    #[serde(default = "default_preview_count")]
    pub evidence_preview_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<Topic>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            server_url: default_server_url(),
            stream_path: default_stream_path(),
            document_path: default_document_path(),
            evidence_preview_count: DEFAULT_PREVIEW_COUNT,
            topics: None,
        }
    }

    /// Load from the user config dir, then apply the environment override
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                config.server_url = url;
            }
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn topics(&self) -> Vec<Topic> {
        match &self.topics {
            Some(topics) if !topics.is_empty() => topics.clone(),
            _ => default_topics(),
        }
    }

    pub fn stream_url(&self) -> String {
        join_url(&self.server_url, &self.stream_path)
    }

    pub fn document_url(&self) -> String {
        join_url(&self.server_url, &self.document_path)
    }

    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("smartvote"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::get_config_dir()?.join("config.json"))
    }
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.server_url, "http://localhost:8000");
        assert_eq!(config.stream_url(), "http://localhost:8000/query-stream");
        assert_eq!(config.document_url(), "http://localhost:8000/data/Liberal.pdf");
        assert_eq!(config.evidence_preview_count, 5);
        assert_eq!(config.topics().len(), 8);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::new();
        config.server_url = "https://vote.example.org/".to_string();
        config.topics = Some(vec![Topic::new("Jobs", "What about jobs?")]);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.stream_url(), "https://vote.example.org/query-stream");
        assert_eq!(loaded.topics(), vec![Topic::new("Jobs", "What about jobs?")]);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"server_url":"http://10.0.0.2:9000"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server_url, "http://10.0.0.2:9000");
        assert_eq!(config.document_path, "/data/Liberal.pdf");
        assert!(config.topics.is_none());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1/", "/a"), "http://h:1/a");
        assert_eq!(join_url("http://h:1", "a"), "http://h:1/a");
    }
}
