use crate::codec::PayloadScheme;
use crate::crawl::{CrawlOptions, EpisodeRange, MAX_DEPTH};
use crate::pagination::DEFAULT_MAX_PAGES;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// How listing bodies are unscrambled; offsets are origin-specific.
    pub codec: PayloadScheme,
    /// `/`-delimited folder names that are never descended into.
    pub blacklist: String,
    pub max_depth: u32,
    pub max_pages: usize,
    pub accepted_media_prefix: String,
    pub trim_names: bool,
    pub parallel: bool,
    pub max_workers: usize,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
    /// Origin used for the time-embedded hash header; unset disables it.
    pub hash_origin: Option<String>,
    /// Fetch `<hash_origin>/futoken` once and hash with its body instead of the cookie.
    pub bootstrap_seed: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            codec: PayloadScheme::default(),
            blacklist: String::new(),
            max_depth: MAX_DEPTH,
            max_pages: DEFAULT_MAX_PAGES,
            accepted_media_prefix: "video/".to_string(),
            trim_names: true,
            parallel: false,
            max_workers: 4,
            timeout_secs: 30,
            user_agent: None,
            hash_origin: None,
            bootstrap_seed: false,
        }
    }
}

impl CrawlConfig {
    pub fn crawl_options(&self, range: Option<EpisodeRange>) -> CrawlOptions {
        CrawlOptions {
            max_depth: self.max_depth,
            blacklist: CrawlOptions::parse_blacklist(&self.blacklist),
            accepted_media_prefix: self.accepted_media_prefix.clone(),
            trim_names: self.trim_names,
            range,
            parallel: self.parallel,
            max_workers: self.max_workers.max(1),
        }
    }
}

pub fn load_crawl_config(paths: &AppPaths) -> Result<CrawlConfig> {
    let path = paths.crawl_config_path();
    if !path.exists() {
        return Ok(CrawlConfig::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: CrawlConfig = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::Config(format!(
            "failed to parse crawl config at {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    Ok(parsed)
}

pub fn save_crawl_config(paths: &AppPaths, config: &CrawlConfig) -> Result<()> {
    let path = paths.crawl_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let config = load_crawl_config(&paths).expect("load");
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.max_pages, 10_000);
        assert_eq!(
            config.codec,
            PayloadScheme::ReversedBase64 {
                head_skip: 24,
                tail_skip: 20
            }
        );
    }

    #[test]
    fn saved_config_round_trips_and_partial_files_fill_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let mut config = CrawlConfig::default();
        config.blacklist = "Extras/NCED".to_string();
        config.codec = PayloadScheme::ReversedBase64 {
            head_skip: 10,
            tail_skip: 12,
        };
        save_crawl_config(&paths, &config).expect("save");
        let loaded = load_crawl_config(&paths).expect("load");
        assert_eq!(loaded.blacklist, "Extras/NCED");
        assert_eq!(loaded.codec, config.codec);

        std::fs::write(paths.crawl_config_path(), r#"{"parallel": true}"#).expect("write");
        let partial = load_crawl_config(&paths).expect("partial");
        assert!(partial.parallel);
        assert!(partial.trim_names);
    }

    #[test]
    fn malformed_config_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        paths.ensure_dirs().expect("dirs");
        std::fs::write(paths.crawl_config_path(), "{not json").expect("write");
        assert!(load_crawl_config(&paths).is_err());
    }
}
