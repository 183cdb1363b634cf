use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("config")
    }

    pub fn crawl_config_path(&self) -> PathBuf {
        self.config_dir().join("crawl.json")
    }

    /// Optional cookie export (`name=value; ...` or JSON) loaded into the session jar.
    pub fn cookies_path(&self) -> PathBuf {
        self.config_dir().join("cookies.txt")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn crawl_log_path(&self) -> PathBuf {
        self.logs_dir().join("crawl.jsonl")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    pub fn read_cookies(&self) -> std::io::Result<Option<String>> {
        let path = self.cookies_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(trimmed.to_string()))
    }

    pub fn normalize_base_dir(base_dir: &Path) -> PathBuf {
        base_dir.to_path_buf()
    }
}
