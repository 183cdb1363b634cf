use crate::paths::AppPaths;
use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

const CRAWL_LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const CRAWL_LOG_MAX_BACKUPS: usize = 3;

/// Structured event sink: `(level, event, data)`.
pub type LogFn<'a> = &'a (dyn Fn(&str, &str, serde_json::Value) + Sync);

pub fn discard(_level: &str, _event: &str, _data: serde_json::Value) {}

/// Append-only JSONL event file with size-based rotation (`crawl.jsonl.1`, `.2`, ...).
/// Every line carries the `run_id` of the process that wrote it.
#[derive(Debug)]
pub struct JsonlLog {
    path: PathBuf,
    run_id: String,
    rotate_bytes: u64,
    max_backups: usize,
    write_lock: Mutex<()>,
}

impl JsonlLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            run_id: uuid::Uuid::new_v4().to_string(),
            rotate_bytes: CRAWL_LOG_ROTATE_BYTES,
            max_backups: CRAWL_LOG_MAX_BACKUPS,
            write_lock: Mutex::new(()),
        }
    }

    pub fn for_paths(paths: &AppPaths) -> Self {
        Self::new(paths.crawl_log_path())
    }

    pub fn with_rotation(mut self, rotate_bytes: u64, max_backups: usize) -> Self {
        self.rotate_bytes = rotate_bytes;
        self.max_backups = max_backups;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn write(&self, level: &str, event: &str, data: serde_json::Value) -> Result<()> {
        let line = serde_json::json!({
            "ts_ms": now_ms(),
            "run_id": self.run_id,
            "level": level,
            "event": event,
            "data": data
        })
        .to_string();

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed()?;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(format!("{line}\n").as_bytes())?;
        Ok(())
    }

    /// Logging must never fail a crawl, so write errors are dropped here.
    pub fn log(&self, level: &str, event: &str, data: serde_json::Value) {
        let _ = self.write(level, event, data);
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(_) => return Ok(()),
        };
        if len < self.rotate_bytes {
            return Ok(());
        }
        rotate_file_backups(&self.path, self.max_backups)?;
        Ok(())
    }
}

fn rotate_file_backups(path: &Path, max_backups: usize) -> std::io::Result<()> {
    if max_backups == 0 {
        let _ = std::fs::remove_file(path);
        return Ok(());
    }

    for i in (1..=max_backups).rev() {
        let dst = path_with_suffix(path, &format!(".{i}"));
        let src = if i == 1 {
            path.to_path_buf()
        } else {
            path_with_suffix(path, &format!(".{}", i - 1))
        };
        if !src.exists() {
            continue;
        }
        if dst.exists() {
            let _ = std::fs::remove_file(&dst);
        }
        std::fs::rename(src, dst)?;
    }
    Ok(())
}

fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = match path.file_name() {
        Some(n) => n.to_string_lossy().to_string(),
        None => suffix.to_string(),
    };
    path.with_file_name(format!("{file_name}{suffix}"))
}

/// Reduce a url to its origin so paths and credentials stay out of logs.
pub fn redact_url_for_log(value: &str) -> String {
    match Url::parse(value) {
        Ok(uri) => {
            let scheme = uri.scheme();
            let authority = uri.host_str().unwrap_or("unknown-host");
            format!("{scheme}://{authority}/...")
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
