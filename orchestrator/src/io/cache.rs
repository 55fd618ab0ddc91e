//! Content-addressed knowledge cache.
//!
//! Entries live at `<cache_dir>/<sha256(topic)>.json`. Entries are never
//! deleted and never expire; storing a topic again overwrites it in place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const CACHE_ENTRY_VERSION: u32 = 1;

/// Full hex SHA-256 of a topic string.
pub fn topic_key(topic: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(topic.as_bytes());
    hex::encode(hasher.finalize())
}

/// On-disk form of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub topic: String,
    pub data: Value,
    /// UTC, RFC 3339.
    pub stored_at: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct KnowledgeCache {
    cache_dir: PathBuf,
}

impl KnowledgeCache {
    /// Open (and create if needed) a cache rooted at `cache_dir`.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("create cache dir {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    /// Store `data` under `topic`, replacing any previous entry. Returns the key.
    ///
    /// The entry is written to a unique temp file in the cache dir and renamed
    /// over the target, so readers never observe a partial entry and
    /// concurrent writers resolve to last-writer-wins.
    pub fn store(&self, topic: &str, data: Value) -> Result<String> {
        let key = topic_key(topic);
        let entry = CacheEntry {
            topic: topic.to_string(),
            data,
            stored_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: CACHE_ENTRY_VERSION,
        };
        let mut buf = serde_json::to_vec_pretty(&entry).context("serialize cache entry")?;
        buf.push(b'\n');

        let path = self.entry_path(&key);
        let mut tmp = NamedTempFile::new_in(&self.cache_dir)
            .with_context(|| format!("create temp file in {}", self.cache_dir.display()))?;
        tmp.write_all(&buf)
            .with_context(|| format!("write temp cache entry for {key}"))?;
        tmp.persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("replace cache entry {}", path.display()))?;

        debug!(topic, key = %key, "stored cache entry");
        Ok(key)
    }

    /// Data stored under `topic`, or `None` when absent.
    pub fn load(&self, topic: &str) -> Option<Value> {
        self.load_entry(topic).map(|entry| entry.data)
    }

    /// Full entry including metadata.
    ///
    /// Unreadable or corrupt entries are logged and treated as absent.
    pub fn load_entry(&self, topic: &str) -> Option<CacheEntry> {
        let path = self.entry_path(&topic_key(topic));
        read_entry(&path)
    }

    pub fn exists(&self, topic: &str) -> bool {
        self.entry_path(&topic_key(topic)).is_file()
    }

    /// Topics of all readable entries, sorted.
    pub fn list_topics(&self) -> Result<Vec<String>> {
        let mut topics: Vec<String> = self
            .entry_files()?
            .iter()
            .filter_map(|path| read_entry(path))
            .map(|entry| entry.topic)
            .collect();
        topics.sort();
        Ok(topics)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let files = self.entry_files()?;
        let mut total_size_bytes = 0;
        for path in &files {
            let meta =
                fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
            total_size_bytes += meta.len();
        }
        Ok(CacheStats {
            entries: files.len(),
            total_size_bytes,
            cache_dir: self.cache_dir.clone(),
        })
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let dir = fs::read_dir(&self.cache_dir)
            .with_context(|| format!("read cache dir {}", self.cache_dir.display()))?;
        let mut files = Vec::new();
        for item in dir {
            let path = item
                .with_context(|| format!("read cache dir {}", self.cache_dir.display()))?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable cache entry");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(entry) => Some(entry),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "corrupt cache entry");
            None
        }
    }
}
