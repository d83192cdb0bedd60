use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _, AsyncWriteExt as _};

/// One successful publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    pub video_path: PathBuf,
    pub published_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn now(title: impl Into<String>, video_path: impl Into<PathBuf>) -> Self {
        Self {
            title: title.into(),
            video_path: video_path.into(),
            published_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<HistoryEntry>>;
    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()>;
}

/// JSON Lines file, one entry per line.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read history: {}", self.path.display()));
            }
        };

        let mut entries = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                // A torn final line from an interrupted append.
                Err(err) => tracing::warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %err,
                    "skipping unreadable history line"
                ),
            }
        }
        Ok(entries)
    }

    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create history dir: {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry).context("serialize history entry")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open history: {}", self.path.display()))?;

        // Start on a fresh line if an earlier append was cut short.
        let len = file
            .metadata()
            .await
            .with_context(|| format!("stat history: {}", self.path.display()))?
            .len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(std::io::SeekFrom::End(-1))
                .await
                .with_context(|| format!("seek history: {}", self.path.display()))?;
            file.read_exact(&mut last)
                .await
                .with_context(|| format!("read history: {}", self.path.display()))?;
            if last[0] != b'\n' {
                line.insert(0, '\n');
            }
        }

        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("append history: {}", self.path.display()))?;
        file.flush().await.context("flush history")?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    entries: std::sync::Mutex<Vec<HistoryEntry>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries: std::sync::Mutex::new(entries),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?;
        Ok(entries.clone())
    }

    async fn append(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("history lock poisoned"))?
            .push(entry.clone());
        Ok(())
    }
}

/// Trimmed, lowercased, with internal whitespace runs collapsed to one space.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn contains(entries: &[HistoryEntry], title: &str) -> bool {
    let wanted = normalize_title(title);
    entries
        .iter()
        .any(|entry| normalize_title(&entry.title) == wanted)
}
