use crate::chat::ChatTurn;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Durable storage for the chat transcript
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the stored turns. A missing slot yields an empty list.
    async fn load(&self) -> Result<Vec<ChatTurn>>;

    /// Replace the stored turns with `turns`
    async fn save(&self, turns: &[ChatTurn]) -> Result<()>;
}

/// JSON file backed store
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl HistoryStore for FileHistoryStore {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read history: {}", self.path.display()))
            }
        };

        let turns: Vec<ChatTurn> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse history: {}", self.path.display()))?;

        debug!("Loaded {} turns from {}", turns.len(), self.path.display());
        Ok(turns)
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create dir: {}", parent.display()))?;
            }
        }

        let payload = serde_json::to_vec(turns)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, payload)
            .await
            .with_context(|| format!("Failed to write history temp: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace history: {}", self.path.display()))?;

        debug!("Saved {} turns to {}", turns.len(), self.path.display());
        Ok(())
    }
}

/// In-process store, used with `--no-persist` and in tests
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    turns: Mutex<Vec<ChatTurn>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_turns(turns: Vec<ChatTurn>) -> Self {
        Self {
            turns: Mutex::new(turns),
        }
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self) -> Result<Vec<ChatTurn>> {
        Ok(self.turns.lock().await.clone())
    }

    async fn save(&self, turns: &[ChatTurn]) -> Result<()> {
        *self.turns.lock().await = turns.to_vec();
        Ok(())
    }
}
