//! File-backed checkpoint store.
//!
//! Each checkpoint is written as pretty-printed JSON to `<dir>/<name>.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use toolbox_core::{
    context::{Checkpoint, CheckpointStore},
    error::{AgentError, Result},
};

/// `$HOME/.toolbox/checkpoints`, or a relative `.toolbox/checkpoints` without a home
pub fn default_checkpoint_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".toolbox")
        .join("checkpoints")
}

#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(AgentError::Config(format!("invalid checkpoint name: {:?}", name)));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

impl Default for FileCheckpointStore {
    fn default() -> Self {
        Self::new(default_checkpoint_dir())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, name: &str, checkpoint: &Checkpoint) -> Result<()> {
        let path = self.path(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(checkpoint)?;
        tokio::fs::write(&path, body).await?;
        tracing::debug!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Checkpoint>> {
        let path = self.path(name)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
