use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;
use txstream_api::crossover::Checkpoint;
use txstream_api::crossover::CheckpointError;
use txstream_api::crossover::Tape;

/// Stores the tape as a JSON file. Saves go through a sibling temp file and
/// a rename, so a crash never leaves a truncated checkpoint behind.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl Checkpoint for FileCheckpoint {
    async fn load(&self) -> Result<Option<Tape>, CheckpointError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CheckpointError::Io(err.to_string())),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|err| CheckpointError::Corrupt(format!("{}: {err}", self.path.display())))
    }

    async fn save(&self, tape: &Tape) -> Result<(), CheckpointError> {
        let contents =
            serde_json::to_vec(tape).map_err(|err| CheckpointError::Io(err.to_string()))?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|err| CheckpointError::Io(err.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|err| CheckpointError::Io(err.to_string()))?;
        debug!(path = %self.path.display(), head = tape.head, "saved checkpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let checkpoint = FileCheckpoint::new(dir.path().join("tape.json"));
        assert_eq!(checkpoint.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn saved_tape_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tape.json");
        let checkpoint = FileCheckpoint::new(&path);
        let tape = Tape {
            head: 650000,
            height: 650002,
        };

        checkpoint.save(&tape).await.unwrap();
        assert_eq!(checkpoint.load().await.unwrap(), Some(tape));
        assert!(!dir.path().join("tape.json.tmp").exists());
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            r#"{"head":650000,"height":650002}"#
        );
    }

    #[tokio::test]
    async fn garbage_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tape.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(
            FileCheckpoint::new(path).load().await,
            Err(CheckpointError::Corrupt(_))
        );
    }
}
