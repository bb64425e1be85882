use super::{MessageEncoder, RecordSink, SinkError};
use crate::source::Record;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Appends one encoded message per line to a file.
pub struct FileSink {
    path: PathBuf,
    encoder: MessageEncoder,
    file: Option<File>,
}

impl FileSink {
    pub fn new(path: PathBuf, encoder: MessageEncoder) -> Self {
        Self {
            path,
            encoder,
            file: None,
        }
    }

    async fn open(&mut self) -> Result<&mut File, SinkError> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| {
                    SinkError::Unavailable(format!(
                        "failed to open '{}': {}",
                        self.path.display(),
                        e
                    ))
                })?;
            debug!(path = %self.path.display(), "Opened file sink");
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| SinkError::Unavailable("file sink not open".to_string()))
    }
}

#[async_trait]
impl RecordSink for FileSink {
    async fn publish(&mut self, records: &[Record], timeout: Duration) -> Result<(), SinkError> {
        let messages = self.encoder.encode(records);
        let file = self.open().await?;

        let mut written: Vec<usize> = Vec::with_capacity(messages.len());
        let result = tokio::time::timeout(timeout, async {
            for (i, message) in messages.iter().enumerate() {
                file.write_all(&message.payload).await?;
                file.write_all(b"\n").await?;
                written.push(i);
            }
            file.flush().await
        })
        .await;

        let cause = match result {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => {
                // Reopen on the next publish.
                self.file = None;
                SinkError::Unavailable(e.to_string())
            }
            Err(_) => SinkError::Timeout(timeout),
        };
        Err(SinkError::after_progress(
            &messages,
            &written,
            records.len(),
            cause,
        ))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_messages_as_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = FileSink::new(path.clone(), MessageEncoder::new(2, ","));

        let first = vec![Record::new("in", "a"), Record::new("in", "b"), Record::new("in", "c")];
        sink.publish(&first, Duration::from_secs(1)).await.unwrap();
        sink.publish(&[Record::new("in", "d")], Duration::from_secs(1))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a,b\nc\nd\n");
    }

    #[tokio::test]
    async fn test_unwritable_path_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.log");
        let mut sink = FileSink::new(path, MessageEncoder::new(1, ","));

        let err = sink
            .publish(&[Record::new("in", "a")], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }
}
