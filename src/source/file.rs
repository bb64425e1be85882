use super::{Polled, Record, RecordSource, SourceError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tracing::debug;

/// Upper bound on a single EOF wait while following the last file.
const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads newline-delimited records from a list of files, one file after the other.
///
/// Lines are framed on raw bytes, so payloads need not be UTF-8.
/// Each non-empty line becomes one record whose channel is the file path and
/// whose offset is the byte position of the line start. When `follow` is set
/// the last file is tailed instead of ending the stream at EOF.
pub struct FileSource {
    paths: Vec<PathBuf>,
    follow: bool,
    current: usize,
    reader: Option<BufReader<File>>,
    offset: u64,
    line_start: u64,
    pending: Vec<u8>,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>, follow: bool) -> Self {
        Self {
            paths,
            follow,
            current: 0,
            reader: None,
            offset: 0,
            line_start: 0,
            pending: Vec::new(),
        }
    }

    fn on_last_file(&self) -> bool {
        self.current + 1 == self.paths.len()
    }

    fn take_pending(&mut self) -> Option<Record> {
        let mut line = std::mem::take(&mut self.pending);
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            return None;
        }
        let channel = self.paths[self.current].display().to_string();
        Some(Record::new(channel, line).with_offset(self.line_start))
    }
}

#[async_trait]
impl RecordSource for FileSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Polled, SourceError> {
        loop {
            if self.current >= self.paths.len() {
                return Ok(Polled::Closed);
            }

            if self.reader.is_none() {
                let path = &self.paths[self.current];
                let file = File::open(path).await.map_err(|e| {
                    SourceError::Unavailable(format!("failed to open '{}': {}", path.display(), e))
                })?;
                debug!(path = %path.display(), "Opened file source");
                self.offset = 0;
                self.line_start = 0;
                self.reader = Some(BufReader::new(file));
            }
            let Some(reader) = self.reader.as_mut() else {
                continue;
            };

            if self.pending.is_empty() {
                self.line_start = self.offset;
            }
            let bytes_read = reader.read_until(b'\n', &mut self.pending).await?;
            self.offset += bytes_read as u64;

            if bytes_read == 0 {
                if self.follow && self.on_last_file() {
                    // An unterminated line stays pending until its newline arrives.
                    sleep(timeout.min(FOLLOW_POLL_INTERVAL)).await;
                    return Ok(Polled::Empty);
                }

                let last = self.take_pending();
                self.reader = None;
                self.current += 1;
                if let Some(record) = last {
                    return Ok(Polled::Record(record));
                }
                continue;
            }

            if self.pending.last() == Some(&b'\n') {
                if let Some(record) = self.take_pending() {
                    return Ok(Polled::Record(record));
                }
            }
        }
    }

    fn describe(&self) -> String {
        let paths: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        format!("file:{}", paths.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn drain(source: &mut FileSource) -> Vec<Record> {
        let mut records = Vec::new();
        loop {
            match source.poll(Duration::from_millis(10)).await.unwrap() {
                Polled::Record(record) => records.push(record),
                Polled::Empty => continue,
                Polled::Closed => return records,
            }
        }
    }

    #[tokio::test]
    async fn test_reads_lines_with_offsets() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "cyber test 1").unwrap();
        writeln!(temp_file).unwrap();
        write!(temp_file, "cyber test 2").unwrap();
        temp_file.flush().unwrap();

        let mut source = FileSource::new(vec![temp_file.path().to_path_buf()], false);
        let records = drain(&mut source).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload_str(), Some("cyber test 1"));
        assert_eq!(records[0].offset, Some(0));
        assert_eq!(records[1].payload_str(), Some("cyber test 2"));
        assert_eq!(records[1].offset, Some(14));
        assert_eq!(records[0].channel, temp_file.path().display().to_string());
    }

    #[tokio::test]
    async fn test_binary_line_kept_as_record() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"good1\n\xff\xfe binary\ngood2\n").unwrap();
        temp_file.flush().unwrap();

        let mut source = FileSource::new(vec![temp_file.path().to_path_buf()], false);
        let records = drain(&mut source).await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].payload_str(), Some("good1"));
        assert_eq!(records[0].offset, Some(0));
        assert_eq!(&records[1].payload[..], b"\xff\xfe binary");
        assert_eq!(records[1].payload_str(), None);
        assert_eq!(records[1].offset, Some(6));
        assert_eq!(records[2].payload_str(), Some("good2"));
        assert_eq!(records[2].offset, Some(16));
    }

    #[tokio::test]
    async fn test_multiple_files_read_in_order() {
        let mut first = NamedTempFile::new().unwrap();
        writeln!(first, "a1").unwrap();
        writeln!(first, "a2").unwrap();
        let mut second = NamedTempFile::new().unwrap();
        writeln!(second, "b1").unwrap();

        let mut source = FileSource::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            false,
        );
        let payloads: Vec<String> = drain(&mut source)
            .await
            .iter()
            .map(|r| r.payload_str().unwrap().to_string())
            .collect();
        assert_eq!(payloads, vec!["a1", "a2", "b1"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let mut source = FileSource::new(vec![PathBuf::from("/nonexistent/input.log")], false);
        let err = source.poll(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_follow_waits_for_complete_lines() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "first").unwrap();
        write!(temp_file, "sec").unwrap();
        temp_file.flush().unwrap();

        let mut source = FileSource::new(vec![temp_file.path().to_path_buf()], true);
        match source.poll(Duration::from_millis(10)).await.unwrap() {
            Polled::Record(record) => assert_eq!(record.payload_str(), Some("first")),
            other => panic!("expected a record, got {:?}", other),
        }
        assert!(matches!(
            source.poll(Duration::from_millis(10)).await.unwrap(),
            Polled::Empty
        ));

        writeln!(temp_file, "ond").unwrap();
        temp_file.flush().unwrap();
        match source.poll(Duration::from_millis(10)).await.unwrap() {
            Polled::Record(record) => {
                assert_eq!(record.payload_str(), Some("second"));
                assert_eq!(record.offset, Some(6));
            }
            other => panic!("expected a record, got {:?}", other),
        }
    }
}
