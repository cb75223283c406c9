//! The durable on-disk tier: a length-prefixed, optionally-compressed append log plus a
//! 24-byte `state.bin` tracking read/write offsets (§4.3, §4.4).

use crate::buffer::codec::{decode_message, encode_message, CodecError, RecordHeader, RECORD_HEADER_LEN};
use crate::buffer::compression::{compress_for_write, Compression, CompressionError};
use crate::message::Message;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const BOUND_POLL_INTERVAL: Duration = Duration::from_millis(10);

const STATE_LEN: usize = 24;

#[derive(Debug)]
pub enum FileBufferError {
    Io(String),
    Corrupt(String),
}

impl std::fmt::Display for FileBufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileBufferError::Io(msg) => write!(f, "file buffer io error: {}", msg),
            FileBufferError::Corrupt(msg) => write!(f, "file buffer corrupt: {}", msg),
        }
    }
}

impl std::error::Error for FileBufferError {}

impl From<io::Error> for FileBufferError {
    fn from(e: io::Error) -> Self {
        FileBufferError::Io(e.to_string())
    }
}

impl From<CodecError> for FileBufferError {
    fn from(e: CodecError) -> Self {
        FileBufferError::Corrupt(e.0)
    }
}

impl From<CompressionError> for FileBufferError {
    fn from(e: CompressionError) -> Self {
        FileBufferError::Corrupt(e.0)
    }
}

/// Persistent cursor state: produce count, consume count, read offset. 3 `u64`s, 24 bytes.
///
/// `read_offset` is the only byte position tracked — the log is opened in append mode, so
/// writes always land at EOF and need no write cursor of their own. `consume_count` is always
/// `<= produce_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct State {
    produce_count: u64,
    consume_count: u64,
    read_offset: u64,
}

impl State {
    fn encode(&self) -> [u8; STATE_LEN] {
        let mut out = [0u8; STATE_LEN];
        out[0..8].copy_from_slice(&self.produce_count.to_le_bytes());
        out[8..16].copy_from_slice(&self.consume_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.read_offset.to_le_bytes());
        out
    }

    fn decode(buf: &[u8]) -> Result<Self, FileBufferError> {
        if buf.len() != STATE_LEN {
            return Err(FileBufferError::Corrupt(format!("state.bin has {} bytes, want {}", buf.len(), STATE_LEN)));
        }
        Ok(Self {
            produce_count: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            consume_count: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            read_offset: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
        })
    }
}

struct Inner {
    log: File,
    state_file: File,
    state: State,
}

/// A durable append-only message log backed by `messages.log` + `state.bin` in `dir`.
///
/// All I/O runs synchronously inside `spawn_blocking` tasks so the tokio reactor never
/// blocks on disk. Every append and every read-offset advance is followed by an `fsync` of
/// both files: a crash between data and state writes must never silently lose or replay a
/// record.
pub struct FileBuffer {
    dir: PathBuf,
    compression: Option<Compression>,
    /// Maximum `produce_count - consume_count` before `append` blocks. `0` means unbounded.
    bound: u64,
    inner: Mutex<Inner>,
}

impl FileBuffer {
    pub fn open(dir: impl AsRef<Path>, compression: Option<Compression>, bound: u64) -> Result<Self, FileBufferError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let log_path = dir.join("messages.log");
        let state_path = dir.join("state.bin");

        let log = OpenOptions::new().create(true).read(true).append(true).open(&log_path)?;
        let mut state_file = OpenOptions::new().create(true).read(true).write(true).open(&state_path)?;

        let mut state_bytes = Vec::new();
        state_file.read_to_end(&mut state_bytes)?;
        let state = if state_bytes.is_empty() {
            let state = State::default();
            state_file.write_all(&state.encode())?;
            state_file.sync_all()?;
            state
        } else {
            State::decode(&state_bytes)?
        };

        Ok(Self { dir, compression, bound, inner: Mutex::new(Inner { log, state_file, state }) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one message. If `bound > 0` and the backlog (`produce_count - consume_count`)
    /// is already at or over the bound, blocks, polling every 10ms, until a consumer catches
    /// up. Intended to run inside `spawn_blocking`, where a thread sleep is cheap.
    pub fn append(&self, message: &Message) -> Result<(), FileBufferError> {
        let uncompressed = encode_message(message);
        let (algorithm, on_disk) = compress_for_write(self.compression, &uncompressed)?;
        let header = RecordHeader {
            algorithm_tag: algorithm.tag(),
            uncompressed_size: uncompressed.len() as u32,
            data_len: on_disk.len() as u32,
        };

        let mut inner = loop {
            let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if self.bound == 0 || inner.state.produce_count - inner.state.consume_count < self.bound {
                break inner;
            }
            drop(inner);
            std::thread::sleep(BOUND_POLL_INTERVAL);
        };

        inner.log.write_all(&header.encode())?;
        inner.log.write_all(&on_disk)?;
        inner.log.sync_all()?;

        inner.state.produce_count += 1;
        inner.state_file.seek(SeekFrom::Start(0))?;
        inner.state_file.write_all(&inner.state.encode())?;
        inner.state_file.sync_all()?;

        Ok(())
    }

    /// Read the next unread message, advancing and persisting the read offset. `Ok(None)`
    /// means the consume cursor has caught up to the produce cursor.
    pub fn read_next(&self) -> Result<Option<Message>, FileBufferError> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if inner.state.consume_count >= inner.state.produce_count {
            return Ok(None);
        }

        let mut header_buf = [0u8; RECORD_HEADER_LEN];
        inner.log.seek(SeekFrom::Start(inner.state.read_offset))?;
        inner.log.read_exact(&mut header_buf)?;
        let header = RecordHeader::decode(&header_buf)?;

        let mut data = vec![0u8; header.data_len as usize];
        inner.log.read_exact(&mut data)?;

        let algorithm = Compression::from_tag(header.algorithm_tag)
            .ok_or_else(|| FileBufferError::Corrupt(format!("unknown compression tag {}", header.algorithm_tag)))?;
        let uncompressed = algorithm.decompress(&data, header.uncompressed_size as usize)?;
        let message = decode_message(&uncompressed)?;

        inner.state.read_offset += (RECORD_HEADER_LEN + data.len()) as u64;
        inner.state.consume_count += 1;
        inner.state_file.seek(SeekFrom::Start(0))?;
        inner.state_file.write_all(&inner.state.encode())?;
        inner.state_file.sync_all()?;

        Ok(Some(message))
    }

    /// Whether every appended record has been read back.
    pub fn is_drained(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state.consume_count >= inner.state.produce_count
    }

    /// Total records ever appended (`produce_count`).
    pub fn record_count(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).state.produce_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Operation;
    use std::sync::Arc;

    fn sample(id: &str) -> Message {
        Message { id: id.into(), operation: Some(Operation::Update), payload: vec![1, 2, 3], ..Default::default() }
    }

    #[test]
    fn appends_and_reads_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let buf = FileBuffer::open(dir.path(), None, 0).unwrap();
        buf.append(&sample("a")).unwrap();
        buf.append(&sample("b")).unwrap();

        assert_eq!(buf.read_next().unwrap().unwrap().id, "a");
        assert_eq!(buf.read_next().unwrap().unwrap().id, "b");
        assert!(buf.read_next().unwrap().is_none());
        assert!(buf.is_drained());
    }

    #[test]
    fn survives_reopen_and_resumes_cursor() {
        let dir = tempfile::tempdir().unwrap();
        {
            let buf = FileBuffer::open(dir.path(), None, 0).unwrap();
            buf.append(&sample("a")).unwrap();
            buf.append(&sample("b")).unwrap();
            assert_eq!(buf.read_next().unwrap().unwrap().id, "a");
        }
        let reopened = FileBuffer::open(dir.path(), None, 0).unwrap();
        assert_eq!(reopened.read_next().unwrap().unwrap().id, "b");
        assert!(reopened.is_drained());
    }

    #[test]
    fn round_trips_with_compression() {
        let dir = tempfile::tempdir().unwrap();
        let buf = FileBuffer::open(dir.path(), Some(Compression::Lz4), 0).unwrap();
        let big = Message { id: "big".into(), payload: vec![9u8; 4096], ..Default::default() };
        buf.append(&big).unwrap();
        let back = buf.read_next().unwrap().unwrap();
        assert_eq!(back.payload, big.payload);
    }

    #[test]
    fn record_count_tracks_appends() {
        let dir = tempfile::tempdir().unwrap();
        let buf = FileBuffer::open(dir.path(), None, 0).unwrap();
        buf.append(&sample("a")).unwrap();
        buf.append(&sample("b")).unwrap();
        assert_eq!(buf.record_count(), 2);
    }

    #[test]
    fn append_blocks_past_bound_until_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let buf = Arc::new(FileBuffer::open(dir.path(), None, 1).unwrap());
        buf.append(&sample("a")).unwrap();

        let waiter = buf.clone();
        let handle = std::thread::spawn(move || {
            waiter.append(&sample("b")).unwrap();
        });

        std::thread::sleep(std::time::Duration::from_millis(40));
        assert!(!handle.is_finished(), "append should block while backlog is at the bound");

        assert_eq!(buf.read_next().unwrap().unwrap().id, "a");
        handle.join().unwrap();
        assert_eq!(buf.record_count(), 2);
    }
}
