//! Object reads over persistent `git cat-file` batch processes.
//!
//! The batch protocol is a single request/response conversation on one pair
//! of pipes. Every read holds the channel slot for its whole exchange;
//! [`BlobStream`] keeps holding it until the blob has been drained.

use crate::cache::{CacheStats, ObjectCache};
use crate::{DatabaseRef, Object, ObjectKind, OdbError, Result, Tree};
use bytes::Bytes;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use plumbline_core::{ObjectHeader, ObjectId, ObjectType};
use plumbline_parse::{
    BatchHeader, BatchMode, BatchParser, BatchResponse, RecordReader, TreeEntry,
};
use plumbline_process::{Command, Process, Redirect};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{ChildStdin, ChildStdout};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One running `cat-file` process and its pipes.
struct BatchChannel {
    mode: BatchMode,
    process: Process,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    chunk_size: usize,
}

impl BatchChannel {
    fn start(command: &Command, mode: BatchMode) -> Result<Self> {
        let flag = match mode {
            BatchMode::Contents => "--batch",
            BatchMode::Check => "--batch-check",
        };
        let process = command.process(["cat-file", flag])?;
        process.stdin(Redirect::Piped)?;
        process.on_stderr(|output| warn!(line = %output.line, "cat-file stderr"))?;
        process.start()?;

        let stdin = process.take_stdin().ok_or(OdbError::ChannelClosed)?;
        let stdout = process.take_stdout().ok_or(OdbError::ChannelClosed)?;
        let chunk_size = command.config().chunk_size;
        info!(pid = process.id(), mode = flag, "started batch process");

        Ok(Self {
            mode,
            process,
            stdin: Some(stdin),
            stdout: BufReader::with_capacity(chunk_size.max(1), stdout),
            chunk_size,
        })
    }

    fn request(&mut self, spec: &str) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(OdbError::ChannelClosed)?;
        let mut line = Vec::with_capacity(spec.len() + 1);
        line.extend_from_slice(spec.as_bytes());
        line.push(b'\n');
        stdin.write_all(&line)?;
        stdin.flush()?;
        Ok(())
    }

    /// Reads exactly `count` responses.
    fn responses(&mut self, count: usize) -> Result<Vec<BatchResponse>> {
        let responses = RecordReader::new(&mut self.stdout)
            .with_chunk_size(self.chunk_size)
            .read_records(BatchParser::new(self.mode), count)?;
        if responses.len() < count {
            return Err(OdbError::ChannelClosed);
        }
        Ok(responses)
    }

    fn response(&mut self, spec: &str) -> Result<BatchResponse> {
        self.request(spec)?;
        self.responses(1)?
            .into_iter()
            .next()
            .ok_or(OdbError::ChannelClosed)
    }

    /// Closes stdin so the process sees EOF, then waits for it to exit.
    fn shutdown(mut self, timeout: Duration) {
        drop(self.stdin.take());
        match self.process.wait_for_exit(Some(timeout)) {
            Ok(true) => debug!(pid = self.process.id(), "batch process exited"),
            Ok(false) => {
                warn!(pid = self.process.id(), "batch process did not exit, killing");
                if let Err(e) = self.process.kill() {
                    warn!(error = %e, "failed to kill batch process");
                }
            }
            Err(e) => debug!(error = %e, "batch process already gone"),
        }
    }
}

/// State guarded by the channel slot.
pub(crate) struct BatchState {
    disposed: bool,
    contents: Option<BatchChannel>,
    check: Option<BatchChannel>,
}

impl BatchState {
    /// Runs `f` on the channel for `mode`, starting it on first use.
    ///
    /// Any error leaves the conversation in an unknown position, so the
    /// channel is torn down and restarted by the next call.
    fn with_channel<T>(
        &mut self,
        command: &Command,
        mode: BatchMode,
        f: impl FnOnce(&mut BatchChannel) -> Result<T>,
    ) -> Result<T> {
        if self.disposed {
            return Err(OdbError::Disposed);
        }
        let slot = match mode {
            BatchMode::Contents => &mut self.contents,
            BatchMode::Check => &mut self.check,
        };
        if slot.is_none() {
            *slot = Some(BatchChannel::start(command, mode)?);
        }
        let result = match slot.as_mut() {
            Some(channel) => f(channel),
            None => Err(OdbError::ChannelClosed),
        };
        if result.is_err() {
            if let Some(channel) = slot.take() {
                channel.shutdown(command.config().exit_timeout());
            }
        }
        result
    }

    fn contents_channel(&mut self) -> io::Result<&mut BatchChannel> {
        self.contents
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "batch channel closed"))
    }
}

pub(crate) struct Shared {
    command: Command,
    slot: Arc<Mutex<BatchState>>,
    cache: ObjectCache,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // A live BlobStream keeps the slot; its channel is torn down when the
        // stream releases the last reference.
        let Some(mut state) = self.slot.try_lock() else {
            return;
        };
        let timeout = self.command.config().exit_timeout();
        for channel in [state.contents.take(), state.check.take()].into_iter().flatten() {
            channel.shutdown(timeout);
        }
    }
}

/// Reads objects through lazily started `cat-file --batch` and
/// `cat-file --batch-check` processes.
///
/// Clones share the same processes, cache and channel slot. Concurrent
/// callers are served one at a time in lock order.
#[derive(Clone)]
pub struct ObjectDatabase {
    shared: Arc<Shared>,
}

impl ObjectDatabase {
    /// Creates a database. No process is started until the first read.
    pub fn new(command: Command) -> Self {
        let cache = ObjectCache::new(command.config().cache_capacity);
        Self {
            shared: Arc::new(Shared {
                command,
                slot: Arc::new(Mutex::new(BatchState {
                    disposed: false,
                    contents: None,
                    check: None,
                })),
                cache,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn owner(&self) -> DatabaseRef {
        DatabaseRef::new(Arc::downgrade(&self.shared))
    }

    fn exchange(&self, mode: BatchMode, spec: &str) -> Result<BatchResponse> {
        let mut state = self.shared.slot.lock();
        state.with_channel(&self.shared.command, mode, |channel| channel.response(spec))
    }

    /// Reads `id` as a `T`.
    pub fn read_object<T: ObjectKind>(&self, id: &ObjectId) -> Result<T> {
        if let Some(object) = self.shared.cache.get(id) {
            return object.into_kind();
        }
        let (header, payload) = self
            .read_payload(&id.to_hex(), "read_object", Some(*id), Some(T::TYPE))?
            .ok_or_else(|| OdbError::ObjectNotFound(id.to_hex()))?;
        if header.object_type != T::TYPE {
            return Err(OdbError::TypeMismatch {
                id: *id,
                expected: T::TYPE,
                actual: header.object_type,
            });
        }
        let value = T::from_payload(header, payload, &self.owner())
            .map_err(|e| e.with_context("read_object", Some(*id), Some(T::TYPE)))?;
        let object = value.clone().into_object();
        self.shared.cache.put(&object);
        Ok(value)
    }

    /// Reads `id` as whatever type git reports.
    pub fn read(&self, id: &ObjectId) -> Result<Object> {
        if let Some(object) = self.shared.cache.get(id) {
            return Ok(object);
        }
        let (header, payload) = self
            .read_payload(&id.to_hex(), "read", Some(*id), None)?
            .ok_or_else(|| OdbError::ObjectNotFound(id.to_hex()))?;
        self.decode(header, payload, "read")
    }

    /// Reads the header of `id`, or of `path` inside the tree-ish `id`.
    ///
    /// Returns `None` when git reports the object missing.
    pub fn read_object_header(&self, id: &ObjectId, path: Option<&str>) -> Result<Option<ObjectHeader>> {
        let spec = object_spec(id, path);
        let response = self
            .exchange(BatchMode::Check, &spec)
            .map_err(|e| in_context(e, "read_object_header", Some(*id), None))?;
        match response {
            BatchResponse::Found { header, .. } => Ok(Some(header)),
            BatchResponse::Missing(_) => Ok(None),
            BatchResponse::Ambiguous(_) => Err(OdbError::Ambiguous(spec)),
        }
    }

    /// Reads the tree at `path` inside the tree-ish `id`.
    pub fn read_tree_at(&self, id: &ObjectId, path: &str) -> Result<Option<Tree>> {
        let spec = object_spec(id, Some(path));
        let Some((header, payload)) =
            self.read_payload(&spec, "read_tree_at", Some(*id), Some(ObjectType::Tree))?
        else {
            return Ok(None);
        };
        if let Some(object) = self.shared.cache.get(&header.id) {
            return object.into_kind().map(Some);
        }
        if header.object_type != ObjectType::Tree {
            return Err(OdbError::TypeMismatch {
                id: header.id,
                expected: ObjectType::Tree,
                actual: header.object_type,
            });
        }
        self.decode(header, payload, "read_tree_at")?
            .into_kind()
            .map(Some)
    }

    /// Reads the tree `id` keeping only entries that match `filter`.
    pub fn read_filtered_tree<F>(&self, id: &ObjectId, filter: F) -> Result<Tree>
    where
        F: FnMut(&TreeEntry) -> bool,
    {
        Ok(self.read_object::<Tree>(id)?.filtered(filter))
    }

    /// Opens a streaming reader over the blob `id`.
    ///
    /// The returned stream holds the channel slot: other reads on this
    /// database block until it is drained or dropped.
    pub fn stream_blob(&self, id: &ObjectId) -> Result<BlobStream> {
        let mut guard = Mutex::lock_arc(&self.shared.slot);
        let spec = id.to_hex();
        let header = guard.with_channel(&self.shared.command, BatchMode::Contents, |channel| {
            channel.request(&spec)?;
            let mut line = Vec::new();
            channel.stdout.read_until(b'\n', &mut line)?;
            if line.pop() != Some(b'\n') {
                return Err(OdbError::ChannelClosed);
            }
            let header = BatchHeader::parse(&line, 0)
                .map_err(|e| e.with_context("stream_blob", Some(*id), Some(ObjectType::Blob)))?;
            if let BatchHeader::Found(header) = &header {
                if header.object_type != ObjectType::Blob {
                    // Skip the payload so the next request starts on a fresh line.
                    let skipped = io::copy(
                        &mut (&mut channel.stdout).take(header.size + 1),
                        &mut io::sink(),
                    )?;
                    if skipped != header.size + 1 {
                        return Err(OdbError::ChannelClosed);
                    }
                }
            }
            Ok(header)
        })?;
        let header = match header {
            BatchHeader::Found(header) if header.object_type == ObjectType::Blob => header,
            BatchHeader::Found(header) => {
                return Err(OdbError::TypeMismatch {
                    id: *id,
                    expected: ObjectType::Blob,
                    actual: header.object_type,
                })
            }
            BatchHeader::Missing(_) => return Err(OdbError::ObjectNotFound(spec)),
            BatchHeader::Ambiguous(_) => return Err(OdbError::Ambiguous(spec)),
        };
        debug!(id = %header.id, size = header.size, "streaming blob");
        Ok(BlobStream {
            guard,
            header,
            remaining: header.size,
            finished: false,
            poisoned: false,
        })
    }

    /// Reads many objects with one pipelined batch exchange.
    ///
    /// Cached objects are served without a request. Missing objects yield
    /// `None` at their position.
    pub fn read_many(&self, ids: &[ObjectId]) -> Result<Vec<Option<Object>>> {
        let mut results: Vec<Option<Object>> = Vec::with_capacity(ids.len());
        let mut uncached = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let cached = self.shared.cache.get(id);
            if cached.is_none() {
                uncached.push(i);
            }
            results.push(cached);
        }
        if uncached.is_empty() {
            return Ok(results);
        }

        let mut requests = Vec::with_capacity(uncached.len() * 41);
        for &i in &uncached {
            requests.extend_from_slice(ids[i].to_hex().as_bytes());
            requests.push(b'\n');
        }

        let responses = {
            let mut state = self.shared.slot.lock();
            state.with_channel(&self.shared.command, BatchMode::Contents, |channel| {
                pipelined(channel, &requests, uncached.len())
            })
            .map_err(|e| in_context(e, "read_many", None, None))?
        };

        let owner = self.owner();
        for (&i, response) in uncached.iter().zip(responses) {
            results[i] = match response {
                BatchResponse::Found {
                    header,
                    content: Some(payload),
                } => {
                    let object = Object::from_payload(header, payload, &owner).map_err(|e| {
                        e.with_context("read_many", Some(header.id), Some(header.object_type))
                    })?;
                    self.shared.cache.put(&object);
                    Some(object)
                }
                BatchResponse::Missing(_) => None,
                BatchResponse::Found { content: None, .. } => return Err(OdbError::ChannelClosed),
                BatchResponse::Ambiguous(name) => return Err(OdbError::Ambiguous(name.to_string())),
            };
        }
        Ok(results)
    }

    /// Cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Drops every cached object.
    pub fn clear_cache(&self) {
        self.shared.cache.clear();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.shared.slot.lock().disposed
    }

    /// Stops the batch processes. Later reads fail with [`OdbError::Disposed`].
    ///
    /// Waits for an outstanding [`BlobStream`] to be dropped first.
    pub fn dispose(&self) {
        let mut state = self.shared.slot.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        let timeout = self.shared.command.config().exit_timeout();
        for channel in [state.contents.take(), state.check.take()].into_iter().flatten() {
            channel.shutdown(timeout);
        }
        self.shared.cache.clear();
        info!("object database disposed");
    }

    fn read_payload(
        &self,
        spec: &str,
        operation: &'static str,
        id: Option<ObjectId>,
        requested: Option<ObjectType>,
    ) -> Result<Option<(ObjectHeader, Bytes)>> {
        let response = self
            .exchange(BatchMode::Contents, spec)
            .map_err(|e| in_context(e, operation, id, requested))?;
        match response {
            BatchResponse::Found {
                header,
                content: Some(payload),
            } => Ok(Some((header, payload))),
            BatchResponse::Found { content: None, .. } => Err(OdbError::ChannelClosed),
            BatchResponse::Missing(_) => Ok(None),
            BatchResponse::Ambiguous(_) => Err(OdbError::Ambiguous(spec.to_string())),
        }
    }

    fn decode(&self, header: ObjectHeader, payload: Bytes, operation: &'static str) -> Result<Object> {
        let object = Object::from_payload(header, payload, &self.owner())
            .map_err(|e| e.with_context(operation, Some(header.id), Some(header.object_type)))?;
        self.shared.cache.put(&object);
        Ok(object)
    }
}

impl std::fmt::Debug for ObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDatabase")
            .field("command", &self.shared.command)
            .field("cache", &self.shared.cache.stats())
            .finish()
    }
}

/// Writes `requests` on a helper thread while reading `count` responses, so
/// neither side of the pipe pair can fill up and stall the other.
fn pipelined(channel: &mut BatchChannel, requests: &[u8], count: usize) -> Result<Vec<BatchResponse>> {
    let BatchChannel {
        mode,
        process,
        stdin,
        stdout,
        chunk_size,
    } = channel;
    let stdin = stdin.as_mut().ok_or(OdbError::ChannelClosed)?;

    thread::scope(|scope| {
        let writer = scope.spawn(move || {
            stdin.write_all(requests)?;
            stdin.flush()
        });

        let read = RecordReader::new(&mut *stdout)
            .with_chunk_size(*chunk_size)
            .read_records(BatchParser::new(*mode), count);
        if read.is_err() {
            // Unblock the writer before joining it.
            if let Err(e) = process.kill() {
                warn!(error = %e, "failed to kill batch process");
            }
        }
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("batch writer panicked")));

        let responses = read.map_err(OdbError::from)?;
        written?;
        if responses.len() < count {
            return Err(OdbError::ChannelClosed);
        }
        Ok(responses)
    })
}

/// Attaches caller context to a parse failure from a batch exchange.
fn in_context(
    error: OdbError,
    operation: &'static str,
    id: Option<ObjectId>,
    requested: Option<ObjectType>,
) -> OdbError {
    match error {
        OdbError::Parse(e) => OdbError::Parse(e.with_context(operation, id, requested)),
        other => other,
    }
}

fn object_spec(id: &ObjectId, path: Option<&str>) -> String {
    match path {
        Some(path) if !path.is_empty() => format!("{id}:{path}"),
        _ => id.to_hex(),
    }
}

/// Streaming reader over one blob's content.
///
/// Holds the batch channel slot until dropped. Dropping before the end
/// drains the remaining bytes so the channel stays usable.
pub struct BlobStream {
    guard: ArcMutexGuard<RawMutex, BatchState>,
    header: ObjectHeader,
    remaining: u64,
    finished: bool,
    poisoned: bool,
}

impl BlobStream {
    /// Header of the blob being streamed.
    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Consumes the newline that terminates every batch payload.
    fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        let mut newline = [0u8; 1];
        self.guard.contents_channel()?.stdout.read_exact(&mut newline)?;
        if newline[0] != b'\n' {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "missing newline after blob payload",
            ));
        }
        self.finished = true;
        Ok(())
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            self.finish()?;
            return Ok(0);
        }
        let limit = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(buf.len());
        let read = self.guard.contents_channel()?.stdout.read(&mut buf[..limit])?;
        if read == 0 && limit > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "batch process closed mid-blob",
            ));
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

impl Read for BlobStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "blob stream failed earlier"));
        }
        let result = self.read_inner(buf);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }
}

impl Drop for BlobStream {
    fn drop(&mut self) {
        if !self.poisoned && !self.finished {
            let mut scratch = [0u8; 8192];
            loop {
                match self.read(&mut scratch) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "failed draining blob stream");
                        break;
                    }
                }
            }
        }
        if self.poisoned {
            if let Some(channel) = self.guard.contents.take() {
                channel.shutdown(Duration::from_secs(1));
            }
        }
    }
}

impl std::fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream")
            .field("header", &self.header)
            .field("remaining", &self.remaining)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_spec() {
        let id = ObjectId::from_bytes([0xab; 20]);
        assert_eq!(object_spec(&id, None), id.to_hex());
        assert_eq!(object_spec(&id, Some("")), id.to_hex());
        assert_eq!(object_spec(&id, Some("src/lib.rs")), format!("{}:src/lib.rs", id.to_hex()));
    }
}
