//! Sequential append-only destination writer.
//!
//! Each destination is owned by a spawned task draining a bounded queue of
//! [`WriteUnit`]s strictly in order. A unit is fully committed before the next
//! one starts: short writes are resubmitted with the remainder. The
//! [`WriteUnit::Close`] sentinel shuts the sink down and ends the task.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, trace};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MergeError, Result};

#[derive(Debug, Clone)]
pub enum WriteUnit {
    /// Payload appended as-is; an empty payload is a no-op.
    Bytes(Arc<Vec<u8>>),
    /// Flush, close the destination and stop draining.
    Close,
}

pub struct OutputWriter {
    path: PathBuf,
    tx: mpsc::Sender<WriteUnit>,
    task: Option<JoinHandle<Result<u64>>>,
}

impl OutputWriter {
    /// Truncates or creates `path` and starts its drain task.
    pub async fn create(path: impl Into<PathBuf>, queue_depth: usize) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|err| MergeError::destination_io(&path, err))?;
        Ok(Self::spawn(path, file, queue_depth))
    }

    /// Starts a drain task over an arbitrary sink; `path` labels diagnostics.
    pub fn spawn<W>(path: impl Into<PathBuf>, sink: W, queue_depth: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let path = path.into();
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let task = tokio::spawn(drain_queue(path.clone(), sink, rx));
        Self {
            path,
            tx,
            task: Some(task),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues a unit behind everything enqueued before it.
    ///
    /// Waits while the queue is full. If the drain task has stopped, its
    /// failure is returned instead.
    pub async fn enqueue(&mut self, unit: WriteUnit) -> Result<()> {
        if self.tx.send(unit).await.is_ok() {
            return Ok(());
        }
        match self.join().await {
            Err(err) => Err(err),
            Ok(_) => Err(MergeError::WriterClosed(self.path.clone())),
        }
    }

    pub async fn write(&mut self, bytes: Arc<Vec<u8>>) -> Result<()> {
        self.enqueue(WriteUnit::Bytes(bytes)).await
    }

    /// Sends the close sentinel and waits for the queue to drain.
    ///
    /// Returns the number of bytes committed to the destination.
    pub async fn close(&mut self) -> Result<u64> {
        // A failed send means the task already stopped; joining reports why.
        let _ = self.tx.send(WriteUnit::Close).await;
        self.join().await
    }

    async fn join(&mut self) -> Result<u64> {
        let task = self
            .task
            .take()
            .ok_or_else(|| MergeError::WriterClosed(self.path.clone()))?;
        task.await
            .map_err(|err| MergeError::WriterTask(err.to_string()))?
    }
}

async fn drain_queue<W>(
    path: PathBuf,
    mut sink: W,
    mut rx: mpsc::Receiver<WriteUnit>,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(unit) = rx.recv().await {
        match unit {
            WriteUnit::Bytes(bytes) => {
                if bytes.is_empty() {
                    continue;
                }
                write_fully(&mut sink, &bytes)
                    .await
                    .map_err(|err| MergeError::destination_io(&path, err))?;
                written += bytes.len() as u64;
            }
            WriteUnit::Close => break,
        }
    }

    sink.shutdown()
        .await
        .map_err(|err| MergeError::destination_io(&path, err))?;
    debug!("closed {} after {} bytes", path.display(), written);
    Ok(written)
}

/// Writes all of `buf`, resubmitting the remainder after short writes.
pub(crate) async fn write_fully<W>(sink: &mut W, mut buf: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while !buf.is_empty() {
        let size = match sink.write(buf).await {
            Ok(size) => size,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "destination accepted no bytes",
            ));
        }
        if size < buf.len() {
            trace!("short write: {} of {} bytes", size, buf.len());
        }
        buf = &buf[size..];
    }
    Ok(())
}
