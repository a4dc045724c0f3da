//! Clean command implementation.
//!
//! Feeds the keys written by `expired-dumper` back to memcached as pipelined
//! `get` commands. memcached unlinks an expired item when it is fetched, so
//! this reclaims the memory without waiting for the LRU to get there.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const KEYS_READ_BUFFER_BYTES: usize = 256 * 1024;
const DRAIN_BUFFER_BYTES: usize = 32 * 1024;
const DRAIN_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Accumulates keys into one `get k1 k2 ...\r\n` command per batch.
pub struct GetBatcher {
    batch_size: usize,
    pending: usize,
    command: Vec<u8>,
}

impl GetBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pending: 0,
            command: b"get".to_vec(),
        }
    }

    /// Adds a key; returns the finished command once the batch is full.
    pub fn push(&mut self, key: &str) -> Option<Vec<u8>> {
        self.command.push(b' ');
        self.command.extend_from_slice(key.as_bytes());
        self.pending += 1;
        if self.pending < self.batch_size {
            return None;
        }
        self.take()
    }

    /// Returns the trailing partial batch, if any.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending == 0 {
            return None;
        }
        self.take()
    }

    fn take(&mut self) -> Option<Vec<u8>> {
        self.pending = 0;
        let mut command = std::mem::replace(&mut self.command, b"get".to_vec());
        command.extend_from_slice(b"\r\n");
        Some(command)
    }
}

/// Sends every whitespace-separated key of `keys` in batches.
///
/// Returns the number of keys sent. A write failure ends the run.
pub async fn send_keys<R, W>(
    keys: R,
    writer: &mut W,
    batch_size: usize,
    sleep_interval: Duration,
) -> anyhow::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut batcher = GetBatcher::new(batch_size);
    let mut checked = 0u64;
    let mut lines = keys.lines();

    while let Some(line) = lines.next_line().await? {
        for key in line.split_whitespace() {
            checked += 1;
            if let Some(command) = batcher.push(key) {
                writer
                    .write_all(&command)
                    .await
                    .context("Connection to memcached broke")?;
                info!("{} keys are checked", checked);
                tokio::time::sleep(sleep_interval).await;
            }
        }
    }

    if let Some(command) = batcher.flush() {
        writer
            .write_all(&command)
            .await
            .context("Connection to memcached broke")?;
    }
    writer.flush().await?;
    Ok(checked)
}

/// Reads and discards whatever memcached sends until `stop` is raised.
fn spawn_drain<R>(mut reader: R, stop: Arc<AtomicBool>) -> JoinHandle<u64>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; DRAIN_BUFFER_BYTES];
        let mut drained = 0u64;
        while !stop.load(Ordering::Relaxed) {
            match tokio::time::timeout(DRAIN_READ_TIMEOUT, reader.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => drained += n as u64,
                Ok(Err(e)) => {
                    debug!("Drain read failed: {}", e);
                    break;
                }
                // timed out, re-check the stop flag
                Err(_) => {}
            }
        }
        drained
    })
}

async fn clean(
    keys_file: &Path,
    port: u16,
    batch_size: usize,
    sleep_interval: Duration,
) -> anyhow::Result<u64> {
    let file = File::open(keys_file)
        .await
        .with_context(|| format!("cannot open {}", keys_file.display()))?;
    let keys = BufReader::with_capacity(KEYS_READ_BUFFER_BYTES, file);

    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .with_context(|| format!("Memcached connect to port {} failed", port))?;
    let (read_half, mut write_half) = stream.into_split();

    let stop = Arc::new(AtomicBool::new(false));
    let drain = spawn_drain(read_half, stop.clone());

    let result = send_keys(keys, &mut write_half, batch_size, sleep_interval).await;

    stop.store(true, Ordering::Relaxed);
    match drain.await {
        Ok(bytes) => debug!("Drained {} response bytes", bytes),
        Err(e) => debug!("Drain task failed: {}", e),
    }
    result
}

/// Purges expired keys from the memcached listening on localhost.
pub fn command_clean(
    expired_keys_file: &Path,
    mc_port: u16,
    clean_batch: usize,
    sleep_interval_ms: u64,
) -> anyhow::Result<()> {
    if clean_batch == 0 {
        bail!("--clean-batch must be greater than 0");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let checked = runtime.block_on(clean(
        expired_keys_file,
        mc_port,
        clean_batch,
        Duration::from_millis(sleep_interval_ms),
    ))?;

    info!("Done! {} keys are checked", checked);
    Ok(())
}
