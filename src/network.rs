//! Streaming interface: line-delimited submissions over a persistent TCP
//! connection.
//!
//! Each line is either a payload (an unsigned integer) or, when it starts
//! with `[`, a JSON chain offered to fork choice. Every connection also gets
//! a timer task that pushes the JSON chain snapshot back at a fixed interval.
//! Lines longer than the configured maximum are discarded unread.

use crate::blockchain::{Chain, ChainStore};
use crate::config::NetworkConfig;
use crate::error::ChainError;
use crate::node::Node;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub const PROMPT: &str = "Enter a new BPM: ";

pub const DEFAULT_MAX_LINE_BYTES: usize = 2 * 1024 * 1024;

/// One parsed line from a streaming client.
#[derive(Debug, PartialEq)]
pub enum Submission {
    Payload(u64),
    Chain(Chain),
    Empty,
    Malformed(String),
}

impl Submission {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Submission::Empty;
        }
        if line.starts_with('[') {
            return match serde_json::from_str::<Chain>(line) {
                Ok(chain) => Submission::Chain(chain),
                Err(e) => Submission::Malformed(format!("invalid chain JSON: {}", e)),
            };
        }
        match line.parse::<u64>() {
            Ok(payload) => Submission::Payload(payload),
            Err(e) => Submission::Malformed(format!("{:?} not a number: {}", line, e)),
        }
    }
}

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

pub struct StreamServer {
    node: Node,
    snapshot_interval: Duration,
    max_line_bytes: usize,
}

impl StreamServer {
    pub fn new(node: Node, snapshot_interval: Duration) -> Self {
        Self {
            node,
            snapshot_interval,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Accept connections until the node shuts down or the listener fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ChainError> {
        let local = listener.local_addr()?;
        info!("streaming interface listening on {}", local);

        loop {
            let (socket, peer) = tokio::select! {
                accepted = listener.accept() => accepted
                    .map_err(|e| ChainError::NetworkError(format!("accept failed: {}", e)))?,
                _ = self.node.stopped() => break,
            };

            let node = self.node.clone();
            let interval = self.snapshot_interval;
            let max_line_bytes = self.max_line_bytes;
            tokio::spawn(async move {
                info!(%peer, "client connected");
                if let Err(e) = handle_connection(node, socket, interval, max_line_bytes).await {
                    warn!(%peer, "connection closed with error: {}", e);
                } else {
                    info!(%peer, "client disconnected");
                }
            });
        }

        info!("streaming interface on {} stopped", local);
        Ok(())
    }
}

/// Bind the configured stream address and serve on it.
pub async fn run_stream_server(node: Node, config: &NetworkConfig) -> Result<(), ChainError> {
    let addr = config.tcp_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ChainError::NetworkError(format!("failed to bind {}: {}", addr, e)))?;
    StreamServer::new(node, config.snapshot_interval())
        .with_max_line_bytes(config.max_line_bytes)
        .serve(listener)
        .await
}

/// A line read under a length cap.
#[derive(Debug, PartialEq)]
enum Line {
    Text(String),
    /// The line exceeded the cap; carries how many bytes were thrown away.
    TooLong(usize),
}

/// Read one `\n`-terminated line of at most `max` bytes. `None` at end of stream.
async fn read_line<R>(reader: &mut R, max: usize) -> io::Result<Option<Line>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader).take(max as u64 + 1).read_until(b'\n', &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max {
        let dropped = buf.len() + discard_line(reader).await?;
        return Ok(Some(Line::TooLong(dropped)));
    }
    Ok(Some(Line::Text(String::from_utf8_lossy(&buf).into_owned())))
}

/// Skip input up to and including the next newline without buffering it.
async fn discard_line<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut dropped = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(dropped);
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(dropped + end + 1);
            }
            None => {
                let len = available.len();
                reader.consume(len);
                dropped += len;
            }
        }
    }
}

async fn handle_connection(
    node: Node,
    socket: TcpStream,
    snapshot_interval: Duration,
    max_line_bytes: usize,
) -> Result<(), ChainError> {
    let peer: Option<SocketAddr> = socket.peer_addr().ok();
    let (reader, writer) = socket.into_split();
    let writer: SharedWriter = Arc::new(Mutex::new(writer));

    write_to(&writer, PROMPT).await?;

    let pusher = tokio::spawn(push_snapshots(node.store().clone(), writer.clone(), snapshot_interval));

    let mut reader = BufReader::new(reader);
    let result = async {
        while let Some(line) = read_line(&mut reader, max_line_bytes).await? {
            let line = match line {
                Line::Text(line) => line,
                Line::TooLong(dropped) => {
                    warn!(?peer, dropped, max_line_bytes, "line too long, discarded");
                    write_to(&writer, &format!("\n{}", PROMPT)).await?;
                    continue;
                }
            };
            match Submission::parse(&line) {
                Submission::Empty => continue,
                Submission::Payload(payload) => match node.submit_payload_async(payload).await {
                    Ok(block) => debug!(?peer, index = block.index, payload, "payload accepted"),
                    Err(e) => warn!(?peer, payload, "payload not appended: {}", e),
                },
                Submission::Chain(chain) => match node.consider_replacement_async(chain).await {
                    Ok(outcome) => debug!(?peer, ?outcome, "competing chain considered"),
                    Err(e) => warn!(?peer, "competing chain rejected: {}", e),
                },
                Submission::Malformed(reason) => warn!(?peer, "{}", reason),
            }
            write_to(&writer, &format!("\n{}", PROMPT)).await?;
        }
        Ok::<(), ChainError>(())
    }
    .await;

    pusher.abort();
    result
}

/// Periodically write the chain snapshot, one JSON document per line.
async fn push_snapshots(store: Arc<ChainStore>, writer: SharedWriter, period: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let output = match serde_json::to_string(&store.snapshot()) {
            Ok(json) => json,
            Err(e) => {
                error!("failed to serialize chain snapshot: {}", e);
                continue;
            }
        };
        if let Err(e) = write_to(&writer, &format!("{}\n", output)).await {
            debug!("snapshot push stopped: {}", e);
            break;
        }
    }
}

async fn write_to(writer: &SharedWriter, text: &str) -> Result<(), ChainError> {
    let mut guard = writer.lock().await;
    guard.write_all(text.as_bytes()).await?;
    guard.flush().await?;
    Ok(())
}
