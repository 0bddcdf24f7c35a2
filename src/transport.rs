//! Connection to the worker farm and the event loop that drives the
//! [`Dispatcher`].
//!
//! The loop owns the dispatcher outright: one inbound chunk is parsed,
//! scheduled and answered before the next read, so no locking is needed.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{DispatcherConfig, SchedulerConfig};
use crate::error::{DispatchError, Result};
use crate::protocol::{self, LineBuffer, STATUS_REQUEST};
use crate::scheduler::Dispatcher;

const READ_BUFFER_SIZE: usize = 4096;

/// Connect to the configured endpoint and serve until cancelled.
pub async fn run(config: DispatcherConfig, shutdown: CancellationToken) -> Result<()> {
    let endpoint = config.endpoint();
    let stream = TcpStream::connect(&endpoint).await?;
    stream.set_nodelay(true)?;
    tracing::info!(endpoint = %endpoint, "Connected to worker farm");

    let mut session = Session::handshake(stream, config.scheduler).await?;
    if let Some(interval) = config.status_interval {
        session = session.with_status_interval(interval);
    }
    session.run(shutdown).await
}

/// A handshaken connection plus the engine it feeds.
pub struct Session<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    lines: LineBuffer,
    dispatcher: Dispatcher,
    status_interval: Option<Duration>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Read the worker list and build the dispatcher from it.
    ///
    /// Bytes that follow the handshake line in the same chunk are kept and
    /// processed as the first batch.
    pub async fn handshake(stream: S, config: SchedulerConfig) -> Result<Self> {
        let (mut reader, writer) = tokio::io::split(stream);

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(DispatchError::Handshake(
                "connection closed before worker list".to_string(),
            ));
        }
        let chunk = &buf[..n];
        let (head, rest) = match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => (&chunk[..pos], &chunk[pos + 1..]),
            None => (chunk, &[][..]),
        };

        let servers = protocol::parse_handshake(head)?;
        tracing::info!(servers = ?servers, "Received worker list");
        let dispatcher = Dispatcher::new(servers, config)?;

        let mut session = Self {
            reader,
            writer,
            lines: LineBuffer::new(),
            dispatcher,
            status_interval: None,
        };
        let early = session.lines.push(rest);
        session.handle_lines(early).await?;
        Ok(session)
    }

    /// Periodically ask the farm to print its status and log our own view.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = Some(interval);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve until `shutdown` is cancelled or the connection fails.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut status = self.status_interval.map(|period| {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let result = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, closing connection");
                    break Ok(());
                }
                read = self.reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => break Err(DispatchError::ConnectionClosed),
                        Ok(n) => n,
                        Err(e) => break Err(e.into()),
                    };
                    let lines = self.lines.push(&buf[..n]);
                    if let Err(e) = self.handle_lines(lines).await {
                        break Err(e);
                    }
                }
                _ = next_tick(&mut status) => {
                    if let Err(e) = self.report_status().await {
                        break Err(e);
                    }
                }
            }
        };

        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "Error while closing connection");
        }
        result
    }

    async fn handle_lines(&mut self, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        tracing::debug!(records = lines.len(), "Received batch");

        let events = protocol::parse_batch(&lines);
        let assignments = self.dispatcher.process_batch(events, Instant::now());
        if assignments.is_empty() {
            return Ok(());
        }

        let payload = protocol::encode_assignments(&assignments);
        self.writer.write_all(payload.as_bytes()).await?;
        self.writer.flush().await?;
        tracing::debug!(assignments = assignments.len(), "Sent assignments");
        Ok(())
    }

    async fn report_status(&mut self) -> Result<()> {
        match serde_json::to_string(&self.dispatcher.snapshot()) {
            Ok(snapshot) => tracing::info!(%snapshot, "Dispatcher status"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize status"),
        }
        self.writer.write_all(STATUS_REQUEST.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
