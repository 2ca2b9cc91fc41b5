//! Connection worker for a kismet server.
//!
//! This module owns the TCP connection to the kismet server: it enables
//! the CLISRC and SOURCE protocols at startup, reads sentences line by
//! line, feeds them through the aggregator, and delivers completed
//! batches to the configured listener factory. A connection can be
//! terminated externally through its [`ReleaseHandle`].

use std::io;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::aggregator::Aggregator;
use crate::config::ActivationConfig;
use crate::delivery::{ListenerFactory, deliver};
use crate::sentence::{ParseError, parse_sentence};
use crate::stats::ConnectionStats;

/// Conditions that terminate a connection.
///
/// All of them are connection-fatal: the read loop exits and no retry
/// is attempted. Re-establishing the connection is the host's decision.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection")]
    EndOfStream,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Terminates a running [`ServerConnection`] from outside.
///
/// `release` is idempotent and never fails; a blocked read observes the
/// release and the worker exits without an error reaching the caller.
/// Dropping every handle for a connection releases it as well, so an
/// abandoned registration cannot leak its worker.
#[derive(Debug, Clone)]
pub struct ReleaseHandle {
    tx: watch::Sender<bool>,
}

impl ReleaseHandle {
    /// Ask the connection worker to stop. Safe to call more than once,
    /// and safe to call after the worker has already terminated.
    pub fn release(&self) {
        let _ = self.tx.send(true);
    }
}

/// A single connection to a kismet server.
///
/// Constructed with [`ServerConnection::establish`], then driven by
/// [`ServerConnection::run`] on a task supplied by the host. Exactly one
/// connection exists per activated listener registration.
pub struct ServerConnection {
    config: ActivationConfig,
    factory: Arc<dyn ListenerFactory>,
    stats: Arc<ConnectionStats>,
    stream: TcpStream,
    release_rx: watch::Receiver<bool>,
}

impl ServerConnection {
    /// Open the TCP connection to the configured kismet server.
    ///
    /// Connection establishment failures surface here, synchronously to
    /// the caller; no worker is produced in that case.
    pub async fn establish(
        config: ActivationConfig,
        factory: Arc<dyn ListenerFactory>,
        stats: Arc<ConnectionStats>,
    ) -> io::Result<(Self, ReleaseHandle)> {
        let addr = format!("{}:{}", config.server_name, config.port);
        let stream = TcpStream::connect(&addr).await?;
        info!("Successfully established new kismet server connection to {}", addr);

        let (tx, release_rx) = watch::channel(false);
        let connection = Self {
            config,
            factory,
            stats,
            stream,
            release_rx,
        };
        Ok((connection, ReleaseHandle { tx }))
    }

    /// The activation configuration this connection was built from.
    pub fn config(&self) -> &ActivationConfig {
        &self.config
    }

    /// The listener factory this connection delivers to.
    pub fn factory(&self) -> &Arc<dyn ListenerFactory> {
        &self.factory
    }

    /// Drive the connection until it terminates or is released.
    pub async fn run(mut self) {
        let config = self.config.clone();
        match self.process().await {
            Ok(()) => {
                info!("Kismet server connection to {} released", config);
            }
            Err(e) => {
                error!(
                    "Error in kismet server connection to {}, terminating connection: {}",
                    config, e
                );
            }
        }
    }

    /// Enable the protocols and run the read loop.
    ///
    /// Returns `Ok(())` only when the connection was released; every
    /// other exit is a [`ConnectionError`].
    async fn process(&mut self) -> Result<(), ConnectionError> {
        let (reader, mut writer) = self.stream.split();
        let mut reader = BufReader::new(reader);
        let mut line_buf = String::with_capacity(256);

        // Enable the CLISRC and SOURCE protocols
        info!("Enabling CLISRC and SOURCE protocols for kismet server connection");
        writer.write_all(b"!1 ENABLE CLISRC *\n").await?;
        writer.write_all(b"!2 ENABLE SOURCE *\n").await?;
        writer.flush().await?;

        let mut aggregator = Aggregator::new();

        loop {
            line_buf.clear();

            let bytes_read = tokio::select! {
                result = reader.read_line(&mut line_buf) => result?,
                _ = self.release_rx.changed() => {
                    return Ok(());
                }
            };

            if bytes_read == 0 {
                return Err(ConnectionError::EndOfStream);
            }

            let line = line_buf.trim_end();
            debug!("Received: {}", line);
            self.stats.record_line(bytes_read as u64);

            let sentence = match parse_sentence(line) {
                Ok(sentence) => sentence,
                Err(e) => {
                    self.stats.record_parse_failure();
                    return Err(e.into());
                }
            };
            self.stats.record_sentence(&sentence);

            if let Some(message) = aggregator.apply(sentence) {
                self.stats.record_batch(&message);
                let delivered = deliver(self.factory.as_ref(), message);
                self.stats.record_delivery(delivered);
            }
        }
    }
}
