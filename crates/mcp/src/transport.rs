//! MCP transport layer.
//!
//! A transport splits into a reading half and a writing half so the server
//! can hand the writer to its own task. Frames are newline-delimited JSON;
//! readers yield trimmed, non-empty lines and writers flush after each frame.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::McpError;

#[async_trait]
pub trait FrameReader: Send {
    /// Next non-blank line, trimmed. `None` at end of input.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;
}

#[async_trait]
pub trait FrameWriter: Send {
    /// Write one frame followed by a newline.
    async fn send(&mut self, frame: &str) -> Result<(), McpError>;
}

/// A bidirectional line transport.
pub trait McpTransport: Send {
    type Reader: FrameReader + 'static;
    type Writer: FrameWriter + 'static;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Stdin/stdout transport. Stdout carries protocol frames only.
pub struct StdioTransport {
    reader: StdioReader,
    writer: StdioWriter,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            reader: StdioReader {
                inner: BufReader::new(tokio::io::stdin()),
                buf: Vec::new(),
            },
            writer: StdioWriter {
                inner: tokio::io::stdout(),
            },
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl McpTransport for StdioTransport {
    type Reader = StdioReader;
    type Writer = StdioWriter;

    fn split(self) -> (StdioReader, StdioWriter) {
        (self.reader, self.writer)
    }
}

pub struct StdioReader {
    inner: BufReader<tokio::io::Stdin>,
    buf: Vec<u8>,
}

#[async_trait]
impl FrameReader for StdioReader {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            self.buf.clear();
            let bytes_read = self.inner.read_until(b'\n', &mut self.buf).await?;
            if bytes_read == 0 {
                return Ok(None);
            }
            // Invalid UTF-8 still becomes a line; the JSON parse then rejects it.
            let line = match std::str::from_utf8(&self.buf) {
                Ok(s) => s.trim().to_string(),
                Err(e) => {
                    warn!(error = %e, "Input line is not valid UTF-8");
                    String::from_utf8_lossy(&self.buf).trim().to_string()
                }
            };
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }
}

pub struct StdioWriter {
    inner: tokio::io::Stdout,
}

#[async_trait]
impl FrameWriter for StdioWriter {
    async fn send(&mut self, frame: &str) -> Result<(), McpError> {
        self.inner.write_all(frame.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// In-memory transport backed by channel pairs.
pub struct ChannelTransport {
    reader: ChannelReader,
    writer: ChannelWriter,
}

impl ChannelTransport {
    /// Two connected ends: frames sent on one are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::unbounded_channel();
        let (tx_b, rx_a) = mpsc::unbounded_channel();
        (
            Self {
                reader: ChannelReader { rx: rx_a },
                writer: ChannelWriter { tx: tx_a },
            },
            Self {
                reader: ChannelReader { rx: rx_b },
                writer: ChannelWriter { tx: tx_b },
            },
        )
    }
}

impl McpTransport for ChannelTransport {
    type Reader = ChannelReader;
    type Writer = ChannelWriter;

    fn split(self) -> (ChannelReader, ChannelWriter) {
        (self.reader, self.writer)
    }
}

pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        while let Some(msg) = self.rx.recv().await {
            let line = msg.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
        Ok(None)
    }
}

pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn send(&mut self, frame: &str) -> Result<(), McpError> {
        self.tx.send(frame.to_string()).map_err(|e| {
            McpError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string()))
        })
    }
}
