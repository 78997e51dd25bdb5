// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed peer connection.
//!
//! A connection is split into a reader and a writer half so that reading can
//! run on its own task; `read_exact` is not cancellation safe and must not
//! sit in a `select!` next to outbound traffic.

use super::protocol::WireMessage;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

/// Connection error types.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Split a stream into framed halves.
pub fn split<S>(stream: S, max_message_size: usize) -> (FrameReader<ReadHalf<S>>, FrameWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (
        FrameReader::new(read, max_message_size),
        FrameWriter::new(write, max_message_size),
    )
}

/// Reading half.
pub struct FrameReader<R> {
    inner: R,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Read a message from the peer.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully.
    pub async fn read_message(&mut self) -> Result<Option<WireMessage>, ConnectionError> {
        // Read length prefix (4 bytes, big-endian)
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        if len == 0 {
            return Err(ConnectionError::Protocol("Empty message".into()));
        }
        if len > self.max_message_size {
            return Err(ConnectionError::Protocol(format!(
                "Message too large: {} > {}",
                len, self.max_message_size
            )));
        }

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.inner.read_exact(&mut self.read_buffer).await?;

        let msg: WireMessage = serde_json::from_slice(&self.read_buffer)
            .map_err(|e| ConnectionError::Protocol(format!("Invalid JSON: {}", e)))?;

        Ok(Some(msg))
    }
}

/// Writing half.
pub struct FrameWriter<W> {
    inner: W,
    max_message_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
        }
    }

    /// Send a message to the peer.
    pub async fn send_message(&mut self, msg: &WireMessage) -> Result<(), ConnectionError> {
        let json = serde_json::to_vec(msg)
            .map_err(|e| ConnectionError::Protocol(format!("Serialize error: {}", e)))?;

        if json.len() > self.max_message_size {
            return Err(ConnectionError::Protocol(format!(
                "Message too large: {} > {}",
                json.len(),
                self.max_message_size
            )));
        }

        let len = json.len() as u32;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(&json).await?;
        self.inner.flush().await?;

        Ok(())
    }

    /// Shutdown the write side.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        Ok(self.inner.shutdown().await?)
    }
}
