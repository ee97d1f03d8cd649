//! TCP transport for the client (feature `transport`).
//!
//! Frames are written as header plus payload and read back with two exact
//! reads. The transport only moves frames; the [`crate::Client`] state
//! machine decides what to send.

use std::io;

use bytes::BytesMut;
use pinboard_proto::{Frame, FrameHeader, ProtocolError};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

/// Transport failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The peer sent an invalid frame.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Sending half of a connection.
#[derive(Debug)]
pub struct FrameSender {
    writer: OwnedWriteHalf,
    buf: BytesMut,
}

/// Receiving half of a connection.
#[derive(Debug)]
pub struct FrameReceiver {
    reader: OwnedReadHalf,
}

/// Connect to a server.
pub async fn connect(addr: impl ToSocketAddrs) -> Result<(FrameSender, FrameReceiver), TransportError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    Ok((FrameSender { writer, buf: BytesMut::new() }, FrameReceiver { reader }))
}

impl FrameSender {
    /// Write one frame.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.buf.clear();
        frame.encode(&mut self.buf)?;
        self.writer.write_all(&self.buf).await?;
        Ok(())
    }

    /// Close the write side.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl FrameReceiver {
    /// Read one frame. `Ok(None)` once the server closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        let mut header = [0u8; FrameHeader::SIZE];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let header = FrameHeader::from_bytes(&header)?;
        let mut payload = vec![0u8; Frame::payload_len_from_header(&header)?];
        self.reader.read_exact(&mut payload).await?;
        Ok(Some(Frame::new(header, payload)))
    }
}
