use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::{Packet, WireError};

/// Upper bound on `body_len`. Anything larger is rejected before the body
/// is buffered, so a corrupt length prefix cannot drive allocation.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The kind word precedes the body inside the length-counted region.
const KIND_SIZE: usize = 4;

/// A framed packet stream over any byte stream.
///
/// Cheap to clone; reader and writer halves sit behind their own async
/// mutexes so one task can block in [`recv`](WireStream::recv) while others
/// interleave [`send`](WireStream::send)s.
#[derive(Clone)]
pub struct WireStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    reader: AsyncMutex<Box<dyn AsyncRead + Unpin + Send>>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for WireStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireStream")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl WireStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_split(reader, writer)
    }

    pub fn from_split<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            inner: Arc::new(StreamInner {
                reader: AsyncMutex::new(Box::new(reader)),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// In-memory connected pair, for tests.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (Self::new(a), Self::new(b))
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Writes one frame: length word, kind word, body.
    pub async fn send(&self, packet: &Packet) -> Result<(), WireError> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }

        let mut body = Vec::new();
        packet.encode_body(&mut body)?;

        let mut frame = BytesMut::with_capacity(8 + body.len());
        frame.put_u32((KIND_SIZE + body.len()) as u32);
        frame.put_u32(packet.kind());
        frame.put_slice(&body);

        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads one frame and parses its packet.
    ///
    /// A clean close before any length byte yields [`WireError::Closed`];
    /// EOF anywhere inside a frame is an I/O error. Decode failures are
    /// fatal to the connection by protocol contract; callers close on them.
    pub async fn recv(&self) -> Result<Packet, WireError> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }

        let mut reader = self.inner.reader.lock().await;

        let mut len_buf = [0u8; 4];
        let first = reader.read(&mut len_buf).await?;
        if first == 0 {
            return Err(WireError::Closed);
        }
        if first < len_buf.len() {
            reader.read_exact(&mut len_buf[first..]).await?;
        }
        let body_len = u32::from_be_bytes(len_buf) as usize;

        if body_len < KIND_SIZE {
            return Err(WireError::Malformed(format!(
                "length {body_len} cannot hold a kind word"
            )));
        }
        if body_len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                len: body_len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut kind_buf = [0u8; 4];
        reader.read_exact(&mut kind_buf).await?;
        let kind = u32::from_be_bytes(kind_buf);

        let mut body = vec![0u8; body_len - KIND_SIZE];
        reader.read_exact(&mut body).await?;
        drop(reader);

        Packet::decode_body(kind, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_codec::Value;

    #[tokio::test]
    async fn frames_deliver_in_order() {
        let (a, b) = WireStream::pair();

        a.send(&Packet::QueryRequest { slot: "X".into() }).await.unwrap();
        a.send(&Packet::Heartbeat).await.unwrap();
        a.send(&Packet::RpcRequest {
            index: 1,
            slot: "X".into(),
            method: "m".into(),
            args: vec![Value::U8(9)],
            want_result: true,
        })
        .await
        .unwrap();

        assert_eq!(
            b.recv().await.unwrap(),
            Packet::QueryRequest { slot: "X".into() }
        );
        assert_eq!(b.recv().await.unwrap(), Packet::Heartbeat);
        match b.recv().await.unwrap() {
            Packet::RpcRequest { index, args, .. } => {
                assert_eq!(index, 1);
                assert_eq!(args, vec![Value::U8(9)]);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clean_eof_reads_as_closed() {
        let (a, b) = WireStream::pair();
        drop(a);
        assert!(matches!(b.recv().await, Err(WireError::Closed)));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_io_error() {
        let (client, server) = tokio::io::duplex(1024);
        let wire = WireStream::new(server);

        // Announce an 8-byte frame but deliver only the kind word.
        let (_, mut tx) = tokio::io::split(client);
        tx.write_all(&8u32.to_be_bytes()).await.unwrap();
        tx.write_all(&crate::kind::HEARTBEAT.to_be_bytes()).await.unwrap();
        drop(tx);

        assert!(matches!(wire.recv().await, Err(WireError::Io(_))));
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (client, server) = tokio::io::duplex(1024);
        let wire = WireStream::new(server);

        let (_, mut tx) = tokio::io::split(client);
        tx.write_all(&(u32::MAX).to_be_bytes()).await.unwrap();
        tx.write_all(&[0u8; 16]).await.unwrap();

        assert!(matches!(
            wire.recv().await,
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn undersized_length_is_malformed() {
        let (client, server) = tokio::io::duplex(1024);
        let wire = WireStream::new(server);

        let (_, mut tx) = tokio::io::split(client);
        tx.write_all(&2u32.to_be_bytes()).await.unwrap();
        tx.write_all(&[0u8; 2]).await.unwrap();

        assert!(matches!(wire.recv().await, Err(WireError::Malformed(_))));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (a, _b) = WireStream::pair();
        a.close();
        assert!(matches!(
            a.send(&Packet::Heartbeat).await,
            Err(WireError::Closed)
        ));
    }
}
