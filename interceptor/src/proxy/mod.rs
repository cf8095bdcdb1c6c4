//! The HTTP(S) reverse proxy glue that turns a [`TcpFlow`] into something
//! hyper can serve: a plain-HTTP handler for port 80 and a TLS-terminating
//! handler for port 443, both built on the same [`FlowStream`] adapter.

pub mod http;
pub mod tls;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use interceptor_core::tcp::TcpFlow;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

type ReadFuture = Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>, interceptor_core::Error>> + Send>>;

enum ReadState {
    Idle,
    Pending(ReadFuture),
}

/// Adapts a [`TcpFlow`]'s chunked, copy-based reads and non-blocking
/// writes into `tokio::io::AsyncRead`/`AsyncWrite`, so hyper (by way of
/// `hyper_util::rt::TokioIo`) can drive HTTP directly over it.
pub struct FlowStream {
    flow: TcpFlow,
    read_state: ReadState,
    leftover: Vec<u8>,
    leftover_pos: usize,
}

impl FlowStream {
    pub fn new(flow: TcpFlow) -> Self {
        Self {
            flow,
            read_state: ReadState::Idle,
            leftover: Vec::new(),
            leftover_pos: 0,
        }
    }

    pub fn flow(&self) -> &TcpFlow {
        &self.flow
    }
}

impl AsyncRead for FlowStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.leftover_pos < self.leftover.len() {
            let available = &self.leftover[self.leftover_pos..];
            let n = available.len().min(buf.remaining());
            buf.put_slice(&available[..n]);
            self.leftover_pos += n;
            return Poll::Ready(Ok(()));
        }

        loop {
            match &mut self.read_state {
                ReadState::Idle => {
                    let flow = self.flow.clone();
                    self.read_state = ReadState::Pending(Box::pin(async move { flow.read().await }));
                }
                ReadState::Pending(future) => {
                    return match future.as_mut().poll(cx) {
                        Poll::Ready(Ok(Some(data))) => {
                            self.read_state = ReadState::Idle;
                            let n = data.len().min(buf.remaining());
                            buf.put_slice(&data[..n]);
                            if n < data.len() {
                                self.leftover = data;
                                self.leftover_pos = n;
                            }
                            Poll::Ready(Ok(()))
                        }
                        Poll::Ready(Ok(None)) => {
                            self.read_state = ReadState::Idle;
                            Poll::Ready(Ok(()))
                        }
                        Poll::Ready(Err(error)) => {
                            self.read_state = ReadState::Idle;
                            Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, error)))
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
            }
        }
    }
}

impl AsyncWrite for FlowStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.flow.write(buf) {
            Ok(()) => Poll::Ready(Ok(buf.len())),
            Err(error) => Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, error))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.flow.close() {
            Ok(()) => Poll::Ready(Ok(())),
            Err(error) => Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, error))),
        }
    }
}
