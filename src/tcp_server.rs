//! ISO-8583 TCP ingress.
//!
//! One accept loop, one task per connection gated by a semaphore of
//! `threads` permits. Each connection is handled strictly serially:
//! read frame, process, write frame, so responses leave in request order.
//! Parse errors are answered with a minimal 0210/39="30" and the socket
//! stays open; framing and socket errors close the connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::configure::ServerConfig;
use crate::errors::GatewayError;
use crate::iso_message::IsoMessage;
use crate::iso_types::IsoType;
use crate::processor::Processor;
use crate::response_assembler::sanitize_numeric_ll_fields;
use crate::wire_codec::WireCodec;

pub struct TcpServer {
    cfg: ServerConfig,
    codec: Arc<WireCodec>,
    processor: Arc<Processor>,
}

impl TcpServer {
    pub fn new(cfg: ServerConfig, codec: Arc<WireCodec>, processor: Arc<Processor>) -> Self {
        Self { cfg, codec, processor }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        if self.cfg.port == 0 {
            anyhow::bail!("Invalid ATM server port: {}", self.cfg.port);
        }
        let listener = TcpListener::bind(("0.0.0.0", self.cfg.port)).await?;
        info!(port = self.cfg.port, threads = self.cfg.threads, "ISO-8583 TCP server listening");

        let permits = Arc::new(Semaphore::new(self.cfg.threads));
        let idle_timeout = self.cfg.socket_timeout();

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept error");
                    continue;
                }
            };
            let permit = permits.clone().acquire_owned().await.expect("semaphore closed");
            let codec = self.codec.clone();
            let processor = self.processor.clone();
            tokio::spawn(async move {
                handle_connection(socket, peer.to_string(), codec, processor, idle_timeout).await;
                drop(permit);
            });
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    remote: String,
    codec: Arc<WireCodec>,
    processor: Arc<Processor>,
    idle_timeout: Duration,
) {
    info!(remote = %remote, "connection accepted");
    loop {
        let payload = match read_frame(&mut socket, idle_timeout).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(remote = %remote, "connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(remote = %remote, error = %e, "read failed, closing connection");
                break;
            }
        };

        let response = match codec.decode(&payload) {
            Ok(request) => processor.process(&request).await,
            Err(e) => {
                error!(remote = %remote, error = %e, "parse error");
                if !e.is_recoverable() {
                    break;
                }
                parse_error_response(&e)
            }
        };

        let mut response = response;
        sanitize_numeric_ll_fields(&mut response);

        let bytes = match codec.encode(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(remote = %remote, error = %e, "failed to encode response");
                continue;
            }
        };

        if let Err(e) = write_frame(&mut socket, &bytes).await {
            error!(remote = %remote, error = %e, "write failed, dropping connection");
            break;
        }
    }
}

/// Minimal in-band answer to an undecodable payload.
fn parse_error_response(error: &GatewayError) -> IsoMessage {
    let mut response = IsoMessage::new(0x210);
    response.set_text(39, IsoType::Alpha, 2, error.response_code());
    response
}

/// Read one length-prefixed frame. `Ok(None)` is a clean close before the
/// next frame; EOF mid-frame is a `FrameIncomplete`; an idle timeout is a
/// socket error.
async fn read_frame(socket: &mut TcpStream, idle_timeout: Duration) -> Result<Option<Vec<u8>>, GatewayError> {
    let mut len_bytes = [0u8; 2];
    match tokio::time::timeout(idle_timeout, socket.read_exact(&mut len_bytes)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "idle timeout").into());
        }
    }
    let expected = u16::from_be_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; expected];
    let mut got = 0;
    while got < expected {
        let read = match tokio::time::timeout(idle_timeout, socket.read(&mut payload[got..])).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "idle timeout mid-frame").into());
            }
        };
        if read == 0 {
            return Err(GatewayError::FrameIncomplete { expected, got });
        }
        got += read;
    }
    Ok(Some(payload))
}

async fn write_frame(socket: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    socket.write_all(&WireCodec::frame(payload)).await?;
    socket.flush().await
}
