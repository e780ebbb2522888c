//! TCP server for the imgwatch daemon.
//!
//! Accepts connections and dispatches one framed request per connection
//! to a [`RequestHandler`].

use crate::protocol::{read_frame, write_frame};
use crate::{ErrorCode, IpcError, Request, Response};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

/// Time allowed for a client to deliver its whole request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP request server
pub struct IpcServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
}

impl IpcServer {
    /// Bind a server to `addr`. Port 0 picks a free port.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, IpcError> {
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("IPC server listening on {}", listener.local_addr()?);

        Ok(Self { listener, handler })
    }

    /// Address the server is actually listening on
    pub fn local_addr(&self) -> Result<SocketAddr, IpcError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections until the future is dropped
    pub async fn run(&self) -> Result<(), IpcError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, handler).await {
                            tracing::debug!(%peer, "Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                }
            }
        }
    }

    /// Handle a single connection
    async fn handle_connection(
        mut stream: TcpStream,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), IpcError> {
        let request = tokio::time::timeout(REQUEST_TIMEOUT, Self::read_request(&mut stream))
            .await
            .map_err(IpcError::Timeout)?;

        let request = match request {
            Ok(req) => req,
            Err(e @ (IpcError::Deserialize(_) | IpcError::RequestTooLarge)) => {
                let response = Response::error(
                    ErrorCode::InvalidRequest,
                    format!("Failed to parse request: {}", e),
                );
                Self::write_response(&mut stream, &response).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(action = request.action(), "Received request");

        let response = handler.handle(request).await;

        Self::write_response(&mut stream, &response).await
    }

    /// Read a request from the stream
    async fn read_request(stream: &mut TcpStream) -> Result<Request, IpcError> {
        let buf = read_frame(stream).await?;

        // MessagePack first, JSON as a fallback for hand-written requests
        match rmp_serde::from_slice(&buf) {
            Ok(request) => Ok(request),
            Err(msgpack_err) => {
                serde_json::from_slice(&buf).map_err(|_| IpcError::Deserialize(msgpack_err))
            }
        }
    }

    /// Write a response to the stream
    async fn write_response(stream: &mut TcpStream, response: &Response) -> Result<(), IpcError> {
        let response_bytes = rmp_serde::to_vec(response)?;
        write_frame(stream, &response_bytes).await
    }
}

/// Trait for handling incoming requests
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request and return a response
    async fn handle(&self, request: Request) -> Response;
}
