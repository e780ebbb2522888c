//! TCP client for communicating with the imgwatch daemon.

use crate::protocol::{read_frame, write_frame};
use crate::{ImageInfo, IpcError, Request, Response, ResponseData};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default daemon address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Request/response timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// IPC client for communicating with the daemon
#[derive(Debug, Clone)]
pub struct IpcClient {
    addr: String,
}

impl IpcClient {
    /// Create a client for the default address
    pub fn new() -> Self {
        Self::with_addr(DEFAULT_ADDR)
    }

    /// Create a client for a custom address
    pub fn with_addr(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Address this client talks to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream, IpcError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| IpcError::ConnectionFailed("Connection timed out".to_string()))?;

        match stream {
            Ok(stream) => Ok(stream),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(IpcError::DaemonNotRunning(self.addr.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send a request and wait for the response (one connection per request)
    pub async fn request(&self, request: Request) -> Result<Response, IpcError> {
        let mut stream = self.connect().await?;

        tokio::time::timeout(REQUEST_TIMEOUT, Self::exchange(&mut stream, &request))
            .await
            .map_err(|_| IpcError::ConnectionFailed("Request timed out".to_string()))?
    }

    async fn exchange(stream: &mut TcpStream, request: &Request) -> Result<Response, IpcError> {
        let request_bytes = rmp_serde::to_vec(request)?;
        write_frame(stream, &request_bytes).await?;

        let response_buf = read_frame(stream).await?;
        Ok(rmp_serde::from_slice(&response_buf)?)
    }

    /// Send a fire-and-forget request (don't wait for response)
    pub async fn send_async(&self, request: &Request) -> Result<(), IpcError> {
        let mut stream = self.connect().await?;

        let request_bytes = rmp_serde::to_vec(request)?;
        write_frame(&mut stream, &request_bytes).await
    }

    /// Check if something is accepting connections at the daemon address
    pub async fn is_daemon_running(&self) -> bool {
        self.connect().await.is_ok()
    }

    /// Send `request` and unwrap the data payload of a success response
    async fn request_data(&self, request: Request) -> Result<ResponseData, IpcError> {
        match self.request(request).await? {
            Response::Ok { data: Some(data) } => Ok(data),
            Response::Error { code, message } => Err(IpcError::Remote { code, message }),
            _ => Err(IpcError::UnexpectedResponse),
        }
    }

    /// List every indexed image, sorted by name
    pub async fn list_images(&self) -> Result<Vec<ImageInfo>, IpcError> {
        match self.request_data(Request::ListImages).await? {
            ResponseData::Images { images } => Ok(images),
            _ => Err(IpcError::UnexpectedResponse),
        }
    }

    /// Fetch one image's metadata and file contents
    pub async fn get_image(&self, name: &str) -> Result<(ImageInfo, Vec<u8>), IpcError> {
        let request = Request::GetImage {
            name: name.to_string(),
        };
        match self.request_data(request).await? {
            ResponseData::Image { info, data } => Ok((info, data)),
            _ => Err(IpcError::UnexpectedResponse),
        }
    }

    /// Store `data` as `name` in the watched directory
    pub async fn upload_image(&self, name: &str, data: Vec<u8>) -> Result<ImageInfo, IpcError> {
        let request = Request::UploadImage {
            name: name.to_string(),
            data,
        };
        match self.request_data(request).await? {
            ResponseData::Stored { info } => Ok(info),
            _ => Err(IpcError::UnexpectedResponse),
        }
    }

    /// Delete `name` from the watched directory
    pub async fn remove_image(&self, name: &str) -> Result<(), IpcError> {
        let request = Request::RemoveImage {
            name: name.to_string(),
        };
        match self.request(request).await? {
            Response::Ack | Response::Ok { .. } => Ok(()),
            Response::Error { code, message } => Err(IpcError::Remote { code, message }),
        }
    }

    /// Get daemon status
    pub async fn get_status(&self) -> Result<ResponseData, IpcError> {
        match self.request_data(Request::Status).await? {
            status @ ResponseData::Status { .. } => Ok(status),
            _ => Err(IpcError::UnexpectedResponse),
        }
    }
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorCode, IpcServer, RequestHandler};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct TestHandler;

    #[async_trait]
    impl RequestHandler for TestHandler {
        async fn handle(&self, request: Request) -> Response {
            match request {
                Request::Ping => Response::ok_with(ResponseData::Pong { timestamp: 0 }),
                Request::Status => Response::ok_with(ResponseData::Status {
                    version: "test".to_string(),
                    uptime_secs: 0,
                    watch_dir: PathBuf::from("/tmp/images"),
                    images_indexed: 0,
                    events_applied: 0,
                    requests_total: 0,
                    avg_latency_ms: 0,
                }),
                Request::ListImages => Response::ok_with(ResponseData::Images {
                    images: vec![ImageInfo {
                        name: "a.png".to_string(),
                        width: 10,
                        height: 20,
                    }],
                }),
                Request::GetImage { name } => {
                    Response::error(ErrorCode::NotFound, format!("no such image: {}", name))
                }
                _ => Response::ack(),
            }
        }
    }

    async fn start_server() -> IpcClient {
        let server = IpcServer::bind("127.0.0.1:0", Arc::new(TestHandler))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        IpcClient::with_addr(addr.to_string())
    }

    /// Address of a port that was free a moment ago
    async fn unused_addr() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_client_default() {
        let client = IpcClient::default();
        assert_eq!(client.addr(), DEFAULT_ADDR);
    }

    #[tokio::test]
    async fn test_client_connect_no_daemon() {
        let client = IpcClient::with_addr(unused_addr().await);
        let result = client.request(Request::Ping).await;
        assert!(matches!(result, Err(IpcError::DaemonNotRunning(_))));
        assert!(!client.is_daemon_running().await);
    }

    #[tokio::test]
    async fn test_client_connect_and_ping() {
        let client = start_server().await;
        assert!(client.is_daemon_running().await);

        let response = client.request(Request::Ping).await.unwrap();
        assert!(matches!(
            response,
            Response::Ok {
                data: Some(ResponseData::Pong { .. })
            }
        ));
    }

    #[tokio::test]
    async fn test_client_get_status() {
        let client = start_server().await;
        let status = client.get_status().await.unwrap();
        assert!(matches!(status, ResponseData::Status { .. }));
    }

    #[tokio::test]
    async fn test_client_list_images() {
        let client = start_server().await;
        let images = client.list_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].name, "a.png");
    }

    #[tokio::test]
    async fn test_client_maps_error_response() {
        let client = start_server().await;
        let result = client.get_image("missing.png").await;

        match result {
            Err(IpcError::Remote { code, message }) => {
                assert_eq!(code, ErrorCode::NotFound);
                assert!(message.contains("missing.png"));
            }
            other => panic!("Expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_wrong_shape_is_unexpected() {
        let client = start_server().await;
        // TestHandler acks uploads instead of returning Stored
        let result = client.upload_image("a.png", vec![1, 2, 3]).await;
        assert!(matches!(result, Err(IpcError::UnexpectedResponse)));
    }

    #[tokio::test]
    async fn test_client_send_async() {
        let client = start_server().await;
        assert!(client.send_async(&Request::Ping).await.is_ok());
    }
}
