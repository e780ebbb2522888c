//! IPC Protocol definitions for imgwatch daemon communication.
//!
//! Uses MessagePack for efficient serialization, framed with a 4-byte
//! little-endian length prefix.

use crate::IpcError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum framed message size (128MB)
pub const MAX_MESSAGE_SIZE: usize = 128 * 1024 * 1024;

/// Request from client to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// List every indexed image
    ListImages,

    /// Fetch one image's metadata and bytes
    GetImage { name: String },

    /// Delete an image file from the watched directory
    RemoveImage { name: String },

    /// Store a new image file in the watched directory
    UploadImage { name: String, data: Vec<u8> },

    /// Get daemon status
    Status,

    /// Graceful shutdown
    Shutdown,

    /// Ping for health check
    Ping,
}

impl Request {
    /// Short name used in request logs.
    pub fn action(&self) -> &'static str {
        match self {
            Request::ListImages => "list_images",
            Request::GetImage { .. } => "get_image",
            Request::RemoveImage { .. } => "remove_image",
            Request::UploadImage { .. } => "upload_image",
            Request::Status => "status",
            Request::Shutdown => "shutdown",
            Request::Ping => "ping",
        }
    }

    /// Whether the request changes the watched directory.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Request::RemoveImage { .. } | Request::UploadImage { .. }
        )
    }
}

/// Image metadata as exposed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Response from daemon to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success with optional data
    Ok {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },

    /// Acknowledgment for requests with no payload
    Ack,

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Create a success response with data
    pub fn ok_with(data: ResponseData) -> Self {
        Response::Ok { data: Some(data) }
    }

    /// Create an acknowledgment response
    pub fn ack() -> Self {
        Response::Ack
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }
}

/// Response data variants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Index snapshot, sorted by name
    Images { images: Vec<ImageInfo> },

    /// A single image with its file contents
    Image { info: ImageInfo, data: Vec<u8> },

    /// Daemon status
    Status {
        version: String,
        uptime_secs: u64,
        watch_dir: PathBuf,
        images_indexed: usize,
        /// Change events that modified the index
        #[serde(default)]
        events_applied: u64,
        /// Total requests handled
        #[serde(default)]
        requests_total: u64,
        /// Average request latency in milliseconds
        #[serde(default)]
        avg_latency_ms: u64,
    },

    /// Metadata of a freshly uploaded image
    Stored { info: ImageInfo },

    /// Pong response
    Pong { timestamp: i64 },
}

/// Error codes for error responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request format is invalid
    InvalidRequest,
    /// Name contains a directory component
    InvalidName,
    /// No such image
    NotFound,
    /// Uploaded content is not a recognized image
    NotAnImage,
    /// Payload exceeds the configured limit
    TooLarge,
    /// Internal daemon error
    InternalError,
    /// Daemon is shutting down
    ShuttingDown,
}

/// Read one length-prefixed frame.
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, IpcError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::RequestTooLarge);
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    bytes: &[u8],
) -> Result<(), IpcError> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::RequestTooLarge);
    }

    let len_bytes = (bytes.len() as u32).to_le_bytes();
    writer.write_all(&len_bytes).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::GetImage {
            name: "a.png".to_string(),
        };

        // Test JSON serialization (for debugging)
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("get_image"));
        assert!(json.contains("a.png"));

        // Test MessagePack round-trip
        let msgpack = rmp_serde::to_vec(&req).unwrap();
        let decoded: Request = rmp_serde::from_slice(&msgpack).unwrap();

        if let Request::GetImage { name } = decoded {
            assert_eq!(name, "a.png");
        } else {
            panic!("Decoded wrong variant");
        }
    }

    #[test]
    fn test_request_from_json() {
        let req: Request = serde_json::from_str(r#"{"action":"list_images"}"#).unwrap();
        assert!(matches!(req, Request::ListImages));

        let req: Request =
            serde_json::from_str(r#"{"action":"remove_image","name":"old.jpg"}"#).unwrap();
        assert_eq!(req.action(), "remove_image");
    }

    #[test]
    fn test_upload_request_keeps_bytes() {
        let data: Vec<u8> = (0..=255).collect();
        let req = Request::UploadImage {
            name: "b.png".to_string(),
            data: data.clone(),
        };

        let msgpack = rmp_serde::to_vec(&req).unwrap();
        let decoded: Request = rmp_serde::from_slice(&msgpack).unwrap();

        if let Request::UploadImage { name, data: got } = decoded {
            assert_eq!(name, "b.png");
            assert_eq!(got, data);
        } else {
            panic!("Decoded wrong variant");
        }
    }

    #[test]
    fn test_images_response_roundtrip() {
        let images = vec![
            ImageInfo {
                name: "a.png".to_string(),
                width: 10,
                height: 20,
            },
            ImageInfo {
                name: "b.jpg".to_string(),
                width: 5,
                height: 5,
            },
        ];

        let response = Response::ok_with(ResponseData::Images {
            images: images.clone(),
        });
        let msgpack = rmp_serde::to_vec(&response).unwrap();
        let decoded: Response = rmp_serde::from_slice(&msgpack).unwrap();

        if let Response::Ok {
            data: Some(ResponseData::Images { images: got }),
        } = decoded
        {
            assert_eq!(got, images);
        } else {
            panic!("Decoded wrong response variant");
        }
    }

    #[test]
    fn test_status_response_serialization() {
        let resp = Response::ok_with(ResponseData::Status {
            version: "0.1.0".to_string(),
            uptime_secs: 3600,
            watch_dir: PathBuf::from("/srv/images"),
            images_indexed: 2,
            events_applied: 7,
            requests_total: 100,
            avg_latency_ms: 5,
        });

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("ok"));
        assert!(json.contains("/srv/images"));
    }

    #[tokio::test]
    async fn test_frame_roundtrip_and_limit() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        assert_eq!(&buf[..4], &5u32.to_le_bytes());

        let mut reader = buf.as_slice();
        assert_eq!(read_frame(&mut reader).await.unwrap(), b"hello");

        let oversized = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes();
        let mut reader = &oversized[..];
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(IpcError::RequestTooLarge)
        ));
    }

    #[test]
    fn test_error_response_serialization() {
        let resp = Response::error(ErrorCode::NotAnImage, "Request content is not an image");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("not_an_image"));
        assert!(json.contains("\"status\":\"error\""));
    }
}
