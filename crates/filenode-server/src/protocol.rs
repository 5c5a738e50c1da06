//! Wire protocol: newline-delimited JSON.
//!
//! Each client line is a [`ClientFrame`]; each server line is a
//! [`ServerFrame`] tagged with the id of the call it answers. Streaming
//! calls produce any number of `item` frames followed by one `end` or
//! `error` frame. Unary calls produce one `result` or `error` frame.
//! Binary payloads travel as standard base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use filenode_kernel::{Chunk, FsError, ListDirRequest, StreamFileRequest};

/// Protocol-level failures, reported as `error` frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params for {method}: {message}")]
    InvalidParams { method: String, message: String },

    #[error("request id {0} is already in flight")]
    DuplicateId(u64),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        "ERR_INVALID_ARGUMENT"
    }
}

/// One request line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl ClientFrame {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One element of a streaming reply.
    Item { id: u64, item: Value },
    /// Successful end of a streaming reply.
    End {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_page_token: Option<String>,
    },
    /// Reply to a unary call.
    Result { id: u64, result: Value },
    /// Terminal failure of any call.
    Error { id: u64, code: String, message: String },
}

impl ServerFrame {
    pub fn id(&self) -> u64 {
        match self {
            Self::Item { id, .. }
            | Self::End { id, .. }
            | Self::Result { id, .. }
            | Self::Error { id, .. } => *id,
        }
    }

    pub fn from_fs_error(id: u64, err: &FsError) -> Self {
        Self::Error {
            id,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn from_protocol_error(id: u64, err: &ProtocolError) -> Self {
        Self::Error {
            id,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this frame ends its call.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Item { .. })
    }
}

/// A decoded client call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListDir(ListDirRequest),
    Stat { path: String },
    StreamFile(StreamFileRequest),
    CreateDir { path: String, recursive: bool },
    CreateFile { path: String, content: Vec<u8> },
    Delete { paths: Vec<String>, permanent: bool },
    Rename { path: String, new_name: String },
    GetDrives,
    GetDeviceInfo,
    Cancel { target: u64 },
}

#[derive(Deserialize)]
struct PathParams {
    path: String,
}

#[derive(Deserialize)]
struct CreateDirParams {
    path: String,
    #[serde(default)]
    recursive: bool,
}

#[derive(Deserialize)]
struct CreateFileParams {
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct DeleteParams {
    paths: Vec<String>,
    #[serde(default)]
    permanent: bool,
}

#[derive(Deserialize)]
struct RenameParams {
    path: String,
    new_name: String,
}

#[derive(Deserialize)]
struct CancelParams {
    target: u64,
}

impl Call {
    /// Decode `frame.method` and `frame.params`.
    pub fn from_frame(frame: &ClientFrame) -> Result<Self, ProtocolError> {
        let method = frame.method.as_str();
        let params = match &frame.params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };

        let call = match method {
            "list_dir" => Self::ListDir(parse(method, params)?),
            "stat" => {
                let p: PathParams = parse(method, params)?;
                Self::Stat { path: p.path }
            }
            "stream_file" => Self::StreamFile(parse(method, params)?),
            "create_dir" => {
                let p: CreateDirParams = parse(method, params)?;
                Self::CreateDir {
                    path: p.path,
                    recursive: p.recursive,
                }
            }
            "create_file" => {
                let p: CreateFileParams = parse(method, params)?;
                let content = STANDARD
                    .decode(&p.content)
                    .map_err(|e| ProtocolError::InvalidParams {
                        method: method.to_string(),
                        message: format!("content is not base64: {e}"),
                    })?;
                Self::CreateFile {
                    path: p.path,
                    content,
                }
            }
            "delete" => {
                let p: DeleteParams = parse(method, params)?;
                Self::Delete {
                    paths: p.paths,
                    permanent: p.permanent,
                }
            }
            "rename" => {
                let p: RenameParams = parse(method, params)?;
                Self::Rename {
                    path: p.path,
                    new_name: p.new_name,
                }
            }
            "get_drives" => Self::GetDrives,
            "get_device_info" => Self::GetDeviceInfo,
            "cancel" => {
                let p: CancelParams = parse(method, params)?;
                Self::Cancel { target: p.target }
            }
            other => return Err(ProtocolError::UnknownMethod(other.to_string())),
        };
        Ok(call)
    }

    /// Method name, for logs and metrics.
    pub fn method(&self) -> &'static str {
        match self {
            Self::ListDir(_) => "list_dir",
            Self::Stat { .. } => "stat",
            Self::StreamFile(_) => "stream_file",
            Self::CreateDir { .. } => "create_dir",
            Self::CreateFile { .. } => "create_file",
            Self::Delete { .. } => "delete",
            Self::Rename { .. } => "rename",
            Self::GetDrives => "get_drives",
            Self::GetDeviceInfo => "get_device_info",
            Self::Cancel { .. } => "cancel",
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// [`Chunk`] with its payload base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireChunk {
    pub data: String,
    pub offset: u64,
    pub total_size: u64,
    pub is_last: bool,
    pub resume_token: String,
}

impl From<Chunk> for WireChunk {
    fn from(chunk: Chunk) -> Self {
        Self {
            data: STANDARD.encode(&chunk.data),
            offset: chunk.offset,
            total_size: chunk.total_size,
            is_last: chunk.is_last,
            resume_token: chunk.resume_token,
        }
    }
}

impl WireChunk {
    /// Decoded payload.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}
