//! Local filesystem metadata provider.

use async_trait::async_trait;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncReadExt;

use super::{FileMeta, MetadataProvider};
use crate::error::{FsError, FsResult};

/// Bytes read from the head of a file for content sniffing.
const SNIFF_LEN: usize = 261;

const OCTET_STREAM: &str = "application/octet-stream";

const EXTENSION_MIME_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("rar", "application/x-rar-compressed"),
    ("7z", "application/x-7z-compressed"),
    ("tar", "application/x-tar"),
    ("gz", "application/gzip"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("bmp", "image/bmp"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("mp4", "video/mp4"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("go", "text/x-go"),
    ("py", "text/x-python"),
    ("rs", "text/x-rust"),
    ("java", "text/x-java"),
    ("c", "text/x-c"),
    ("cpp", "text/x-c++"),
    ("h", "text/x-c"),
    ("md", "text/markdown"),
    ("yaml", "text/yaml"),
    ("yml", "text/yaml"),
    ("toml", "text/toml"),
];

/// [`MetadataProvider`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalMetadata;

impl LocalMetadata {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataProvider for LocalMetadata {
    async fn stat(&self, path: &Path) -> FsResult<FileMeta> {
        let meta = fs::metadata(path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;
        Ok(to_file_meta(&meta))
    }

    async fn read_dir(&self, path: &Path, show_hidden: bool, limit: usize) -> FsResult<Vec<String>> {
        let mut dir = fs::read_dir(path)
            .await
            .map_err(|e| FsError::from_io(e, path))?;

        let mut names = Vec::new();
        while names.len() < limit {
            let Some(entry) = dir.next_entry().await.map_err(|e| FsError::from_io(e, path))? else {
                break;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    async fn mime_type(&self, path: &Path) -> String {
        if let Some(mime) = mime_from_extension(path) {
            return mime.to_string();
        }

        let Ok(mut file) = fs::File::open(path).await else {
            return OCTET_STREAM.to_string();
        };
        let mut head = vec![0u8; SNIFF_LEN];
        let n = match file.read(&mut head).await {
            Ok(0) | Err(_) => return OCTET_STREAM.to_string(),
            Ok(n) => n,
        };
        sniff(&head[..n]).to_string()
    }
}

/// MIME type from the file extension alone.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    EXTENSION_MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Classify content from its first bytes: known signatures first, then a
/// NUL-byte check for text.
fn sniff(head: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(head) {
        return kind.mime_type();
    }
    if looks_like_text(head) {
        "text/plain"
    } else {
        OCTET_STREAM
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    !head.contains(&0)
}

fn to_file_meta(meta: &std::fs::Metadata) -> FileMeta {
    FileMeta {
        is_dir: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified_millis: millis(meta.modified().ok()),
        created_millis: millis(meta.created().ok()),
        accessed_millis: millis(meta.accessed().ok()),
        is_readonly: meta.permissions().readonly(),
        is_hidden: has_hidden_attribute(meta),
    }
}

/// Milliseconds since the Unix epoch, or 0 when unavailable.
fn millis(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(windows)]
fn has_hidden_attribute(meta: &std::fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn has_hidden_attribute(_meta: &std::fs::Metadata) -> bool {
    false
}
