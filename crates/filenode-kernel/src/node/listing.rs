//! Directory listing and stat.

use std::cmp::Ordering;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{FileNode, check_cancelled, send_item, virtual_name};
use crate::config::{DEFAULT_PAGE_SIZE, MAX_ENTRIES_PER_PAGE};
use crate::error::{FsError, FsResult};
use crate::guard::{decode_page_token, encode_page_token};
use crate::provider::FileMeta;
use crate::types::{Entry, FileInfo, ListDirRequest, ListSummary, SortBy, SortOrder};
use crate::vpath::{join_virtual, normalize_virtual};

/// Entries processed between cancellation checks while building a listing.
const CANCEL_CHECK_INTERVAL: usize = 100;

impl FileNode {
    /// Stream one page of a directory listing into `sink`.
    ///
    /// The listing is recomputed on every call, so page tokens index into a
    /// fresh snapshot; a directory mutated between pages may shift entries.
    pub async fn list_dir(
        &self,
        req: &ListDirRequest,
        sink: &mpsc::Sender<Entry>,
        cancel: &CancellationToken,
    ) -> FsResult<ListSummary> {
        let virtual_dir = normalize_virtual(&req.path);
        let real = self.resolve(&virtual_dir)?;
        let start = decode_page_token(&req.page_token)?;

        let dir_meta = self.metadata.stat(&real).await?;
        if !dir_meta.is_dir {
            return Err(FsError::invalid_argument(format!(
                "not a directory: {virtual_dir}"
            )));
        }

        let names = self
            .metadata
            .read_dir(&real, req.show_hidden, self.config.max_listing_entries)
            .await?;

        let mut entries = Vec::with_capacity(names.len());
        for (i, name) in names.into_iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 {
                check_cancelled(cancel)?;
            }
            let child = real.join(&name);
            let meta = match self.metadata.stat(&child).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!(path = %child.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let virtual_path = join_virtual(&virtual_dir, &name);
            entries.push(self.build_entry(virtual_path, name, &child, &meta).await);
        }

        sort_entries(&mut entries, req.sort_by, req.sort_order);

        let total = entries.len();
        if start >= total {
            return Ok(ListSummary {
                sent: 0,
                total,
                next_page_token: None,
            });
        }

        let end = start.saturating_add(page_size(req.page_size)).min(total);
        for entry in entries.drain(start..end) {
            send_item(sink, entry, cancel).await?;
        }

        tracing::debug!(path = %virtual_dir, start, end, total, "listed directory");
        Ok(ListSummary {
            sent: end - start,
            total,
            next_page_token: (end < total).then(|| encode_page_token(end)),
        })
    }

    /// Metadata snapshot of one path. Takes no lock.
    pub async fn stat(&self, path: &str) -> FsResult<FileInfo> {
        let virtual_path = normalize_virtual(path);
        let real = self.resolve(&virtual_path)?;
        let meta = self.metadata.stat(&real).await?;

        let name = virtual_name(&virtual_path).to_string();
        let entry = self.build_entry(virtual_path, name, &real, &meta).await;

        Ok(FileInfo {
            entry,
            created_at_millis: meta.created_millis,
            accessed_at_millis: meta.accessed_millis,
            is_locked: self.guard.locks().is_held(&real),
            locked_by: String::new(),
            checksum: String::new(),
        })
    }

    async fn build_entry(&self, virtual_path: String, name: String, real: &Path, meta: &FileMeta) -> Entry {
        let extension = if meta.is_dir {
            String::new()
        } else {
            Path::new(&name)
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        Entry {
            id: virtual_path.clone(),
            is_hidden: name.starts_with('.') || meta.is_hidden,
            name,
            path: virtual_path,
            is_dir: meta.is_dir,
            size: meta.size,
            modified_at_millis: meta.modified_millis,
            extension,
            mime_type: self.metadata.mime_type(real).await,
            is_readonly: meta.is_readonly,
        }
    }
}

/// Requested page size with the default applied and the maximum enforced.
fn page_size(requested: usize) -> usize {
    match requested {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_ENTRIES_PER_PAGE),
    }
}

/// Directories first, then by key. Descending reverses the key comparison
/// only; directories stay on top.
fn sort_entries(entries: &mut [Entry], sort_by: SortBy, order: SortOrder) {
    entries.sort_by(|a, b| {
        b.is_dir.cmp(&a.is_dir).then_with(|| {
            let ord = compare_by(a, b, sort_by);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        })
    });
}

fn compare_by(a: &Entry, b: &Entry, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortBy::Size => a.size.cmp(&b.size),
        SortBy::Modified => a.modified_at_millis.cmp(&b.modified_at_millis),
        SortBy::Type => a.extension.cmp(&b.extension),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use tempfile::TempDir;

    fn setup() -> (FileNode, TempDir) {
        let dir = TempDir::new().unwrap();
        let node = FileNode::new(NodeConfig::default().with_mount("/test", dir.path())).unwrap();
        (node, dir)
    }

    async fn collect(node: &FileNode, req: &ListDirRequest) -> FsResult<(Vec<Entry>, ListSummary)> {
        let (tx, mut rx) = mpsc::channel(MAX_ENTRIES_PER_PAGE + 1);
        let summary = node.list_dir(req, &tx, &CancellationToken::new()).await?;
        drop(tx);
        let mut out = Vec::new();
        while let Some(entry) = rx.recv().await {
            out.push(entry);
        }
        Ok((out, summary))
    }

    fn entry(name: &str, is_dir: bool, size: u64) -> Entry {
        Entry {
            id: name.to_string(),
            name: name.to_string(),
            path: name.to_string(),
            is_dir,
            size,
            modified_at_millis: 0,
            extension: String::new(),
            mime_type: String::new(),
            is_hidden: false,
            is_readonly: false,
        }
    }

    #[test]
    fn test_sort_dirs_first() {
        let mut entries = vec![
            entry("b.txt", false, 1),
            entry("Zeta", true, 0),
            entry("a.txt", false, 3),
            entry("alpha", true, 0),
        ];
        sort_entries(&mut entries, SortBy::Name, SortOrder::Asc);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Zeta", "a.txt", "b.txt"]);

        sort_entries(&mut entries, SortBy::Name, SortOrder::Desc);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "alpha", "b.txt", "a.txt"]);

        sort_entries(&mut entries, SortBy::Size, SortOrder::Desc);
        assert_eq!(entries[2].name, "a.txt");
    }

    #[test]
    fn test_page_size() {
        assert_eq!(page_size(0), DEFAULT_PAGE_SIZE);
        assert_eq!(page_size(10), 10);
        assert_eq!(page_size(5000), MAX_ENTRIES_PER_PAGE);
    }

    #[tokio::test]
    async fn test_list_with_hidden() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("visible.txt"), b"abc").unwrap();
        std::fs::write(dir.path().join(".secret"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let (entries, summary) = collect(&node, &ListDirRequest::new("/test")).await.unwrap();
        assert_eq!(summary.total, 2);
        assert!(summary.next_page_token.is_none());
        assert_eq!(entries[0].name, "sub");
        assert_eq!(entries[0].extension, "");
        assert_eq!(entries[1].path, "/test/visible.txt");
        assert_eq!(entries[1].extension, "txt");
        assert_eq!(entries[1].mime_type, "text/plain");
        assert_eq!(entries[1].size, 3);

        let req = ListDirRequest {
            show_hidden: true,
            ..ListDirRequest::new("/test/")
        };
        let (entries, _) = collect(&node, &req).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|e| e.name == ".secret" && e.is_hidden));
    }

    #[tokio::test]
    async fn test_list_errors() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("file"), b"").unwrap();

        let err = collect(&node, &ListDirRequest::new("/test/file")).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));

        let err = collect(&node, &ListDirRequest::new("/test/missing")).await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));

        let err = collect(&node, &ListDirRequest::new("/")).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidArgument(_)));

        let req = ListDirRequest {
            page_token: "invalid_token_format".to_string(),
            ..ListDirRequest::new("/test")
        };
        let err = collect(&node, &req).await.unwrap_err();
        assert!(matches!(err, FsError::InvalidPageToken));
    }

    #[tokio::test]
    async fn test_page_past_end_is_empty() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("one"), b"").unwrap();

        let req = ListDirRequest {
            page_token: encode_page_token(50),
            ..ListDirRequest::new("/test")
        };
        let (entries, summary) = collect(&node, &req).await.unwrap();
        assert!(entries.is_empty());
        assert_eq!(summary.sent, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("one"), b"").unwrap();

        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = node
            .list_dir(&ListDirRequest::new("/test"), &tx, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_stat() {
        let (node, dir) = setup();
        std::fs::write(dir.path().join("notes.md"), b"# notes").unwrap();

        let info = node.stat("/test/notes.md").await.unwrap();
        assert_eq!(info.entry.name, "notes.md");
        assert_eq!(info.entry.id, "/test/notes.md");
        assert_eq!(info.entry.mime_type, "text/markdown");
        assert!(!info.is_locked);
        assert!(info.checksum.is_empty());

        let root = node.stat("/test").await.unwrap();
        assert!(root.entry.is_dir);
        assert_eq!(root.entry.name, "test");

        let real = dir.path().join("notes.md");
        let _reader = node.guard().get_lock(&real).read().await;
        assert!(node.stat("/test/notes.md").await.unwrap().is_locked);

        assert!(matches!(
            node.stat("/test/nope").await,
            Err(FsError::NotFound(_))
        ));
    }
}
