//! File streaming.

use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{FileNode, check_cancelled, send_item};
use crate::error::{FsError, FsResult};
use crate::guard::AccessGuard;
use crate::stream::plan;
use crate::types::{Chunk, StreamFileRequest, StreamSummary};
use crate::vpath::normalize_virtual;

impl FileNode {
    /// Stream a file, or a slice of it, into `sink` as ordered chunks.
    ///
    /// Holds a stream permit and the path's read lock until it returns.
    /// Every chunk carries a resume token for the offset after it. Reaching
    /// the planned end, or end of file, finishes successfully.
    pub async fn stream_file(
        &self,
        req: &StreamFileRequest,
        sink: &mpsc::Sender<Chunk>,
        cancel: &CancellationToken,
    ) -> FsResult<StreamSummary> {
        let _permit = self.governor.try_acquire()?;

        if req.length < 0 {
            return Err(FsError::invalid_argument("length must not be negative"));
        }
        let virtual_path = normalize_virtual(&req.path);
        let real = self.resolve(&virtual_path)?;

        let resume_offset = if req.resume_token.is_empty() {
            None
        } else {
            let point = self.guard.validate_resume_token(&req.resume_token)?;
            if point.virtual_path != virtual_path {
                tracing::warn!(
                    path = %virtual_path,
                    token_path = %point.virtual_path,
                    "resume token issued for a different path"
                );
                return Err(FsError::InvalidResume);
            }
            Some(point.offset)
        };

        let lock = self.guard.get_lock(&real);
        let _read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FsError::Cancelled),
            guard = lock.read() => guard,
        };

        let mut file = File::open(&real)
            .await
            .map_err(|e| FsError::from_io(e, &real))?;
        let meta = file
            .metadata()
            .await
            .map_err(|e| FsError::from_io(e, &real))?;
        if meta.is_dir() {
            return Err(FsError::invalid_argument(format!(
                "cannot stream a directory: {virtual_path}"
            )));
        }
        let total_size = meta.len();

        let offset = AccessGuard::validate_offset(resume_offset.unwrap_or(req.offset), total_size)?;
        let plan = plan(offset, req.length as u64, total_size, req.chunk_size);
        tracing::debug!(
            path = %virtual_path,
            mode = %plan.mode,
            offset = plan.offset,
            length = plan.length,
            chunk_size = plan.chunk_size,
            "stream planned"
        );

        if plan.offset > 0 {
            file.seek(SeekFrom::Start(plan.offset))
                .await
                .map_err(|e| FsError::from_io(e, &real))?;
        }

        let end = plan.end();
        let mut position = plan.offset;
        let mut chunks = 0;
        while position < end {
            check_cancelled(cancel)?;

            let want = usize::try_from(end - position)
                .unwrap_or(usize::MAX)
                .min(plan.chunk_size);
            let mut data = vec![0u8; want];
            let n = read_up_to(&mut file, &mut data)
                .await
                .map_err(|e| FsError::from_io(e, &real))?;
            if n == 0 {
                tracing::debug!(path = %virtual_path, position, "file ended before planned length");
                break;
            }
            data.truncate(n);

            let next = position + n as u64;
            let chunk = Chunk {
                data,
                offset: position,
                total_size,
                is_last: next >= end,
                resume_token: self
                    .guard
                    .create_resume_token(&virtual_path, i64::try_from(next).unwrap_or(i64::MAX)),
            };
            send_item(sink, chunk, cancel).await?;

            chunks += 1;
            position = next;
        }

        Ok(StreamSummary {
            chunks,
            bytes: position - plan.offset,
            next_offset: position,
        })
    }
}

/// Read until `buf` is full or the file ends.
async fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
