//! Download state machine
//!
//! metadata → existing-file check → ranged GET from the local length →
//! append + flush per chunk. Bytes already flushed stay on disk when the
//! stream breaks, so running the same download again resumes it.

use bytes::BytesMut;
use c189_api::wire::absolute_url;
use c189_api::{CloudApi, DownloadResponse};
use c189_chunks::choose_chunk_size;
use c189_core::{ProgressEvent, ProgressFn, TerminalTag, TransferCode};
use futures::StreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

fn emit(progress: Option<&ProgressFn>, event: ProgressEvent) {
    if let Some(cb) = progress {
        cb(&event);
    }
}

fn terminal(progress: Option<&ProgressFn>, name: &str, tag: TerminalTag) {
    emit(
        progress,
        ProgressEvent::Terminal {
            name: name.to_string(),
            tag,
        },
    );
}

fn fail(progress: Option<&ProgressFn>, name: &str, code: TransferCode) -> TransferCode {
    terminal(progress, name, TerminalTag::Error);
    code
}

/// Download file `fid` into `save_dir`, resuming a partial local copy.
pub async fn down_file_by_id(
    api: &dyn CloudApi,
    fid: &str,
    save_dir: &Path,
    progress: Option<&ProgressFn>,
) -> TransferCode {
    let record = match api.file_info(fid).await {
        Ok(r) => r,
        Err(e) => {
            warn!(fid, "file metadata failed: {e}");
            return fail(progress, fid, e.to_code(TransferCode::Failed));
        }
    };
    let Some(url) = record.download_url.as_deref().filter(|_| !record.is_folder) else {
        warn!(fid, name = %record.name, "no download url (folder?)");
        return fail(progress, &record.name, TransferCode::Failed);
    };
    let url = absolute_url(url);

    if let Err(e) = tokio::fs::create_dir_all(save_dir).await {
        warn!(dir = %save_dir.display(), "cannot create save dir: {e}");
        return fail(progress, &record.name, TransferCode::PathError);
    }
    let dest = save_dir.join(&record.name);
    let local_len = tokio::fs::metadata(&dest).await.map(|m| m.len()).ok();

    if let Some(len) = local_len {
        if len >= record.size {
            debug!(path = %dest.display(), "already downloaded");
            terminal(progress, &record.name, TerminalTag::Exists);
            return TransferCode::Success;
        }
    }

    let offset = local_len.unwrap_or(0);
    debug!(fid, path = %dest.display(), offset, total = record.size, "starting download");
    let resp = match api.open_download(&url, offset).await {
        Ok(r) => r,
        Err(e) => {
            warn!(fid, "download request failed: {e}");
            return fail(progress, &record.name, e.to_code(TransferCode::Failed));
        }
    };

    let offset = if offset > 0 && !resp.partial {
        warn!(path = %dest.display(), "server ignored range, restarting from zero");
        0
    } else {
        offset
    };
    write_stream(resp, &dest, &record.name, offset, Some(record.size), progress).await
}

/// Download folder `fid` as a server-built zip archive.
///
/// The archive size is usually unknown, so the local file always starts
/// fresh.
pub async fn down_dir_zip_by_id(
    api: &dyn CloudApi,
    fid: &str,
    save_dir: &Path,
    progress: Option<&ProgressFn>,
) -> TransferCode {
    let url = match api.folder_zip_url(fid).await {
        Ok(u) => u,
        Err(e) => {
            warn!(fid, "zip redirect failed: {e}");
            return fail(progress, fid, e.to_code(TransferCode::Failed));
        }
    };
    let resp = match api.open_download(&url, 0).await {
        Ok(r) => r,
        Err(e) => {
            warn!(fid, "zip download request failed: {e}");
            return fail(progress, fid, e.to_code(TransferCode::Failed));
        }
    };
    let Some(name) = resp.file_name.clone() else {
        warn!(fid, "zip reply has no file name");
        return fail(progress, fid, TransferCode::Failed);
    };

    if let Err(e) = tokio::fs::create_dir_all(save_dir).await {
        warn!(dir = %save_dir.display(), "cannot create save dir: {e}");
        return fail(progress, &name, TransferCode::PathError);
    }
    let total = resp.content_length;
    write_stream(resp, &save_dir.join(&name), &name, 0, total, progress).await
}

/// Write the response body at `offset` (truncating when zero), flushing and
/// reporting after every chunk.
async fn write_stream(
    resp: DownloadResponse,
    dest: &Path,
    name: &str,
    offset: u64,
    total: Option<u64>,
    progress: Option<&ProgressFn>,
) -> TransferCode {
    let mut opts = tokio::fs::OpenOptions::new();
    opts.create(true);
    if offset > 0 {
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    let mut file = match opts.open(dest).await {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %dest.display(), "cannot open destination: {e}");
            return fail(progress, name, TransferCode::PathError);
        }
    };

    let chunk_size = choose_chunk_size(total);
    let mut body = resp.body;
    let mut buf = BytesMut::with_capacity(chunk_size);
    let mut done = offset;
    let mut stream_error = None;

    loop {
        let next = body.next().await;
        let end = match next {
            Some(Ok(bytes)) => {
                buf.extend_from_slice(&bytes);
                false
            }
            Some(Err(e)) => {
                stream_error = Some(e);
                true
            }
            None => true,
        };

        if buf.len() >= chunk_size || (end && !buf.is_empty()) {
            let chunk = buf.split();
            if let Err(e) = write_chunk(&mut file, &chunk).await {
                warn!(path = %dest.display(), "write failed: {e}");
                return fail(progress, name, TransferCode::Failed);
            }
            done += chunk.len() as u64;
            emit(
                progress,
                ProgressEvent::Bytes {
                    name: name.to_string(),
                    done,
                    total,
                },
            );
        }

        if end {
            break;
        }
    }

    if let Some(e) = stream_error {
        warn!(path = %dest.display(), done, "download interrupted: {e}");
        return fail(progress, name, e.to_code(TransferCode::Failed));
    }

    match total {
        Some(t) if done < t => {
            warn!(path = %dest.display(), done, total = t, "download ended short");
            return fail(progress, name, TransferCode::Failed);
        }
        Some(_) => {}
        None => emit(
            progress,
            ProgressEvent::Bytes {
                name: name.to_string(),
                done,
                total: Some(done),
            },
        ),
    }

    terminal(progress, name, TerminalTag::Done);
    info!(path = %dest.display(), bytes = done, "download finished");
    TransferCode::Success
}

async fn write_chunk(file: &mut tokio::fs::File, chunk: &[u8]) -> std::io::Result<()> {
    file.write_all(chunk).await?;
    file.flush().await
}
