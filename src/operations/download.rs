use bytes::BytesMut;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::SftpClient;
use crate::error::DriveError;
use crate::operations::join_error;
use crate::types::FileTransferOperationResult;

/// Downloads a file from the remote server to local storage
///
/// Concurrent download with ordered writes:
/// 1. Reads chunks from the remote file
/// 2. Sends chunks to a writer task via MPSC channel with sequence numbers
/// 3. Writer task restores ordering with a buffer map
/// 4. Creates parent directories for the local file
/// 5. Stops early when `cancel_token` fires
///
/// # Errors
///
/// - `NotFound` if the remote file does not exist
/// - `RemoteOperation` if reading fails midway or the local file cannot be written
pub async fn get(
    client: &SftpClient,
    remote_path: &str,
    local_path: &Path,
    cancel_token: CancellationToken,
) -> Result<FileTransferOperationResult, DriveError> {
    let download_time = Instant::now();
    let dest_file = local_path.display().to_string();
    let mut is_cancelled = false;
    let mut remote_file = client
        .sftp
        .open(remote_path)
        .await
        .map_err(|e| DriveError::from_sftp(e, remote_path))?;
    info!("Remote file opened: {remote_path}");
    let remote_file_size = remote_file
        .metadata()
        .await
        .map_err(|e| DriveError::from_sftp(e, remote_path))?
        .len();

    let (tx, mut rx) = mpsc::channel::<(usize, Vec<u8>)>(client.config.concurrency);
    let mut buffer_idx = 0;
    let mut tasks = FuturesUnordered::new();

    let local: PathBuf = local_path.to_path_buf();
    let write_handle: JoinHandle<Result<u64, DriveError>> = tokio::spawn(async move {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut local_file = fs::File::create(&local).await?;
        let mut written = 0u64;
        let mut buffer_map = HashMap::new();
        let mut current_idx = 0;

        while let Some((idx, buffer)) = rx.recv().await {
            buffer_map.insert(idx, buffer);
            while let Some(buffer) = buffer_map.remove(&current_idx) {
                local_file.write_all(&buffer).await?;
                written += buffer.len() as u64;
                current_idx += 1;
            }
        }
        local_file.flush().await?;
        Ok(written)
    });

    let mut download_error: Option<DriveError> = None;
    loop {
        let buffer = BytesMut::with_capacity(client.config.io_size);
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Download of {remote_path} cancelled");
                is_cancelled = true;
                break;
            }
            read_result = remote_file.read(client.config.io_size as u32, buffer) => {
                let buf = match read_result {
                    Ok(Some(buf)) => buf,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Error reading remote file {remote_path}: {e:?}");
                        download_error = Some(DriveError::from_sftp(e, remote_path));
                        break;
                    }
                };
                let tx = tx.clone();
                let idx = buffer_idx;
                let data = buf.to_vec();
                tasks.push(tokio::spawn(async move {
                    tx.send((idx, data)).await.map_err(|_| {
                        DriveError::RemoteOperation("download writer stopped early".into())
                    })
                }));
                buffer_idx += 1;
                if tasks.len() >= client.config.concurrency {
                    if let Err(e) = tasks.select_next_some().await.map_err(join_error)? {
                        download_error = Some(e);
                        break;
                    }
                }
            }
        }
    }

    drop(tx);
    while let Some(task) = tasks.next().await {
        if let Err(e) = task.map_err(join_error)? {
            download_error.get_or_insert(e);
        }
    }
    let written = write_handle.await.map_err(join_error)??;

    if let Some(err) = download_error {
        return Err(err);
    }

    if is_cancelled {
        return Ok(FileTransferOperationResult::Cancelled {
            src_file: remote_path.to_string(),
            dest_file,
        });
    }

    info!(
        "File {remote_path} downloaded. Time taken {:?}",
        download_time.elapsed()
    );
    Ok(FileTransferOperationResult::Completed(
        remote_file_size.unwrap_or(written),
    ))
}
