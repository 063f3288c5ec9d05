use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::SftpClient;
use crate::error::DriveError;
use crate::operations::join_error;
use crate::types::FileTransferOperationResult;

/// Uploads a local file to the remote server
///
/// Concurrent upload with ordered writes:
/// 1. Reads chunks from the local file
/// 2. Sends chunks to a writer task via MPSC channel with sequence numbers
/// 3. Writer task restores ordering with a buffer map
/// 4. Stops early when `cancel_token` fires
///
/// An existing remote file of the same name is truncated and replaced.
///
/// # Returns
///
/// - `Completed` with the number of bytes sent if successful
/// - `Cancelled` if the token fired before the end of the file
pub async fn put(
    client: &SftpClient,
    local_path: &Path,
    remote_path: &str,
    cancel_token: CancellationToken,
) -> Result<FileTransferOperationResult, DriveError> {
    let upload_time = Instant::now();
    let src_file = local_path.display().to_string();
    let mut is_cancelled = false;
    let mut local_file = fs::File::open(local_path).await?;
    let local_file_size = local_file.metadata().await?.len();
    info!("Local file opened: {src_file} ({local_file_size} bytes)");

    let (tx, mut rx) = mpsc::channel::<(usize, Vec<u8>)>(client.config.concurrency);
    let mut buffer_idx = 0;
    let mut tasks = FuturesUnordered::new();

    let mut remote_file = client.sftp.create(remote_path).await.map_err(|err| {
        error!("Failed to create remote file {remote_path}: {err:?}");
        DriveError::from_sftp(err, remote_path)
    })?;
    info!("Remote file created: {remote_path}");

    let stop_transmission = CancellationToken::new();
    let stop_transmission_child = stop_transmission.child_token();
    let dest = remote_path.to_string();

    let write_handle = tokio::spawn(async move {
        let mut current_idx = 0;
        let mut buffer_map = HashMap::new();

        while let Some((idx, buffer)) = rx.recv().await {
            if stop_transmission_child.is_cancelled() {
                warn!("transmission to {dest} stopped by reader task");
                continue;
            }
            buffer_map.insert(idx, buffer);
            while let Some(buffer) = buffer_map.remove(&current_idx) {
                remote_file
                    .write_all(&buffer)
                    .await
                    .map_err(|e| DriveError::from_sftp(e, &dest))?;
                current_idx += 1;
            }
        }
        Ok::<(), DriveError>(())
    });

    let mut upload_error: Option<DriveError> = None;
    loop {
        let mut buffer = vec![0; client.config.io_size];
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Upload of {src_file} cancelled");
                is_cancelled = true;
                stop_transmission.cancel();
                break;
            }
            read_result = local_file.read(&mut buffer[..]) => {
                let bytes_read = match read_result {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        error!("Error reading local file: {e:?}");
                        upload_error = Some(e.into());
                        stop_transmission.cancel();
                        break;
                    }
                };
                buffer.truncate(bytes_read);
                let tx = tx.clone();
                let idx = buffer_idx;
                tasks.push(tokio::spawn(async move {
                    tx.send((idx, buffer)).await.map_err(|_| {
                        DriveError::RemoteOperation("upload writer stopped early".into())
                    })
                }));
                buffer_idx += 1;

                if tasks.len() >= client.config.concurrency {
                    if let Err(e) = tasks.select_next_some().await.map_err(join_error)? {
                        upload_error = Some(e);
                        break;
                    }
                }
            }
        }
    }

    drop(tx);
    while let Some(task) = tasks.next().await {
        if let Err(e) = task.map_err(join_error)? {
            upload_error.get_or_insert(e);
        }
    }
    // writer errors take precedence over send failures
    write_handle.await.map_err(join_error)??;

    if let Some(err) = upload_error {
        return Err(err);
    }

    if is_cancelled {
        return Ok(FileTransferOperationResult::Cancelled {
            src_file,
            dest_file: remote_path.to_string(),
        });
    }

    info!(
        "File {src_file} uploaded to {remote_path}. Time taken {:?}",
        upload_time.elapsed()
    );
    Ok(FileTransferOperationResult::Completed(local_file_size))
}
