use futures::stream::StreamExt;
use tracing::debug;

use crate::client::SftpClient;
use crate::error::DriveError;
use crate::operations::entries::{convert_file_type, mode_bits};
use crate::types::RemoteEntry;

/// Lists the contents of a remote directory
///
/// Regular files, directories and symlinks are all reported; `.` and `..`
/// are skipped.
///
/// # Errors
///
/// Returns an error if:
/// - The remote directory cannot be opened (`NotFound` when it is absent)
/// - There's an error reading directory entries
pub async fn ls(client: &SftpClient, remote_dir: &str) -> Result<Vec<RemoteEntry>, DriveError> {
    let dir = client
        .sftp
        .fs()
        .open_dir(remote_dir)
        .await
        .map_err(|e| DriveError::from_sftp(e, remote_dir))?;

    let dir_stream = dir.read_dir();
    futures::pin_mut!(dir_stream);

    let mut entries = Vec::new();
    while let Some(entry) = dir_stream.next().await {
        let entry = entry.map_err(|e| {
            DriveError::RemoteOperation(format!("Failed to read remote directory {remote_dir}: {e}"))
        })?;
        let Some(file_name) = entry.filename().file_name() else {
            continue;
        };
        let name = file_name.to_string_lossy().into_owned();
        if name == "." || name == ".." {
            continue;
        }
        let metadata = entry.metadata();
        entries.push(RemoteEntry {
            name,
            size: metadata.len().unwrap_or(0),
            modified_at: metadata.modified().map(|t| t.as_system_time()),
            permissions: metadata.permissions().map(mode_bits),
            file_type: convert_file_type(entry.file_type()),
        });
    }

    debug!("Listed {} entries in {remote_dir}", entries.len());
    Ok(entries)
}
