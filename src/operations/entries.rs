use openssh_sftp_client::metadata::{FileType as SftpFileType, Permissions};
use tracing::info;

use crate::client::SftpClient;
use crate::error::DriveError;
use crate::types::{FileType, RemoteStat};

/// Attributes of one remote path
pub async fn stat(client: &SftpClient, path: &str) -> Result<RemoteStat, DriveError> {
    let metadata = client
        .sftp
        .fs()
        .metadata(path)
        .await
        .map_err(|e| DriveError::from_sftp(e, path))?;

    Ok(RemoteStat {
        size: metadata.len().unwrap_or(0),
        modified_at: metadata.modified().map(|t| t.as_system_time()),
        permissions: metadata.permissions().map(mode_bits),
        uid: metadata.uid(),
        file_type: convert_file_type(metadata.file_type()),
    })
}

/// Creates one directory; the parent must already exist
pub async fn mkdir(client: &SftpClient, path: &str) -> Result<(), DriveError> {
    client
        .sftp
        .fs()
        .create_dir(path)
        .await
        .map_err(|e| DriveError::from_sftp(e, path))?;
    info!("Remote directory created: {path}");
    Ok(())
}

/// Removes one remote file
pub async fn remove(client: &SftpClient, path: &str) -> Result<(), DriveError> {
    client
        .sftp
        .fs()
        .remove_file(path)
        .await
        .map_err(|e| DriveError::from_sftp(e, path))?;
    info!("Remote file removed: {path}");
    Ok(())
}

pub(crate) fn convert_file_type(file_type: Option<SftpFileType>) -> FileType {
    match file_type {
        Some(t) if t.is_dir() => FileType::Directory,
        Some(t) if t.is_file() => FileType::Regular,
        Some(t) if t.is_symlink() => FileType::Symlink,
        _ => FileType::Other,
    }
}

/// Packs the rwx flags for owner, group and other into the usual octal layout
pub(crate) fn mode_bits(perm: Permissions) -> u32 {
    let flags = [
        (perm.read_by_owner(), 0o400),
        (perm.write_by_owner(), 0o200),
        (perm.execute_by_owner(), 0o100),
        (perm.read_by_group(), 0o040),
        (perm.write_by_group(), 0o020),
        (perm.execute_by_group(), 0o010),
        (perm.read_by_other(), 0o004),
        (perm.write_by_other(), 0o002),
        (perm.execute_by_other(), 0o001),
    ];
    flags
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |mode, (_, bit)| mode | bit)
}
