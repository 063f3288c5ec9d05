use bytes::BytesMut;
use tracing::debug;

use crate::client::SftpClient;
use crate::error::DriveError;

/// Reads a whole remote file into memory
pub async fn read_to_end(client: &SftpClient, remote_path: &str) -> Result<Vec<u8>, DriveError> {
    let mut remote_file = client
        .sftp
        .open(remote_path)
        .await
        .map_err(|e| DriveError::from_sftp(e, remote_path))?;

    let mut content = Vec::new();
    loop {
        let buffer = BytesMut::with_capacity(client.config.io_size);
        match remote_file
            .read(client.config.io_size as u32, buffer)
            .await
            .map_err(|e| DriveError::from_sftp(e, remote_path))?
        {
            Some(chunk) => content.extend_from_slice(&chunk),
            None => break,
        }
    }
    debug!("Read {} bytes from {remote_path}", content.len());
    Ok(content)
}

/// Creates or truncates `remote_path` and writes `data` in `io_size` chunks
pub async fn write_all(
    client: &SftpClient,
    remote_path: &str,
    data: &[u8],
) -> Result<(), DriveError> {
    let mut remote_file = client
        .sftp
        .create(remote_path)
        .await
        .map_err(|e| DriveError::from_sftp(e, remote_path))?;

    for chunk in data.chunks(client.config.io_size.max(1)) {
        remote_file
            .write_all(chunk)
            .await
            .map_err(|e| DriveError::from_sftp(e, remote_path))?;
    }
    debug!("Wrote {} bytes to {remote_path}", data.len());
    Ok(())
}
