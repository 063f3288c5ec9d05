use std::path::Path;

use async_trait::async_trait;
use openssh_sftp_client::Sftp;
use russh::{Disconnect, client};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::DriveError;
use crate::gateway::RemoteFs;
use crate::operations::{content, download, entries, list, upload};
use crate::session::DriveHandler;
use crate::types::{
    FileTransferOperationResult, RemoteEntry, RemoteStat, SftpClientConfig, SftpClientConfigArc,
};
use crate::utils::{cancel_after, with_timeout};

/// SFTP client for performing file operations on a remote server
pub struct SftpClient {
    pub(crate) sftp: Sftp,
    pub(crate) config: SftpClientConfigArc,
    ssh: client::Handle<DriveHandler>,
    target: String,
}

impl SftpClient {
    pub(crate) fn new(
        sftp: Sftp,
        ssh: client::Handle<DriveHandler>,
        target: String,
        config: SftpClientConfig,
    ) -> Self {
        Self {
            sftp,
            config: config.into(),
            ssh,
            target,
        }
    }

    /// Closes the SFTP channel, then the SSH connection underneath it
    ///
    /// Both steps are attempted even if the first one fails.
    pub async fn close(self) -> Result<(), DriveError> {
        let sftp_result = self.sftp.close().await;
        let ssh_result = self
            .ssh
            .disconnect(Disconnect::ByApplication, "session finished", "en")
            .await;
        info!("Closed session {}", self.target);
        sftp_result.map_err(|e| DriveError::RemoteOperation(format!("closing sftp: {e}")))?;
        ssh_result.map_err(|e| DriveError::Connection(format!("closing ssh: {e}")))?;
        Ok(())
    }

    /// Uploads a local file, stopping it once the transfer deadline passes
    ///
    /// # Returns
    ///
    /// The number of bytes written to `remote_path`
    pub async fn put(&self, local_path: &Path, remote_path: &str) -> Result<u64, DriveError> {
        let cancel_token = CancellationToken::new();
        let timer = cancel_after(cancel_token.clone(), self.config.transfer_timeout);
        let result = upload::put(self, local_path, remote_path, cancel_token).await;
        timer.abort();
        self.finished_transfer(result, "upload")
    }

    /// Downloads a remote file into `local_path`, with the same deadline as [`Self::put`]
    pub async fn get(&self, remote_path: &str, local_path: &Path) -> Result<u64, DriveError> {
        let cancel_token = CancellationToken::new();
        let timer = cancel_after(cancel_token.clone(), self.config.transfer_timeout);
        let result = download::get(self, remote_path, local_path, cancel_token).await;
        timer.abort();
        self.finished_transfer(result, "download")
    }

    fn finished_transfer(
        &self,
        result: Result<FileTransferOperationResult, DriveError>,
        what: &str,
    ) -> Result<u64, DriveError> {
        match result? {
            FileTransferOperationResult::Completed(bytes) => Ok(bytes),
            FileTransferOperationResult::Cancelled {
                src_file,
                dest_file,
            } => {
                warn!("{what} {src_file} -> {dest_file} stopped at deadline");
                Err(DriveError::Timeout(format!(
                    "{what} of {src_file} exceeded {:?}",
                    self.config.transfer_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl RemoteFs for SftpClient {
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, DriveError> {
        with_timeout(self.config.operation_timeout, "list", list::ls(self, dir)).await
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, DriveError> {
        with_timeout(self.config.operation_timeout, "stat", entries::stat(self, path)).await
    }

    async fn mkdir(&self, path: &str) -> Result<(), DriveError> {
        with_timeout(self.config.operation_timeout, "mkdir", entries::mkdir(self, path)).await
    }

    async fn remove(&self, path: &str) -> Result<(), DriveError> {
        with_timeout(self.config.operation_timeout, "remove", entries::remove(self, path)).await
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64, DriveError> {
        SftpClient::put(self, local, remote).await
    }

    async fn get(&self, remote: &str, local: &Path) -> Result<u64, DriveError> {
        SftpClient::get(self, remote, local).await
    }

    async fn read(&self, remote: &str) -> Result<Vec<u8>, DriveError> {
        with_timeout(
            self.config.transfer_timeout,
            "read",
            content::read_to_end(self, remote),
        )
        .await
    }

    async fn write(&self, remote: &str, data: &[u8]) -> Result<(), DriveError> {
        with_timeout(
            self.config.transfer_timeout,
            "write",
            content::write_all(self, remote, data),
        )
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), DriveError> {
        SftpClient::close(*self).await
    }
}
