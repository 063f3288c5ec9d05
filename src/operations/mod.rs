use tokio::task::JoinError;

use crate::error::DriveError;

/// Module for reading and writing whole remote files
pub(crate) mod content;

/// Module for downloading files from remote server
pub(crate) mod download;

/// Module for single-path metadata, mkdir and remove
pub(crate) mod entries;

/// Module for listing remote directory contents
pub(crate) mod list;

/// Module for uploading files to remote server
pub(crate) mod upload;

pub(crate) fn join_error(e: JoinError) -> DriveError {
    DriveError::RemoteOperation(format!("transfer task failed: {e}"))
}
