// Module declarations
pub mod activity;
mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod known_hosts;
pub mod layout;
pub mod mime;
mod operations;
pub mod render;
pub mod routes;
mod session;
mod types;
mod utils;

#[cfg(test)]
mod testing;

// Public API exports
pub use activity::{Action, ActivityLog, ActivityRecord};
pub use client::SftpClient;
pub use config::Config;
pub use error::DriveError;
pub use gateway::{Connector, RemoteFs, Session, SftpConnector};
pub use session::SftpSessionManager;
pub use types::{
    FileTransferOperationResult, FileType, RemoteCredential, RemoteEntry,
    RemoteStat, SftpClientConfig, format_permissions,
};
