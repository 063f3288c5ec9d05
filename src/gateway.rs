//! Per-request remote sessions.
//!
//! Handlers never talk to the transport directly: they ask a [`Connector`]
//! for a [`Session`], run their remote calls against it and hand the result
//! back through [`Session::finish`], which closes the connection on every
//! path. The production connector speaks SSH + SFTP; tests plug in an
//! in-memory one.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::DriveError;
use crate::known_hosts::KnownHosts;
use crate::session::SftpSessionManager;
use crate::types::{RemoteCredential, RemoteEntry, RemoteStat, SftpClientConfig};

/// File operations available on an open remote session
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// List the entries of a directory (without `.` and `..`).
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, DriveError>;

    /// Attributes of a single path.
    async fn stat(&self, path: &str) -> Result<RemoteStat, DriveError>;

    /// Create one directory; parents must exist.
    async fn mkdir(&self, path: &str) -> Result<(), DriveError>;

    /// Remove one regular file.
    async fn remove(&self, path: &str) -> Result<(), DriveError>;

    /// Stream a local file to `remote`, replacing any existing file.
    async fn put(&self, local: &Path, remote: &str) -> Result<u64, DriveError>;

    /// Stream `remote` into a local file.
    async fn get(&self, remote: &str, local: &Path) -> Result<u64, DriveError>;

    /// Read a whole remote file into memory.
    async fn read(&self, remote: &str) -> Result<Vec<u8>, DriveError>;

    /// Create or truncate `remote` and write `data` to it.
    async fn write(&self, remote: &str, data: &[u8]) -> Result<(), DriveError>;

    /// Release the transport. Called exactly once per session.
    async fn close(self: Box<Self>) -> Result<(), DriveError>;
}

/// Opens authenticated sessions
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, credential: &RemoteCredential) -> Result<Box<dyn RemoteFs>, DriveError>;
}

/// An open session scoped to one request
pub struct Session {
    fs: Box<dyn RemoteFs>,
    label: String,
}

impl Session {
    /// Opens a session; fails before any remote call if a credential field is empty.
    pub async fn open(
        connector: &dyn Connector,
        credential: &RemoteCredential,
    ) -> Result<Self, DriveError> {
        let missing: Vec<&str> = [
            ("host", &credential.host),
            ("username", &credential.username),
            ("password", &credential.password),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(DriveError::missing(missing));
        }

        let fs = connector.open(credential).await?;
        let label = format!("{}@{}", credential.username, credential.host);
        debug!("session opened for {label}");
        Ok(Self { fs, label })
    }

    pub fn fs(&self) -> &dyn RemoteFs {
        self.fs.as_ref()
    }

    /// Closes the session and passes `result` through untouched.
    ///
    /// A failed close is logged; it never replaces the operation's outcome.
    pub async fn finish<T>(self, result: Result<T, DriveError>) -> Result<T, DriveError> {
        let Session { fs, label } = self;
        match fs.close().await {
            Ok(()) => debug!("session closed for {label}"),
            Err(e) => warn!("failed to close session for {label}: {e}"),
        }
        result
    }
}

/// Production connector: SSH password auth, then the SFTP subsystem
#[derive(Clone)]
pub struct SftpConnector {
    pub ssh_port: u16,
    pub connect_timeout: std::time::Duration,
    pub client_config: Arc<SftpClientConfig>,
    pub known_hosts: Arc<KnownHosts>,
}

#[async_trait]
impl Connector for SftpConnector {
    async fn open(&self, credential: &RemoteCredential) -> Result<Box<dyn RemoteFs>, DriveError> {
        let (host, port) = credential.host_and_port(self.ssh_port);
        let manager = SftpSessionManager::connect(
            &host,
            port,
            &credential.username,
            &credential.password,
            self.connect_timeout,
            self.known_hosts.clone(),
        )
        .await?;
        let client = manager
            .create_sftp_client(self.client_config.as_ref().clone())
            .await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryRemote, PASSWORD};

    #[test]
    fn empty_credentials_never_reach_the_connector() {
        let remote = MemoryRemote::with_user("u");
        let credential = RemoteCredential::new("host", "", "");
        let result = tokio_test::block_on(Session::open(&remote, &credential));

        match result {
            Err(DriveError::Validation { missing }) => assert_eq!(missing, vec!["username", "password"]),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("session opened without credentials"),
        }
        assert_eq!(remote.attempts(), 0);
    }

    #[test]
    fn rejected_password_is_a_connection_error() {
        let remote = MemoryRemote::with_user("u");
        let credential = RemoteCredential::new("host", "u", "wrong");
        let result = tokio_test::block_on(Session::open(&remote, &credential));
        assert!(matches!(result, Err(DriveError::Connection(_))));
        assert_eq!(remote.attempts(), 1);
        assert_eq!(remote.opens(), 0);
    }

    #[tokio::test]
    async fn finish_closes_on_failure_and_keeps_the_error() {
        let remote = MemoryRemote::with_user("u");
        let credential = RemoteCredential::new("host", "u", PASSWORD);
        let session = Session::open(&remote, &credential).await.unwrap();

        let result = session.fs().read("/home/u/uploads/missing").await;
        let result = session.finish(result).await;

        assert!(matches!(result, Err(DriveError::NotFound(_))));
        assert_eq!(remote.opens(), 1);
        assert_eq!(remote.closes(), 1);
    }
}
