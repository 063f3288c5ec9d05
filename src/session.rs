use std::sync::Arc;
use std::time::Duration;

use openssh_sftp_client::{Sftp, SftpOptions};
use russh::client;
use russh::keys::{PublicKey, PublicKeyBase64};
use tracing::{debug, info, warn};

use crate::client::SftpClient;
use crate::error::DriveError;
use crate::known_hosts::KnownHosts;
use crate::types::SftpClientConfig;

/// russh callbacks for a drive connection
///
/// Server keys go through the [`KnownHosts`] policy before any credential is sent.
pub(crate) struct DriveHandler {
    host: String,
    port: u16,
    known_hosts: Arc<KnownHosts>,
}

impl client::Handler for DriveHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let algorithm = server_public_key.algorithm();
        let key_data = server_public_key.public_key_base64();
        match self
            .known_hosts
            .verify(&self.host, self.port, algorithm.as_str(), &key_data)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Refusing {}:{}: {e}", self.host, self.port);
                Ok(false)
            }
        }
    }
}

/// One authenticated SSH connection, ready to host an SFTP client
pub struct SftpSessionManager {
    handle: client::Handle<DriveHandler>,
    target: String,
}

impl SftpSessionManager {
    /// Establishes a new SSH connection and authenticates with a password
    ///
    /// # Errors
    ///
    /// - `Timeout` when the handshake does not finish within `connect_timeout`
    /// - `Connection` when the host is unreachable, the port is closed,
    ///   the host key is refused, the handshake fails or the password is rejected
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        connect_timeout: Duration,
        known_hosts: Arc<KnownHosts>,
    ) -> Result<Self, DriveError> {
        let target = format!("{username}@{host}:{port}");
        info!("Connecting to {target}");

        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(300)),
            ..Default::default()
        };
        let handler = DriveHandler {
            host: host.to_string(),
            port,
            known_hosts,
        };

        let mut handle = tokio::time::timeout(
            connect_timeout,
            client::connect(Arc::new(config), (host, port), handler),
        )
        .await
        .map_err(|_| DriveError::Timeout(format!("connecting to {host}:{port}")))?
        .map_err(|e| DriveError::Connection(format!("{host}:{port}: {e}")))?;
        debug!("SSH handshake completed for {target}");

        let auth = tokio::time::timeout(
            connect_timeout,
            handle.authenticate_password(username, password),
        )
        .await
        .map_err(|_| DriveError::Timeout(format!("authenticating {target}")))?
        .map_err(|e| DriveError::Connection(format!("authentication error: {e}")))?;

        if !auth.success() {
            warn!("Password rejected for {target}");
            return Err(DriveError::Connection(format!(
                "authentication rejected for {username}@{host}"
            )));
        }
        info!("Authenticated {target}");

        Ok(Self { handle, target })
    }

    /// Opens the SFTP subsystem on a fresh channel
    ///
    /// The returned client owns the SSH connection; closing the client
    /// tears the connection down.
    pub async fn create_sftp_client(
        self,
        config: SftpClientConfig,
    ) -> Result<SftpClient, DriveError> {
        debug!("Creating sftp client for {}", self.target);
        let subsystem_error =
            |e: russh::Error| DriveError::Connection(format!("sftp subsystem unavailable: {e}"));

        let channel = self.handle.channel_open_session().await.map_err(subsystem_error)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(subsystem_error)?;

        let (reader, writer) = tokio::io::split(channel.into_stream());
        let sftp = Sftp::new(writer, reader, SftpOptions::default())
            .await
            .map_err(|e| DriveError::Connection(format!("sftp handshake failed: {e}")))?;
        debug!("sftp client created successfully for {}", self.target);

        Ok(SftpClient::new(sftp, self.handle, self.target, config))
    }
}
