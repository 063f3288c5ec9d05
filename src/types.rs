use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Credentials for one remote host, carried per request and never persisted
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredential {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl RemoteCredential {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Splits an optional `:port` suffix off the host field
    ///
    /// Bracketed IPv6 literals (`[::1]:2222`) are supported; a bare IPv6
    /// literal is taken as a host without a port.
    pub fn host_and_port(&self, default_port: u16) -> (String, u16) {
        let host = self.host.trim();
        if let Some(rest) = host.strip_prefix('[') {
            if let Some((addr, tail)) = rest.split_once(']') {
                let port = tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(default_port);
                return (addr.to_string(), port);
            }
        }
        match host.rsplit_once(':') {
            Some((name, port)) if !name.contains(':') => match port.parse() {
                Ok(port) => (name.to_string(), port),
                Err(_) => (host.to_string(), default_port),
            },
            _ => (host.to_string(), default_port),
        }
    }
}

impl fmt::Debug for RemoteCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredential")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Type of a remote directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[serde(rename = "file")]
    Regular,
    Directory,
    Symlink,
    Other,
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: u64,
    pub modified_at: Option<SystemTime>,
    /// Lower nine permission bits (`rwxrwxrwx`)
    pub permissions: Option<u32>,
    pub file_type: FileType,
}

impl RemoteEntry {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Attributes of a single remote path
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStat {
    pub size: u64,
    pub modified_at: Option<SystemTime>,
    pub permissions: Option<u32>,
    pub uid: Option<u32>,
    pub file_type: FileType,
}

/// Configuration for SFTP client operations
#[derive(Debug, Clone)]
pub struct SftpClientConfig {
    /// Buffer size for read/write operations in bytes
    pub io_size: usize,
    /// Number of chunks allowed in flight during a transfer
    pub concurrency: usize,
    /// Upper bound for a single remote call (stat, mkdir, remove, list)
    pub operation_timeout: Duration,
    /// Upper bound for a whole-file transfer
    pub transfer_timeout: Duration,
}

impl Default for SftpClientConfig {
    /// - io_size: 65536 (64KB)
    /// - concurrency: 8
    /// - operation_timeout: 30s
    /// - transfer_timeout: 10min
    fn default() -> Self {
        Self {
            io_size: 65536,
            concurrency: 8,
            operation_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
        }
    }
}

/// Result of a file transfer operation
#[derive(Debug, Clone)]
pub enum FileTransferOperationResult {
    /// Transfer completed; carries the file size in bytes
    Completed(u64),
    /// Transfer was stopped through its cancellation token
    Cancelled { src_file: String, dest_file: String },
}

/// Internal configuration wrapper with Arc for shared ownership
#[derive(Debug, Clone)]
pub(crate) struct SftpClientConfigArc {
    pub(crate) inner: Arc<SftpClientConfig>,
}

impl From<SftpClientConfig> for SftpClientConfigArc {
    fn from(config: SftpClientConfig) -> Self {
        Self {
            inner: Arc::new(config),
        }
    }
}

impl std::ops::Deref for SftpClientConfigArc {
    type Target = SftpClientConfig;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Renders the nine permission bits as `rwxr-xr-x`
pub fn format_permissions(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}
