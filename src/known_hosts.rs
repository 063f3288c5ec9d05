//! Host key pinning for drive connections.
//!
//! Entries use the OpenSSH `known_hosts` line layout
//! (`host keytype base64key`, `[host]:port` for non-default ports), so an
//! operator can pre-seed the file with `ssh-keyscan`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DriveError;

/// What to do with a server key that is not pinned yet, or that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Trust every key and never pin. Only for lab setups.
    AcceptAny,
    /// Pin the first key seen for a host; reject a different one later
    #[default]
    AcceptNew,
    /// Only hosts already present in the file are accepted
    Strict,
}

/// Outcome of comparing a server key against the pinned ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyCheck {
    Known,
    Unknown,
    Changed,
}

#[derive(Debug, Clone)]
struct PinnedKey {
    key_type: String,
    key_data: String,
}

pub struct KnownHosts {
    path: PathBuf,
    policy: HostKeyPolicy,
    hosts: Mutex<HashMap<String, Vec<PinnedKey>>>,
}

impl KnownHosts {
    /// Loads `path`; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>, policy: HostKeyPolicy) -> Result<Self, DriveError> {
        let path = path.into();
        let hosts = match std::fs::read_to_string(&path) {
            Ok(contents) => parse(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(DriveError::Persistence(format!(
                    "cannot read known hosts {}: {e}",
                    path.display()
                )));
            }
        };
        debug!("Loaded {} known hosts from {}", hosts.len(), path.display());
        Ok(Self {
            path,
            policy,
            hosts: Mutex::new(hosts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> HostKeyPolicy {
        self.policy
    }

    /// Applies the policy to a key presented by `host:port`
    ///
    /// Under `AcceptNew` an unknown key is appended to the file before the
    /// connection proceeds. The lock is held across check and append, so two
    /// first connections to one host pin a single key.
    pub async fn verify(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_data: &str,
    ) -> Result<(), DriveError> {
        let lookup = host_entry(host, port);
        let mut hosts = self.hosts.lock().await;
        let check = compare(hosts.get(&lookup), key_type, key_data);

        match (self.policy, check) {
            (_, HostKeyCheck::Known) => {
                debug!("Host key verified for {lookup} ({key_type})");
                Ok(())
            }
            (HostKeyPolicy::AcceptAny, check) => {
                debug!("Accepting {key_type} key from {lookup} without pinning ({check:?})");
                Ok(())
            }
            (_, HostKeyCheck::Changed) => {
                warn!("Host key for {lookup} ({key_type}) does not match the pinned key");
                Err(DriveError::Connection(format!(
                    "host key for {lookup} changed; refusing to send credentials"
                )))
            }
            (HostKeyPolicy::Strict, HostKeyCheck::Unknown) => {
                warn!("Rejecting unknown host {lookup} under strict host key policy");
                Err(DriveError::Connection(format!(
                    "host {lookup} is not in {}",
                    self.path.display()
                )))
            }
            (HostKeyPolicy::AcceptNew, HostKeyCheck::Unknown) => {
                self.append(&lookup, key_type, key_data).await?;
                hosts.entry(lookup.clone()).or_default().push(PinnedKey {
                    key_type: key_type.to_string(),
                    key_data: key_data.to_string(),
                });
                info!("Pinned {key_type} host key for {lookup}");
                Ok(())
            }
        }
    }

    async fn append(&self, lookup: &str, key_type: &str, key_data: &str) -> Result<(), DriveError> {
        let persist_err = |e: std::io::Error| {
            DriveError::Persistence(format!("cannot write {}: {e}", self.path.display()))
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(persist_err)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(persist_err)?;
        file.write_all(format!("{lookup} {key_type} {key_data}\n").as_bytes())
            .await
            .map_err(persist_err)?;
        file.flush().await.map_err(persist_err)
    }
}

/// `host` on port 22, `[host]:port` otherwise
fn host_entry(host: &str, port: u16) -> String {
    let host = host.to_lowercase();
    if port == 22 {
        host
    } else {
        format!("[{host}]:{port}")
    }
}

fn compare(pinned: Option<&Vec<PinnedKey>>, key_type: &str, key_data: &str) -> HostKeyCheck {
    let Some(entries) = pinned else {
        return HostKeyCheck::Unknown;
    };
    match entries.iter().find(|e| e.key_type == key_type) {
        Some(entry) if entry.key_data == key_data => HostKeyCheck::Known,
        Some(_) => HostKeyCheck::Changed,
        // host known, but not for this key type
        None => HostKeyCheck::Unknown,
    }
}

fn parse(contents: &str) -> HashMap<String, Vec<PinnedKey>> {
    let mut hosts: HashMap<String, Vec<PinnedKey>> = HashMap::new();
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(names), Some(key_type), Some(key_data)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        // hashed names (|1|...) cannot be matched without the salt
        for name in names.split(',').filter(|n| !n.starts_with('|')) {
            hosts.entry(name.to_lowercase()).or_default().push(PinnedKey {
                key_type: key_type.to_string(),
                key_data: key_data.to_string(),
            });
        }
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIAaaaa";
    const KEY_B: &str = "AAAAC3NzaC1lZDI1NTE5AAAAIBbbbb";

    #[tokio::test]
    async fn first_key_is_pinned_and_a_different_one_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        let store = KnownHosts::load(&path, HostKeyPolicy::AcceptNew).unwrap();

        store.verify("Sftp.Example.com", 22, "ssh-ed25519", KEY_A).await.unwrap();
        store.verify("sftp.example.com", 22, "ssh-ed25519", KEY_A).await.unwrap();
        let changed = store.verify("sftp.example.com", 22, "ssh-ed25519", KEY_B).await;
        assert!(matches!(changed, Err(DriveError::Connection(_))));

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, format!("sftp.example.com ssh-ed25519 {KEY_A}\n"));
    }

    #[tokio::test]
    async fn pinned_keys_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        let store = KnownHosts::load(&path, HostKeyPolicy::AcceptNew).unwrap();
        store.verify("10.0.0.5", 2222, "ssh-ed25519", KEY_A).await.unwrap();

        let reloaded = KnownHosts::load(&path, HostKeyPolicy::Strict).unwrap();
        reloaded.verify("10.0.0.5", 2222, "ssh-ed25519", KEY_A).await.unwrap();
        assert!(reloaded.verify("10.0.0.5", 22, "ssh-ed25519", KEY_A).await.is_err());
    }

    #[tokio::test]
    async fn strict_rejects_unknown_hosts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        std::fs::write(
            &path,
            format!("# seeded\n|1|hashed|entry ssh-rsa AAAA\nhost-a,host-b ssh-ed25519 {KEY_A}\n"),
        )
        .unwrap();
        let store = KnownHosts::load(&path, HostKeyPolicy::Strict).unwrap();

        store.verify("host-b", 22, "ssh-ed25519", KEY_A).await.unwrap();
        assert!(store.verify("host-c", 22, "ssh-ed25519", KEY_A).await.is_err());
        assert!(!std::fs::read_to_string(&path).unwrap().contains("host-c"));
    }

    #[tokio::test]
    async fn accept_any_never_pins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_hosts");
        let store = KnownHosts::load(&path, HostKeyPolicy::AcceptAny).unwrap();

        store.verify("h", 22, "ssh-ed25519", KEY_A).await.unwrap();
        store.verify("h", 22, "ssh-ed25519", KEY_B).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn policy_names_are_snake_case() {
        let policy: HostKeyPolicy = serde_json::from_str("\"accept_new\"").unwrap();
        assert_eq!(policy, HostKeyPolicy::AcceptNew);
        assert_eq!(HostKeyPolicy::default(), HostKeyPolicy::AcceptNew);
    }
}
