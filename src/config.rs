use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::SftpConnector;
use crate::known_hosts::{HostKeyPolicy, KnownHosts};
use crate::types::SftpClientConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub activity_log_path: String,
    /// Local directory for upload staging and preview temp files
    pub staging_dir: String,
    pub ssh_port: u16,
    pub connect_timeout_secs: u64,
    pub operation_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub io_size: usize,
    pub concurrency: usize,
    pub max_upload_size: usize,
    /// Quota reported by storage_info, per user
    pub storage_quota_bytes: u64,
    /// Refuse credential-bearing requests that did not arrive over https (loopback exempt)
    pub require_https: bool,
    /// Take the scheme from `Forwarded`/`X-Forwarded-Proto`; only behind a proxy that sets them
    pub trust_forwarded_proto: bool,
    pub host_key_policy: HostKeyPolicy,
    /// Pinned SSH host keys, OpenSSH `known_hosts` format
    pub known_hosts_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5000".to_string(),
            activity_log_path: "./activity_log.json".to_string(),
            staging_dir: "./uploads".to_string(),
            ssh_port: 22,
            connect_timeout_secs: 15,
            operation_timeout_secs: 30,
            transfer_timeout_secs: 600,
            io_size: 65536,
            concurrency: 8,
            max_upload_size: 500 * 1024 * 1024,
            storage_quota_bytes: 10 * 1024 * 1024 * 1024,
            require_https: true,
            trust_forwarded_proto: false,
            host_key_policy: HostKeyPolicy::AcceptNew,
            known_hosts_path: "./known_hosts".to_string(),
        }
    }
}

impl Config {
    /// Reads `path`, writing a default file there first when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
        } else {
            let default_config = Config::default();
            let toml_string = toml::to_string_pretty(&default_config)
                .context("failed to serialize default config")?;
            std::fs::write(path, toml_string)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(default_config)
        }
    }

    /// `config.toml` (or `$DRIVE_CONFIG`), then `DRIVE_*` environment overrides
    pub fn from_env_config() -> anyhow::Result<Self> {
        let config_path =
            std::env::var("DRIVE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let mut cfg = Self::load(Path::new(&config_path))?;
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        std::fs::create_dir_all(&cfg.staging_dir)
            .with_context(|| format!("failed to create staging dir {}", cfg.staging_dir))?;
        Ok(cfg)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DRIVE_LISTEN") {
            self.listen = v;
        }
        if let Some(v) = lookup("DRIVE_ACTIVITY_LOG") {
            self.activity_log_path = v;
        }
        if let Some(v) = lookup("DRIVE_STAGING_DIR") {
            self.staging_dir = v;
        }
        if let Some(v) = lookup("DRIVE_REQUIRE_HTTPS") {
            self.require_https = v
                .parse()
                .with_context(|| format!("DRIVE_REQUIRE_HTTPS must be true or false, got {v}"))?;
        }
        if let Some(v) = lookup("DRIVE_TRUST_FORWARDED_PROTO") {
            self.trust_forwarded_proto = v.parse().with_context(|| {
                format!("DRIVE_TRUST_FORWARDED_PROTO must be true or false, got {v}")
            })?;
        }
        if let Some(v) = lookup("DRIVE_KNOWN_HOSTS") {
            self.known_hosts_path = v;
        }
        Ok(())
    }

    pub fn client_config(&self) -> SftpClientConfig {
        SftpClientConfig {
            io_size: self.io_size.max(1),
            concurrency: self.concurrency.max(1),
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
            transfer_timeout: Duration::from_secs(self.transfer_timeout_secs),
        }
    }

    /// Production connector; loads the pinned host keys
    pub fn connector(&self) -> anyhow::Result<SftpConnector> {
        let known_hosts = KnownHosts::load(&self.known_hosts_path, self.host_key_policy)
            .with_context(|| format!("failed to load {}", self.known_hosts_path))?;
        Ok(SftpConnector {
            ssh_port: self.ssh_port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            client_config: Arc::new(self.client_config()),
            known_hosts: Arc::new(known_hosts),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.ssh_port, 22);
        assert!(path.exists());
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.listen, cfg.listen);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "ssh_port = 2222\nrequire_https = false\nhost_key_policy = \"strict\"\n",
        )
        .unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.ssh_port, 2222);
        assert!(!cfg.require_https);
        assert_eq!(cfg.host_key_policy, HostKeyPolicy::Strict);
        assert!(!cfg.trust_forwarded_proto);
        assert_eq!(cfg.concurrency, 8);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("DRIVE_LISTEN", "0.0.0.0:8443"),
            ("DRIVE_REQUIRE_HTTPS", "false"),
            ("DRIVE_TRUST_FORWARDED_PROTO", "true"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8443");
        assert!(!cfg.require_https);
        assert!(cfg.trust_forwarded_proto);
    }

    #[test]
    fn bad_boolean_override_is_rejected() {
        let mut cfg = Config::default();
        let result = cfg.apply_overrides(|k| (k == "DRIVE_REQUIRE_HTTPS").then(|| "yes".into()));
        assert!(result.is_err());
    }

    #[test]
    fn connector_pins_into_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            known_hosts_path: dir.path().join("hosts").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let connector = cfg.connector().unwrap();
        assert_eq!(connector.known_hosts.policy(), HostKeyPolicy::AcceptNew);
        assert_eq!(connector.known_hosts.path(), dir.path().join("hosts"));
    }
}
