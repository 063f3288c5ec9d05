//! Bounded JSON audit trail of user actions.
//!
//! The log is a single JSON array on local disk, oldest entry first, holding
//! at most [`MAX_ENTRIES`] records. Every append rewrites the whole file while
//! holding a process-wide lock, so concurrent requests cannot lose updates.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::DriveError;
use crate::types::RemoteCredential;

pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Upload,
    Download,
    Delete,
    Edit,
    CreateFolder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub timestamp: String,
    pub action: Action,
    pub filename: String,
    pub username: String,
    pub host: String,
}

impl ActivityRecord {
    /// A record stamped with the current UTC time
    pub fn now(action: Action, filename: &str, credential: &RemoteCredential) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            action,
            filename: filename.to_string(),
            username: credential.username.clone(),
            host: credential.host.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ActivityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All persisted records, oldest first; empty when the log does not exist yet
    pub async fn read_all(&self) -> Result<Vec<ActivityRecord>, DriveError> {
        read_records(&self.path).await
    }

    /// Appends `record`, evicting the oldest entries beyond [`MAX_ENTRIES`]
    pub async fn append(&self, record: ActivityRecord) -> Result<(), DriveError> {
        let _guard = self.write_lock.lock().await;
        let mut records = read_records(&self.path).await?;
        records.push(record);
        if records.len() > MAX_ENTRIES {
            let excess = records.len() - MAX_ENTRIES;
            records.drain(..excess);
        }
        write_records(&self.path, &records).await
    }

    /// Appends and swallows failures; the user-facing action already succeeded
    pub async fn record(&self, record: ActivityRecord) {
        let action = record.action;
        let filename = record.filename.clone();
        match self.append(record).await {
            Ok(()) => debug!("activity {action:?} {filename} recorded"),
            Err(e) => warn!(
                "failed to record activity {action:?} for {filename} in {}: {e}",
                self.path.display()
            ),
        }
    }
}

async fn read_records(path: &Path) -> Result<Vec<ActivityRecord>, DriveError> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DriveError::Persistence(format!("{}: {e}", path.display()))),
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&raw)
        .map_err(|e| DriveError::Persistence(format!("{} is not a valid log: {e}", path.display())))
}

async fn write_records(path: &Path, records: &[ActivityRecord]) -> Result<(), DriveError> {
    let persist_error = |e: std::io::Error| DriveError::Persistence(format!("{}: {e}", path.display()));
    let body = serde_json::to_vec_pretty(records)
        .map_err(|e| DriveError::Persistence(format!("serializing log: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(persist_error)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).await.map_err(persist_error)?;
    fs::rename(&tmp, path).await.map_err(persist_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn cred() -> RemoteCredential {
        RemoteCredential::new("sftp.example.com", "alice", "pw")
    }

    #[tokio::test]
    async fn missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity_log.json"));
        assert!(log.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_keeps_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity_log.json"));
        log.append(ActivityRecord::now(Action::Upload, "a.txt", &cred()))
            .await
            .unwrap();
        log.append(ActivityRecord::now(Action::Delete, "a.txt", &cred()))
            .await
            .unwrap();

        let records = log.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, Action::Upload);
        assert_eq!(records[1].action, Action::Delete);
        assert_eq!(records[1].username, "alice");
        assert_eq!(records[1].host, "sftp.example.com");
    }

    #[tokio::test]
    async fn hundred_and_first_record_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(dir.path().join("activity_log.json"));
        for i in 0..=MAX_ENTRIES {
            log.append(ActivityRecord::now(Action::Upload, &format!("f{i}"), &cred()))
                .await
                .unwrap();
        }

        let records = log.read_all().await.unwrap();
        assert_eq!(records.len(), MAX_ENTRIES);
        assert_eq!(records.first().unwrap().filename, "f1");
        assert_eq!(records.last().unwrap().filename, format!("f{MAX_ENTRIES}"));
        let names: Vec<_> = records.iter().map(|r| r.filename.clone()).collect();
        let expected: Vec<_> = (1..=MAX_ENTRIES).map(|i| format!("f{i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(ActivityLog::new(dir.path().join("activity_log.json")));
        let mut handles = Vec::new();
        for i in 0..20 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(ActivityRecord::now(Action::Edit, &format!("f{i}"), &cred()))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(log.read_all().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn corrupt_log_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity_log.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let log = ActivityLog::new(&path);

        assert!(matches!(log.read_all().await, Err(DriveError::Persistence(_))));
        // record() swallows the failure and leaves the file untouched
        log.record(ActivityRecord::now(Action::Upload, "x", &cred())).await;
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"{not json");
    }

    #[test]
    fn actions_serialize_snake_case() {
        let json = serde_json::to_string(&Action::CreateFolder).unwrap();
        assert_eq!(json, "\"create_folder\"");
    }
}
