//! In-memory remote host for handler and gateway tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::DriveError;
use crate::gateway::{Connector, RemoteFs};
use crate::types::{FileType, RemoteCredential, RemoteEntry, RemoteStat};

pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    attempts: usize,
    opens: usize,
    closes: usize,
}

/// Accepts [`PASSWORD`] for every user and serves one shared tree
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl MemoryRemote {
    /// A host where `/home/{username}` exists but the uploads dir does not yet
    pub fn with_user(username: &str) -> Self {
        let remote = Self::default();
        {
            let mut state = remote.state.lock().unwrap();
            state.nodes.insert("/home".into(), Node::Dir);
            state.nodes.insert(format!("/home/{username}"), Node::Dir);
        }
        remote
    }

    /// Every call to `open`, accepted or not
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().unwrap().nodes.get(path) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.state.lock().unwrap().nodes.get(path), Some(Node::Dir))
    }

    pub fn insert_file(&self, path: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), Node::File(data.to_vec()));
    }

    pub fn insert_dir(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), Node::Dir);
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "",
    }
}

fn require_parent(state: &State, path: &str) -> Result<(), DriveError> {
    let parent = parent_of(path);
    match state.nodes.get(parent) {
        Some(Node::Dir) => Ok(()),
        _ if parent == "/" => Ok(()),
        _ => Err(DriveError::NotFound(parent.to_string())),
    }
}

#[async_trait]
impl RemoteFs for MemoryRemote {
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>, DriveError> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(dir) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(DriveError::RemoteOperation(format!("{dir}: not a directory")));
            }
            None => return Err(DriveError::NotFound(dir.to_string())),
        }
        let prefix = format!("{dir}/");
        let entries = state
            .nodes
            .iter()
            .filter_map(|(path, node)| {
                let name = path.strip_prefix(&prefix)?;
                if name.contains('/') {
                    return None;
                }
                let (size, file_type, permissions) = match node {
                    Node::File(data) => (data.len() as u64, FileType::Regular, 0o644),
                    Node::Dir => (0, FileType::Directory, 0o755),
                };
                Some(RemoteEntry {
                    name: name.to_string(),
                    size,
                    modified_at: None,
                    permissions: Some(permissions),
                    file_type,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<RemoteStat, DriveError> {
        let state = self.state.lock().unwrap();
        let (size, file_type, permissions) = match state.nodes.get(path) {
            Some(Node::File(data)) => (data.len() as u64, FileType::Regular, 0o644),
            Some(Node::Dir) => (0, FileType::Directory, 0o755),
            None => return Err(DriveError::NotFound(path.to_string())),
        };
        Ok(RemoteStat {
            size,
            modified_at: None,
            permissions: Some(permissions),
            uid: Some(1000),
            file_type,
        })
    }

    async fn mkdir(&self, path: &str) -> Result<(), DriveError> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(path) {
            return Err(DriveError::RemoteOperation(format!("{path}: already exists")));
        }
        require_parent(&state, path)?;
        state.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), DriveError> {
        let mut state = self.state.lock().unwrap();
        match state.nodes.get(path) {
            Some(Node::File(_)) => {
                state.nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(DriveError::RemoteOperation(format!("{path}: is a directory"))),
            None => Err(DriveError::NotFound(path.to_string())),
        }
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<u64, DriveError> {
        let data = tokio::fs::read(local).await?;
        self.write(remote, &data).await?;
        Ok(data.len() as u64)
    }

    async fn get(&self, remote: &str, local: &Path) -> Result<u64, DriveError> {
        let data = self.read(remote).await?;
        tokio::fs::write(local, &data).await?;
        Ok(data.len() as u64)
    }

    async fn read(&self, remote: &str) -> Result<Vec<u8>, DriveError> {
        match self.state.lock().unwrap().nodes.get(remote) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(DriveError::RemoteOperation(format!("{remote}: is a directory"))),
            None => Err(DriveError::NotFound(remote.to_string())),
        }
    }

    async fn write(&self, remote: &str, data: &[u8]) -> Result<(), DriveError> {
        let mut state = self.state.lock().unwrap();
        require_parent(&state, remote)?;
        if let Some(Node::Dir) = state.nodes.get(remote) {
            return Err(DriveError::RemoteOperation(format!("{remote}: is a directory")));
        }
        state
            .nodes
            .insert(remote.to_string(), Node::File(data.to_vec()));
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DriveError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryRemote {
    async fn open(&self, credential: &RemoteCredential) -> Result<Box<dyn RemoteFs>, DriveError> {
        self.state.lock().unwrap().attempts += 1;
        if credential.password != PASSWORD {
            return Err(DriveError::Connection(format!(
                "authentication rejected for {}@{}",
                credential.username, credential.host
            )));
        }
        self.state.lock().unwrap().opens += 1;
        Ok(Box::new(self.clone()))
    }
}
