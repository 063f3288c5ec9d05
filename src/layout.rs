//! Where a user's files live on the remote host.

use tracing::info;

use crate::error::DriveError;
use crate::gateway::RemoteFs;

/// `/home/{username}/uploads`
pub fn resolve_root(username: &str) -> String {
    format!("/home/{username}/uploads")
}

/// Full remote path of `filename` inside the user's root
///
/// Rejects names that could leave the root (`..`, anything containing `/`).
pub fn remote_path(username: &str, filename: &str) -> Result<String, DriveError> {
    validate_filename(filename)?;
    Ok(format!("{}/{}", resolve_root(username), filename))
}

pub fn validate_filename(filename: &str) -> Result<(), DriveError> {
    if filename.trim().is_empty() {
        return Err(DriveError::missing(["filename"]));
    }
    if filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains(char::is_control)
    {
        return Err(DriveError::InvalidInput(format!(
            "'{}' is not a plain file name",
            filename.escape_debug()
        )));
    }
    Ok(())
}

/// Resolves a directory requested by the client, which must stay under the user's root
///
/// `None` or an empty string means the root itself. Relative paths are taken
/// relative to the root.
pub fn resolve_dir(username: &str, requested: Option<&str>) -> Result<String, DriveError> {
    let root = resolve_root(username);
    let requested = match requested.map(str::trim) {
        None | Some("") => return Ok(root),
        Some(p) => p,
    };

    let relative = match requested.strip_prefix(&root) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        Some(_) => return Err(outside_root(requested)),
        None if requested.starts_with('/') => return Err(outside_root(requested)),
        None => requested,
    };

    let mut resolved = root;
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(outside_root(requested)),
            name => {
                resolved.push('/');
                resolved.push_str(name);
            }
        }
    }
    Ok(resolved)
}

fn outside_root(path: &str) -> DriveError {
    DriveError::InvalidInput(format!("{path} is outside the user's upload directory"))
}

/// Creates `path` when a stat reports it missing
///
/// Two sessions racing to create the same directory are not reconciled;
/// the loser's mkdir error surfaces to its caller.
pub async fn ensure_exists(fs: &dyn RemoteFs, path: &str) -> Result<(), DriveError> {
    match fs.stat(path).await {
        Ok(_) => Ok(()),
        Err(DriveError::NotFound(_)) => {
            info!("Creating missing remote directory {path}");
            fs.mkdir(path).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_follows_home_convention() {
        assert_eq!(resolve_root("alice"), "/home/alice/uploads");
        assert_eq!(
            remote_path("alice", "report.txt").unwrap(),
            "/home/alice/uploads/report.txt"
        );
    }

    #[test]
    fn traversal_names_are_rejected() {
        assert!(matches!(
            remote_path("alice", "../secret"),
            Err(DriveError::InvalidInput(_))
        ));
        assert!(matches!(
            remote_path("alice", ".."),
            Err(DriveError::InvalidInput(_))
        ));
        assert!(matches!(
            remote_path("alice", ""),
            Err(DriveError::Validation { .. })
        ));
    }

    #[test]
    fn control_characters_are_rejected() {
        for name in ["a\nb.txt", "tab\there", "nul\0", "bell\u{7}"] {
            match remote_path("alice", name) {
                Err(DriveError::InvalidInput(msg)) => assert!(!msg.contains(char::is_control)),
                other => panic!("{name:?} accepted: {other:?}"),
            }
        }
        assert!(remote_path("alice", "a;b.txt").is_ok());
    }

    #[test]
    fn dir_resolution_stays_in_root() {
        assert_eq!(resolve_dir("u", None).unwrap(), "/home/u/uploads");
        assert_eq!(
            resolve_dir("u", Some("/home/u/uploads")).unwrap(),
            "/home/u/uploads"
        );
        assert_eq!(
            resolve_dir("u", Some("/home/u/uploads/archive/")).unwrap(),
            "/home/u/uploads/archive"
        );
        assert_eq!(
            resolve_dir("u", Some("archive/2024")).unwrap(),
            "/home/u/uploads/archive/2024"
        );
        assert!(resolve_dir("u", Some("/etc")).is_err());
        assert!(resolve_dir("u", Some("/home/u/uploads2")).is_err());
        assert!(resolve_dir("u", Some("archive/../../x")).is_err());
    }
}
