use actix_web::{Either, HttpRequest, web};
use serde::Deserialize;

use crate::config::Config;
use crate::error::DriveError;
use crate::types::RemoteCredential;

/// Every field any drive route accepts; each route requires its own subset
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DriveForm {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub filename: Option<String>,
    pub folder_name: Option<String>,
    pub path: Option<String>,
    pub content: Option<String>,
}

/// Routes called from scripts send JSON, the page sends url-encoded forms
pub type FormOrJson = Either<web::Json<DriveForm>, web::Form<DriveForm>>;

pub fn form_or_json(body: FormOrJson) -> DriveForm {
    match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl DriveForm {
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "host" => present(&self.host),
            "username" => present(&self.username),
            "password" => present(&self.password),
            "filename" => present(&self.filename),
            "folder_name" => present(&self.folder_name),
            "path" => present(&self.path),
            "content" => self.content.as_deref(),
            _ => None,
        }
    }

    /// Credentials plus the `extra` fields, or every missing name at once
    pub fn require<const N: usize>(
        &self,
        extra: [&'static str; N],
    ) -> Result<(RemoteCredential, [String; N]), DriveError> {
        let missing: Vec<&str> = ["host", "username", "password"]
            .into_iter()
            .chain(extra)
            .filter(|name| self.get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(DriveError::missing(missing));
        }

        let credential = RemoteCredential::new(
            self.get("host").unwrap_or_default().trim(),
            self.get("username").unwrap_or_default().trim(),
            self.get("password").unwrap_or_default(),
        );
        let values = extra.map(|name| self.get(name).unwrap_or_default().to_string());
        Ok((credential, values))
    }

    /// Credentials only when all three are present; `None` otherwise
    pub fn optional_credential(&self) -> Option<RemoteCredential> {
        self.require([]).ok().map(|(credential, _)| credential)
    }
}

/// Refuses credential-bearing requests over plain http unless they come from loopback
///
/// Forwarded scheme headers count only with `trust_forwarded_proto`; otherwise
/// the listener itself must be TLS.
pub fn ensure_secure_transport(req: &HttpRequest, cfg: &Config) -> Result<(), DriveError> {
    if !cfg.require_https {
        return Ok(());
    }
    let https = if cfg.trust_forwarded_proto {
        req.connection_info().scheme() == "https"
    } else {
        req.app_config().secure()
    };
    if https {
        return Ok(());
    }
    if req.peer_addr().is_some_and(|addr| addr.ip().is_loopback()) {
        return Ok(());
    }
    Err(DriveError::InsecureTransport)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(host: &str, username: &str, password: &str) -> DriveForm {
        DriveForm {
            host: Some(host.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    #[test]
    fn all_missing_fields_reported_together() {
        let f = DriveForm {
            host: Some("h".into()),
            password: Some("  ".into()),
            ..Default::default()
        };
        match f.require(["filename"]) {
            Err(DriveError::Validation { missing }) => {
                assert_eq!(missing, vec!["username", "password", "filename"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extras_are_returned_in_order() {
        let mut f = form("h", "u", "p");
        f.filename = Some("a.txt".into());
        f.folder_name = Some("dir".into());
        let (cred, [filename, folder]) = f.require(["filename", "folder_name"]).unwrap();
        assert_eq!(cred.username, "u");
        assert_eq!(filename, "a.txt");
        assert_eq!(folder, "dir");
    }

    #[test]
    fn empty_content_counts_as_present() {
        let mut f = form("h", "u", "p");
        f.filename = Some("a.txt".into());
        f.content = Some(String::new());
        assert!(f.require(["filename", "content"]).is_ok());
    }

    #[test]
    fn optional_credential_needs_all_three() {
        assert!(form("h", "u", "").optional_credential().is_none());
        assert!(form("h", "u", "p").optional_credential().is_some());
    }
}
