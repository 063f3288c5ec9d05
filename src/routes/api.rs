use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{Either, HttpRequest, HttpResponse, web};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{info, warn};

use super::forms::{DriveForm, FormOrJson, ensure_secure_transport, form_or_json};
use super::sort_entries;
use crate::activity::{Action, ActivityLog, ActivityRecord};
use crate::config::Config;
use crate::error::DriveError;
use crate::gateway::{Connector, RemoteFs, Session};
use crate::layout;
use crate::mime::{language_for, preview_content_type};
use crate::types::{FileType, RemoteCredential, RemoteEntry, format_permissions};

fn format_time(time: Option<SystemTime>) -> Option<String> {
    time.map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EntryResp {
    pub name: String,
    pub size: u64,
    pub modified: Option<String>,
    pub permissions: Option<String>,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

impl From<&RemoteEntry> for EntryResp {
    fn from(entry: &RemoteEntry) -> Self {
        Self {
            name: entry.name.clone(),
            size: entry.size,
            modified: format_time(entry.modified_at),
            permissions: entry.permissions.map(format_permissions),
            file_type: entry.file_type,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileInfoResp {
    pub filename: String,
    pub size: u64,
    pub modified: Option<String>,
    pub permissions: Option<String>,
    pub owner: Option<u32>,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResp {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteMultipleResp {
    pub success: bool,
    pub message: String,
    pub results: Vec<DeleteOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageResp {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContentResp {
    pub content: String,
    pub language: String,
}

/// Opens a session, runs `op` against it and always closes it again
async fn with_session<T, F>(
    connector: &dyn Connector,
    credential: &RemoteCredential,
    op: F,
) -> Result<T, DriveError>
where
    F: AsyncFnOnce(&dyn RemoteFs) -> Result<T, DriveError>,
{
    let session = Session::open(connector, credential).await?;
    let result = op(session.fs()).await;
    session.finish(result).await
}

pub async fn file_info(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    body: FormOrJson,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let (credential, [filename]) = form_or_json(body).require(["filename"])?;
    let remote = layout::remote_path(&credential.username, &filename)?;

    let stat = with_session(connector.get_ref(), &credential, async |fs| fs.stat(&remote).await).await?;
    Ok(HttpResponse::Ok().json(FileInfoResp {
        filename,
        size: stat.size,
        modified: format_time(stat.modified_at),
        permissions: stat.permissions.map(format_permissions),
        owner: stat.uid,
        file_type: stat.file_type,
    }))
}

pub async fn create_folder(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    activity: web::Data<ActivityLog>,
    body: FormOrJson,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let (credential, [folder_name]) = form_or_json(body).require(["folder_name"])?;
    let remote = layout::remote_path(&credential.username, &folder_name)?;

    with_session(connector.get_ref(), &credential, async |fs| {
        layout::ensure_exists(fs, &layout::resolve_root(&credential.username)).await?;
        fs.mkdir(&remote).await
    })
    .await?;

    activity
        .record(ActivityRecord::now(Action::CreateFolder, &folder_name, &credential))
        .await;
    Ok(HttpResponse::Ok().json(MessageResp {
        success: true,
        message: format!("Folder created: {folder_name}"),
    }))
}

pub async fn list_dir(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    body: FormOrJson,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let form = form_or_json(body);
    let (credential, []) = form.require([])?;
    let dir = layout::resolve_dir(&credential.username, form.get("path"))?;
    let root = layout::resolve_root(&credential.username);

    let mut entries = with_session(connector.get_ref(), &credential, async |fs| {
        if dir == root {
            layout::ensure_exists(fs, &root).await?;
        }
        fs.list(&dir).await
    })
    .await?;
    sort_entries(&mut entries);

    let body: Vec<EntryResp> = entries.iter().map(EntryResp::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
pub struct DeleteMultipleReq {
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub filenames: Vec<String>,
}

impl DeleteMultipleReq {
    /// Url-encoded bodies repeat `filenames` (or `filenames[]`) once per file
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut req = DeleteMultipleReq {
            host: None,
            username: None,
            password: None,
            filenames: Vec::new(),
        };
        for (key, value) in pairs {
            match key.as_str() {
                "host" => req.host = Some(value),
                "username" => req.username = Some(value),
                "password" => req.password = Some(value),
                "filenames" | "filenames[]" => req.filenames.push(value),
                _ => {}
            }
        }
        req
    }
}

/// Deletes every requested file independently and reports each outcome
pub async fn delete_multiple(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    activity: web::Data<ActivityLog>,
    body: Either<web::Json<DeleteMultipleReq>, web::Form<Vec<(String, String)>>>,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let body = match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => DeleteMultipleReq::from_pairs(form.into_inner()),
    };
    let filenames: Vec<String> = body
        .filenames
        .into_iter()
        .filter(|f| !f.trim().is_empty())
        .collect();
    let form = DriveForm {
        host: body.host,
        username: body.username,
        password: body.password,
        ..Default::default()
    };
    let credential = match form.require([]) {
        Ok((credential, [])) if !filenames.is_empty() => credential,
        Ok(_) => return Err(DriveError::missing(["filenames"])),
        Err(DriveError::Validation { mut missing }) => {
            if filenames.is_empty() {
                missing.push("filenames".to_string());
            }
            return Err(DriveError::Validation { missing });
        }
        Err(e) => return Err(e),
    };

    let results = with_session(connector.get_ref(), &credential, async |fs| {
        let mut results = Vec::with_capacity(filenames.len());
        for filename in &filenames {
            let outcome = match layout::remote_path(&credential.username, filename) {
                Ok(remote) => fs.remove(&remote).await,
                Err(e) => Err(e),
            };
            results.push(match outcome {
                Ok(()) => DeleteOutcome {
                    filename: filename.clone(),
                    success: true,
                    error: None,
                },
                Err(e) => {
                    warn!("delete of {filename} failed: {e}");
                    DeleteOutcome {
                        filename: filename.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            });
        }
        Ok(results)
    })
    .await?;

    for outcome in results.iter().filter(|o| o.success) {
        activity
            .record(ActivityRecord::now(Action::Delete, &outcome.filename, &credential))
            .await;
    }

    let deleted = results.iter().filter(|o| o.success).count();
    let failed = results.len() - deleted;
    info!("delete_multiple: {deleted} deleted, {failed} failed");
    Ok(HttpResponse::Ok().json(DeleteMultipleResp {
        success: failed == 0,
        message: if failed == 0 {
            format!("Deleted {deleted} file(s)")
        } else {
            format!("Deleted {deleted} file(s), {failed} failed")
        },
        results,
    }))
}

pub async fn activity_log(activity: web::Data<ActivityLog>) -> Result<HttpResponse, DriveError> {
    let records = activity.read_all().await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Recursive sum of regular-file sizes under `root`
async fn used_bytes(fs: &dyn RemoteFs, root: &str) -> Result<u64, DriveError> {
    let mut pending = vec![root.to_string()];
    let mut used = 0u64;
    while let Some(dir) = pending.pop() {
        for entry in fs.list(&dir).await? {
            match entry.file_type {
                FileType::Regular => used = used.saturating_add(entry.size),
                FileType::Directory => pending.push(format!("{dir}/{}", entry.name)),
                FileType::Symlink | FileType::Other => {}
            }
        }
    }
    Ok(used)
}

pub async fn storage_info(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    body: FormOrJson,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let (credential, []) = form_or_json(body).require([])?;
    let root = layout::resolve_root(&credential.username);

    let used = with_session(connector.get_ref(), &credential, async |fs| {
        layout::ensure_exists(fs, &root).await?;
        used_bytes(fs, &root).await
    })
    .await?;

    let total = cfg.storage_quota_bytes;
    let percent = if total == 0 {
        0.0
    } else {
        ((used as f64 / total as f64) * 1000.0).round() / 10.0
    };
    Ok(HttpResponse::Ok().json(StorageResp {
        total,
        used,
        free: total.saturating_sub(used),
        percent,
    }))
}

pub async fn get_file_content(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    body: FormOrJson,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let (credential, [filename]) = form_or_json(body).require(["filename"])?;
    let remote = layout::remote_path(&credential.username, &filename)?;

    let data = with_session(connector.get_ref(), &credential, async |fs| fs.read(&remote).await).await?;
    Ok(HttpResponse::Ok().json(ContentResp {
        content: String::from_utf8_lossy(&data).into_owned(),
        language: language_for(&filename).to_string(),
    }))
}

pub async fn save_file(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    activity: web::Data<ActivityLog>,
    body: web::Json<DriveForm>,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let (credential, [filename, content]) = body.require(["filename", "content"])?;
    let remote = layout::remote_path(&credential.username, &filename)?;

    with_session(connector.get_ref(), &credential, async |fs| {
        layout::ensure_exists(fs, &layout::resolve_root(&credential.username)).await?;
        fs.write(&remote, content.as_bytes()).await
    })
    .await?;

    activity
        .record(ActivityRecord::now(Action::Edit, &filename, &credential))
        .await;
    Ok(HttpResponse::Ok().json(MessageResp {
        success: true,
        message: format!("File saved: {filename}"),
    }))
}

/// Inline preview; the bytes pass through a scoped temp file in the staging dir
pub async fn download_preview(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    body: FormOrJson,
) -> Result<HttpResponse, DriveError> {
    preview(req, cfg, connector, form_or_json(body)).await
}

/// Query-string variant kept for `<img>`/`<iframe>` embedding
pub async fn download_preview_query(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    query: web::Query<DriveForm>,
) -> Result<HttpResponse, DriveError> {
    preview(req, cfg, connector, query.into_inner()).await
}

async fn preview(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    form: DriveForm,
) -> Result<HttpResponse, DriveError> {
    ensure_secure_transport(&req, &cfg)?;
    let (credential, [filename]) = form.require(["filename"])?;
    let remote = layout::remote_path(&credential.username, &filename)?;

    let scratch = tempfile::Builder::new()
        .prefix("preview-")
        .tempfile_in(&cfg.staging_dir)?;
    with_session(connector.get_ref(), &credential, async |fs| {
        fs.get(&remote, scratch.path()).await
    })
    .await?;
    let data = tokio::fs::read(scratch.path()).await?;
    drop(scratch);

    Ok(HttpResponse::Ok()
        .content_type(preview_content_type(&filename))
        .insert_header(ContentDisposition {
            disposition: DispositionType::Inline,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(data))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "health": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
