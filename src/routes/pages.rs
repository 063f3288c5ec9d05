use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpRequest, HttpResponse, web};
use futures_util::TryStreamExt as _;
use sanitize_filename::sanitize;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::forms::{DriveForm, ensure_secure_transport};
use super::list_root;
use crate::activity::{Action, ActivityLog, ActivityRecord};
use crate::config::Config;
use crate::error::DriveError;
use crate::gateway::{Connector, Session};
use crate::layout;
use crate::render::{Flash, PageView, page_response, redirect_with_flash};
use crate::types::{RemoteCredential, RemoteEntry};

const MAX_TEXT_FIELD: usize = 64 * 1024;

pub async fn index(req: HttpRequest) -> HttpResponse {
    let flash = Flash::from_request(&req);
    let clear = flash.is_some();
    page_response(
        PageView {
            flash,
            ..Default::default()
        },
        clear,
    )
}

fn listing_page(credential: &RemoteCredential, files: &[RemoteEntry], flash: Option<Flash>) -> HttpResponse {
    page_response(
        PageView {
            host: Some(&credential.host),
            username: Some(&credential.username),
            password: Some(&credential.password),
            files: Some(files),
            flash,
        },
        false,
    )
}

async fn connect_and_list(
    connector: &dyn Connector,
    credential: &RemoteCredential,
) -> Result<Vec<RemoteEntry>, DriveError> {
    let session = Session::open(connector, credential).await?;
    let result = list_root(session.fs(), &credential.username).await;
    session.finish(result).await
}

/// Form-first entry point: the password is optional, without it only the page is shown
///
/// Served for both GET and POST; GET never reads a password from the query string.
pub async fn sftp(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    query: web::Query<DriveForm>,
    body: Option<web::Form<DriveForm>>,
) -> HttpResponse {
    let form = match body {
        Some(form) => form.into_inner(),
        None => DriveForm {
            password: None,
            ..query.into_inner()
        },
    };

    let Some(credential) = form.optional_credential() else {
        return page_response(
            PageView {
                host: form.get("host"),
                username: form.get("username"),
                ..Default::default()
            },
            false,
        );
    };

    let result = match ensure_secure_transport(&req, &cfg) {
        Ok(()) => connect_and_list(connector.get_ref(), &credential).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(files) => listing_page(&credential, &files, None),
        Err(e) => redirect_with_flash(Flash::error(format!("Connection failed: {e}"))),
    }
}

pub async fn sftp_access(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    form: web::Form<DriveForm>,
) -> HttpResponse {
    let result = async {
        ensure_secure_transport(&req, &cfg)?;
        let (credential, []) = form.require([])?;
        let files = connect_and_list(connector.get_ref(), &credential).await?;
        Ok::<_, DriveError>((credential, files))
    }
    .await;

    match result {
        Ok((credential, files)) => listing_page(&credential, &files, None),
        Err(e) => redirect_with_flash(Flash::error(format!("SFTP access failed: {e}"))),
    }
}

/// An incoming file staged on local disk; the file is deleted when this is dropped
struct StagedUpload {
    filename: String,
    file: NamedTempFile,
    size: u64,
}

async fn read_upload(
    cfg: &Config,
    mut payload: Multipart,
) -> Result<(DriveForm, Option<StagedUpload>), DriveError> {
    let mut form = DriveForm::default();
    let mut staged = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| DriveError::InvalidInput(format!("invalid multipart body: {e}")))?
    {
        let disposition = field.content_disposition().cloned();
        let name = disposition
            .as_ref()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        if name == "file" {
            let original = disposition
                .as_ref()
                .and_then(|cd| cd.get_filename())
                .map(sanitize)
                .unwrap_or_default();
            if original.is_empty() {
                // browsers send an empty part when no file was picked
                while field.try_next().await.ok().flatten().is_some() {}
                continue;
            }

            let file = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(&cfg.staging_dir)?;
            let mut out = tokio::fs::File::from_std(file.reopen()?);
            let mut size = 0u64;
            while let Some(chunk) = field
                .try_next()
                .await
                .map_err(|e| DriveError::InvalidInput(format!("upload read error: {e}")))?
            {
                size += chunk.len() as u64;
                if size > cfg.max_upload_size as u64 {
                    return Err(DriveError::InvalidInput("file too large".into()));
                }
                out.write_all(&chunk).await?;
            }
            out.flush().await?;
            staged = Some(StagedUpload {
                filename: original,
                file,
                size,
            });
            continue;
        }

        let mut value = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| DriveError::InvalidInput(format!("invalid form field {name}: {e}")))?
        {
            value.extend_from_slice(&chunk);
            if value.len() > MAX_TEXT_FIELD {
                return Err(DriveError::InvalidInput(format!("field {name} too large")));
            }
        }
        let value = Some(String::from_utf8_lossy(&value).into_owned());
        match name.as_str() {
            "host" => form.host = value,
            "username" => form.username = value,
            "password" => form.password = value,
            _ => {}
        }
    }

    Ok((form, staged))
}

pub async fn upload(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    activity: web::Data<ActivityLog>,
    payload: Multipart,
) -> HttpResponse {
    let result = async {
        ensure_secure_transport(&req, &cfg)?;
        let (form, staged) = read_upload(&cfg, payload).await?;

        let mut missing = match form.require([]) {
            Ok(_) => Vec::new(),
            Err(DriveError::Validation { missing }) => missing,
            Err(e) => return Err(e),
        };
        let staged = match staged {
            Some(staged) if missing.is_empty() => staged,
            staged => {
                if staged.is_none() {
                    missing.insert(0, "file".to_string());
                }
                return Err(DriveError::Validation { missing });
            }
        };
        let (credential, []) = form.require([])?;
        let remote = layout::remote_path(&credential.username, &staged.filename)?;

        let session = Session::open(connector.get_ref(), &credential).await?;
        let result = async {
            let fs = session.fs();
            layout::ensure_exists(fs, &layout::resolve_root(&credential.username)).await?;
            fs.put(staged.file.path(), &remote).await?;
            list_root(fs, &credential.username).await
        }
        .await;
        let files = session.finish(result).await?;

        info!("Uploaded {} ({} bytes) to {remote}", staged.filename, staged.size);
        activity
            .record(ActivityRecord::now(Action::Upload, &staged.filename, &credential))
            .await;
        Ok::<_, DriveError>((credential, files, staged.filename))
    }
    .await;

    match result {
        Ok((credential, files, filename)) => listing_page(
            &credential,
            &files,
            Some(Flash::success(format!("File uploaded successfully: {filename}"))),
        ),
        Err(e) => {
            warn!("upload failed: {e}");
            redirect_with_flash(Flash::error(format!("Upload failed: {e}")))
        }
    }
}

pub async fn download(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    activity: web::Data<ActivityLog>,
    form: web::Form<DriveForm>,
) -> HttpResponse {
    let result = async {
        ensure_secure_transport(&req, &cfg)?;
        let (credential, [filename]) = form.require(["filename"])?;
        let remote = layout::remote_path(&credential.username, &filename)?;

        let session = Session::open(connector.get_ref(), &credential).await?;
        let result = session.fs().read(&remote).await;
        let data = session.finish(result).await?;

        activity
            .record(ActivityRecord::now(Action::Download, &filename, &credential))
            .await;
        Ok::<_, DriveError>((filename, data))
    }
    .await;

    match result {
        Ok((filename, data)) => HttpResponse::Ok()
            .content_type("application/octet-stream")
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(filename)],
            })
            .body(data),
        Err(e) => redirect_with_flash(Flash::error(format!("Download failed: {e}"))),
    }
}

pub async fn delete(
    req: HttpRequest,
    cfg: web::Data<Config>,
    connector: web::Data<dyn Connector>,
    activity: web::Data<ActivityLog>,
    form: web::Form<DriveForm>,
) -> HttpResponse {
    let result = async {
        ensure_secure_transport(&req, &cfg)?;
        let (credential, [filename]) = form.require(["filename"])?;
        let remote = layout::remote_path(&credential.username, &filename)?;

        let session = Session::open(connector.get_ref(), &credential).await?;
        let result = async {
            session.fs().remove(&remote).await?;
            list_root(session.fs(), &credential.username).await
        }
        .await;
        let files = session.finish(result).await?;

        activity
            .record(ActivityRecord::now(Action::Delete, &filename, &credential))
            .await;
        Ok::<_, DriveError>((credential, files, filename))
    }
    .await;

    match result {
        Ok((credential, files, filename)) => listing_page(
            &credential,
            &files,
            Some(Flash::success(format!("File deleted: {filename}"))),
        ),
        Err(e) => redirect_with_flash(Flash::error(format!("Delete failed: {e}"))),
    }
}
