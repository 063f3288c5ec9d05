pub mod api;
pub mod forms;
pub mod pages;

use actix_web::web;

use crate::error::DriveError;
use crate::gateway::RemoteFs;
use crate::layout;
use crate::types::RemoteEntry;

/// Registers every drive route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(pages::index))
        .route("/sftp", web::get().to(pages::sftp))
        .route("/sftp", web::post().to(pages::sftp))
        .route("/sftp_access", web::post().to(pages::sftp_access))
        .route("/upload", web::post().to(pages::upload))
        .route("/download", web::post().to(pages::download))
        .route("/delete", web::post().to(pages::delete))
        .route("/download_preview", web::get().to(api::download_preview_query))
        .route("/download_preview", web::post().to(api::download_preview))
        .route("/file_info", web::post().to(api::file_info))
        .route("/create_folder", web::post().to(api::create_folder))
        .route("/list_dir", web::post().to(api::list_dir))
        .route("/delete_multiple", web::post().to(api::delete_multiple))
        .route("/activity_log", web::post().to(api::activity_log))
        .route("/storage_info", web::post().to(api::storage_info))
        .route("/get_file_content", web::post().to(api::get_file_content))
        .route("/save_file", web::post().to(api::save_file))
        .route("/health", web::get().to(api::health));
}

/// Ensures the user's root exists, then lists it: directories first, then by name
pub(crate) async fn list_root(fs: &dyn RemoteFs, username: &str) -> Result<Vec<RemoteEntry>, DriveError> {
    let root = layout::resolve_root(username);
    layout::ensure_exists(fs, &root).await?;
    let mut entries = fs.list(&root).await?;
    sort_entries(&mut entries);
    Ok(entries)
}

pub(crate) fn sort_entries(entries: &mut [RemoteEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name.cmp(&b.name))
    });
}
