//! Minimal server-rendered page and flash messages.

use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse};

use crate::types::{FileType, RemoteEntry};

pub const FLASH_COOKIE: &str = "drive_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    Success,
    Error,
}

impl FlashLevel {
    fn as_str(self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }

    /// Reads the flash left by a previous redirect, if any
    pub fn from_request(req: &HttpRequest) -> Option<Self> {
        let cookie = req.cookie(FLASH_COOKIE)?;
        let (level, message) = cookie.value().split_once(':')?;
        let level = match level {
            "success" => FlashLevel::Success,
            "error" => FlashLevel::Error,
            _ => return None,
        };
        Some(Self {
            level,
            message: message.to_string(),
        })
    }
}

/// 303 to the home page carrying `flash` in a short-lived cookie
///
/// The value is percent-encoded; [`Flash::from_request`] sees it decoded.
pub fn redirect_with_flash(flash: Flash) -> HttpResponse {
    let cookie = Cookie::build(
        FLASH_COOKIE,
        format!("{}:{}", flash.level.as_str(), flash.message),
    )
    .path("/")
    .http_only(true)
    .same_site(SameSite::Strict)
    .finish();
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .append_header((header::SET_COOKIE, cookie.encoded().to_string()))
        .finish()
}

/// What the page shows; credentials are echoed back so the forms stay filled in
#[derive(Debug, Default)]
pub struct PageView<'a> {
    pub host: Option<&'a str>,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub files: Option<&'a [RemoteEntry]>,
    pub flash: Option<Flash>,
}

/// Renders the page; a consumed flash cookie is cleared on the way out
pub fn page_response(view: PageView<'_>, clear_flash: bool) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    builder.content_type("text/html; charset=utf-8");
    if clear_flash {
        let mut expired = Cookie::new(FLASH_COOKIE, "");
        expired.set_path("/");
        expired.make_removal();
        builder.cookie(expired);
    }
    builder.body(render_page(&view))
}

pub fn render_page(view: &PageView<'_>) -> String {
    let host = escape(view.host.unwrap_or_default());
    let username = escape(view.username.unwrap_or_default());
    let password = escape(view.password.unwrap_or_default());
    let hidden = format!(
        r#"<input type="hidden" name="host" value="{host}"><input type="hidden" name="username" value="{username}"><input type="hidden" name="password" value="{password}">"#
    );

    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>SFTP Drive</title></head><body>\n<h1>SFTP Drive</h1>\n",
    );

    if let Some(flash) = &view.flash {
        html.push_str(&format!(
            "<p class=\"flash {}\">{}</p>\n",
            flash.level.as_str(),
            escape(&flash.message)
        ));
    }

    html.push_str(&format!(
        r#"<form method="post" action="/sftp_access">
<input name="host" placeholder="host" value="{host}">
<input name="username" placeholder="username" value="{username}">
<input name="password" type="password" placeholder="password" value="{password}">
<button type="submit">Connect</button>
</form>
"#
    ));

    if let Some(files) = view.files {
        html.push_str(&format!(
            r#"<form method="post" action="/upload" enctype="multipart/form-data">{hidden}<input type="file" name="file"><button type="submit">Upload</button></form>
"#
        ));
        if files.is_empty() {
            html.push_str("<p>No files yet.</p>\n");
        } else {
            html.push_str("<table>\n<tr><th>Name</th><th>Size</th><th></th></tr>\n");
            for entry in files {
                let name = escape(&entry.name);
                let actions = if entry.file_type == FileType::Directory {
                    String::from("directory")
                } else {
                    format!(
                        r#"<form method="post" action="/download">{hidden}<input type="hidden" name="filename" value="{name}"><button>Download</button></form><form method="post" action="/delete">{hidden}<input type="hidden" name="filename" value="{name}"><button>Delete</button></form>"#
                    )
                };
                html.push_str(&format!(
                    "<tr><td>{name}</td><td>{}</td><td>{actions}</td></tr>\n",
                    entry.size
                ));
            }
            html.push_str("</table>\n");
        }
    }

    html.push_str("</body></html>\n");
    html
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64, file_type: FileType) -> RemoteEntry {
        RemoteEntry {
            name: name.into(),
            size,
            modified_at: None,
            permissions: Some(0o644),
            file_type,
        }
    }

    #[test]
    fn names_are_escaped() {
        let files = vec![entry("<script>.txt", 3, FileType::Regular)];
        let html = render_page(&PageView {
            files: Some(&files),
            ..Default::default()
        });
        assert!(html.contains("&lt;script&gt;.txt"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn flash_and_listing_rendered() {
        let files = vec![
            entry("report.txt", 5, FileType::Regular),
            entry("archive", 0, FileType::Directory),
        ];
        let html = render_page(&PageView {
            host: Some("h"),
            username: Some("u"),
            files: Some(&files),
            flash: Some(Flash::success("File uploaded successfully: report.txt")),
            ..Default::default()
        });
        assert!(html.contains("flash success"));
        assert!(html.contains("<td>report.txt</td><td>5</td>"));
        assert!(html.contains("<td>archive</td><td>0</td><td>directory</td>"));
    }

    #[test]
    fn flash_survives_separators_and_control_characters() {
        let flash = Flash::error("Delete failed: 'a;b\nc.txt' = 100%");
        let resp = redirect_with_flash(flash.clone());
        assert_eq!(resp.status(), actix_web::http::StatusCode::SEE_OTHER);

        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let pair = set_cookie.split(';').next().unwrap_or_default().to_string();
        assert!(!pair.contains(char::is_control));

        let req = actix_web::test::TestRequest::default()
            .insert_header((header::COOKIE, pair))
            .to_http_request();
        assert_eq!(Flash::from_request(&req), Some(flash));
    }

    #[test]
    fn no_listing_without_files() {
        let html = render_page(&PageView::default());
        assert!(!html.contains("action=\"/upload\""));
    }
}
