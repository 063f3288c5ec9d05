//! Extension lookups for previews and the editor.

use std::path::Path;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "log", "csv", "json", "xml", "yaml", "yml", "ini", "conf", "py", "js", "ts", "rs",
    "html", "css", "sh", "toml",
];

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Content type used when previewing `filename` inline
pub fn preview_content_type(filename: &str) -> String {
    let Some(ext) = extension(filename) else {
        return "application/octet-stream".to_string();
    };
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "svg" => "image/svg+xml".to_string(),
        "png" | "gif" | "bmp" | "webp" => format!("image/{ext}"),
        "pdf" => "application/pdf".to_string(),
        e if TEXT_EXTENSIONS.contains(&e) => "text/plain".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// Editor language hint for `filename`
pub fn language_for(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("py") => "python",
        Some("js") => "javascript",
        Some("ts") => "typescript",
        Some("rs") => "rust",
        Some("html") | Some("htm") => "html",
        Some("css") => "css",
        Some("json") => "json",
        Some("xml") => "xml",
        Some("yaml") | Some("yml") => "yaml",
        Some("toml") => "toml",
        Some("md") => "markdown",
        Some("sh") | Some("bash") => "shell",
        Some("sql") => "sql",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("hpp") | Some("cc") => "cpp",
        Some("java") => "java",
        Some("go") => "go",
        Some("ini") | Some("conf") => "ini",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_pdf_and_text() {
        assert_eq!(preview_content_type("cat.PNG"), "image/png");
        assert_eq!(preview_content_type("photo.jpg"), "image/jpeg");
        assert_eq!(preview_content_type("logo.svg"), "image/svg+xml");
        assert_eq!(preview_content_type("paper.pdf"), "application/pdf");
        assert_eq!(preview_content_type("notes.md"), "text/plain");
        assert_eq!(preview_content_type("main.rs"), "text/plain");
    }

    #[test]
    fn unknown_or_missing_extension_is_binary() {
        assert_eq!(preview_content_type("archive.tar.gz"), "application/octet-stream");
        assert_eq!(preview_content_type("Makefile"), "application/octet-stream");
    }

    #[test]
    fn editor_languages() {
        assert_eq!(language_for("app.py"), "python");
        assert_eq!(language_for("README.md"), "markdown");
        assert_eq!(language_for("data.bin"), "plaintext");
        assert_eq!(language_for("noext"), "plaintext");
    }
}
