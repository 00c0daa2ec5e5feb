//! Development server: watch mode plus a static HTTP server over the
//! output tree.

use crate::args::ReportFormat;
use crate::report;
use std::path::{Path, PathBuf};
use std::time::Duration;
use unify_core::{BuildConfig, Orchestrator};

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("pdf", "application/pdf"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
];

pub fn run(config: BuildConfig) -> anyhow::Result<()> {
    let log_level = config.log_level;
    let addr = format!("{}:{}", config.host, config.port);
    let mut orch = Orchestrator::new(config)?;
    let report = orch.build()?;
    report::print(&report, ReportFormat::Human, log_level);

    let cancel = orch.cancel_token();
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())?;

    let output_root = orch.output_root().to_path_buf();
    let watch_cancel = cancel.clone();
    let watcher = std::thread::spawn(move || {
        if let Err(err) = crate::watch::watch_loop(&mut orch, &watch_cancel, log_level) {
            tracing::error!("watcher stopped: {err}");
        }
    });

    let server = tiny_http::Server::http(&addr)
        .map_err(|err| anyhow::anyhow!("failed to bind {addr}: {err}"))?;
    tracing::info!("serving {} at http://{addr}/", output_root.display());

    while !cancel.is_cancelled() {
        let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(250)) else {
            continue;
        };
        let path = request.url().split('?').next().unwrap_or("/").to_string();
        match resolve_file(&output_root, &path) {
            Some(file) => {
                let content_type = content_type_for(&file);
                match std::fs::read(&file) {
                    Ok(bytes) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            content_type.as_bytes(),
                        )
                        .expect("static header is valid");
                        let _ = request.respond(
                            tiny_http::Response::from_data(bytes).with_header(header),
                        );
                    }
                    Err(_) => respond_status(request, 500),
                }
            }
            None => respond_status(request, 404),
        }
    }

    drop(server);
    let _ = watcher.join();
    Ok(())
}

/// Map a request path onto the output tree. Pretty-URL style lookups fall
/// back to `<path>/index.html`; traversal segments are rejected.
fn resolve_file(output_root: &Path, url_path: &str) -> Option<PathBuf> {
    let trimmed = url_path.trim_start_matches('/');
    if trimmed.split('/').any(|seg| seg == "..") {
        return None;
    }
    let base = if trimmed.is_empty() {
        output_root.to_path_buf()
    } else {
        output_root.join(trimmed)
    };
    if base.is_file() {
        return Some(base);
    }
    let index = base.join("index.html");
    if index.is_file() {
        return Some(index);
    }
    // `/about` for an output written as `about/index.html` or `about.html`.
    let with_ext = base.with_extension("html");
    if with_ext.is_file() {
        return Some(with_ext);
    }
    None
}

fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, ct)| (*ct).to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn respond_status(request: tiny_http::Request, status: u16) {
    let _ = request.respond(tiny_http::Response::empty(status));
}
