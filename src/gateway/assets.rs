//! Static file delivery and the session gate for protected pages.
//!
//! Request paths are percent-decoded and normalized before anything touches
//! the filesystem. `..` may not climb above the root, and the resolved file
//! (after following symlinks) must still live under the canonical root.

use super::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Fallback handler: everything not routed to the JSON API.
pub async fn handle_static(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET {
        return not_found();
    }

    let Ok(decoded) = urlencoding::decode(uri.path()) else {
        return (StatusCode::BAD_REQUEST, "Bad request").into_response();
    };
    let Some(segments) = normalize(&decoded) else {
        tracing::warn!(path = %decoded, "Rejected path outside the public root");
        return forbidden();
    };

    let site = &state.site;
    if site.is_protected(&request_path(&segments)) && !state.has_session(&headers) {
        return redirect_to_login(&site.login_page);
    }

    let mut file = site.public_dir.clone();
    file.extend(&segments);

    let metadata = match tokio::fs::metadata(&file).await {
        Ok(m) => m,
        Err(_) => return not_found(),
    };
    if metadata.is_dir() {
        let mut index_segments = segments;
        index_segments.push(site.index_document.clone());
        if site.is_protected(&request_path(&index_segments)) && !state.has_session(&headers) {
            return redirect_to_login(&site.login_page);
        }
        file.push(&site.index_document);
    }

    match inside_root(&site.public_dir, &file).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(path = %decoded, "Rejected symlink escaping the public root");
            return forbidden();
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return not_found(),
        Err(e) => {
            tracing::error!(path = %file.display(), "Failed to resolve static file: {e}");
            return server_error();
        }
    }

    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(&file).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.to_string())],
                bytes,
            )
                .into_response()
        }
        Err(e) if e.kind() == ErrorKind::NotFound => not_found(),
        Err(e) => {
            tracing::error!(path = %file.display(), "Failed to read static file: {e}");
            server_error()
        }
    }
}

/// Split a decoded path into segments, resolving `.` and `..`.
///
/// Returns `None` when `..` would climb above the root or a segment carries
/// a separator or NUL that the filesystem could reinterpret.
pub(crate) fn normalize(path: &str) -> Option<Vec<String>> {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s if s.contains(['\\', '\0']) => return None,
            s => segments.push(s.to_string()),
        }
    }
    Some(segments)
}

/// Canonical `/a/b` form of normalized segments.
fn request_path(segments: &[String]) -> String {
    format!("/{}", segments.join("/"))
}

async fn inside_root(root: &Path, file: &Path) -> std::io::Result<bool> {
    let root = tokio::fs::canonicalize(root).await?;
    let file: PathBuf = tokio::fs::canonicalize(file).await?;
    Ok(file.starts_with(root))
}

fn redirect_to_login(login_page: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, login_page.to_string())],
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
}
