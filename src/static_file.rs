//! Static-file handler: resolve a request path under a vhost's document
//! root, trying configured index filenames for directory-like paths
//! (§4.4 "fall through to the static-file handler").

use crate::vhost::DocRoot;
use std::path::{Component, Path, PathBuf};

/// Resolves `path` (the normalized request path) to a file under
/// `doc_root.root`. Rejects `..` traversal by rejecting any `ParentDir`
/// component once the request path is decomposed.
pub async fn resolve(doc_root: &DocRoot, path: &str) -> Option<(PathBuf, Vec<u8>)> {
    let relative = sanitize(path)?;
    let candidate = Path::new(&doc_root.root).join(&relative);

    if candidate.is_dir() || path.ends_with('/') {
        for index in &doc_root.index_files {
            let with_index = candidate.join(index);
            if let Ok(body) = tokio::fs::read(&with_index).await {
                return Some((with_index, body));
            }
        }
        return None;
    }

    match tokio::fs::read(&candidate).await {
        Ok(body) => Some((candidate, body)),
        Err(_) => None,
    }
}

fn sanitize(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    let mut out = PathBuf::new();

    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(out)
}

/// Guesses a `Content-Type` from the file extension; falls back to
/// `application/octet-stream`.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize("../../etc/passwd").is_none());
        assert_eq!(sanitize("a/b/c"), Some(PathBuf::from("a/b/c")));
    }

    #[tokio::test]
    async fn resolves_index_file_for_directory_root() {
        let dir = std::env::temp_dir().join(format!("vhostd-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("index.html"), b"hi").await.unwrap();

        let doc_root = DocRoot {
            root: dir.to_string_lossy().to_string(),
            index_files: vec!["index.html".to_string()],
        };

        let (_, body) = resolve(&doc_root, "/").await.unwrap();
        assert_eq!(body, b"hi");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
