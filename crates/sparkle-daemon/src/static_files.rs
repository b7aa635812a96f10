//! Static file serving for the browser UI:
//! any non-`/api/*` path is served from a static directory with
//! directory-traversal protection. The UI itself (HTML/CSS/JS) is out of
//! scope — this module only owns the serving contract.

use std::path::{Component, Path, PathBuf};

/// Resolve `request_path` against `root`, refusing anything that would
/// escape it via `..`, an absolute path component, or a symlink resolving
/// outside the root. Returns `None` for a path that cannot be safely
/// served.
#[must_use]
pub fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    let trimmed = trimmed.split(['?', '#']).next().unwrap_or("");
    let relative = if trimmed.is_empty() { "index.html" } else { trimmed };

    let mut safe = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let candidate = root.join(&safe);
    let canonical_root = root.canonicalize().ok()?;
    let canonical_candidate = candidate.canonicalize().ok()?;
    if !canonical_candidate.starts_with(&canonical_root) {
        return None;
    }
    if canonical_candidate.is_dir() {
        return resolve(root, &format!("{relative}/index.html"));
    }
    Some(canonical_candidate)
}

/// Guess a `Content-Type` from a file extension; falls back to
/// `application/octet-stream` for anything unrecognised.
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn tmp_root(label: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("sparkle-static-test-{label}-{n}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<html></html>").unwrap();
        std::fs::create_dir_all(dir.join("assets")).unwrap();
        std::fs::write(dir.join("assets").join("app.js"), "console.log(1);").unwrap();
        dir
    }

    #[test]
    fn resolves_a_plain_file() {
        let root = tmp_root("plain");
        let resolved = resolve(&root, "/assets/app.js").unwrap();
        assert!(resolved.ends_with("assets/app.js"));
    }

    #[test]
    fn empty_path_serves_index() {
        let root = tmp_root("index");
        let resolved = resolve(&root, "/").unwrap();
        assert!(resolved.ends_with("index.html"));
    }

    #[test]
    fn refuses_parent_traversal() {
        let root = tmp_root("traversal");
        assert!(resolve(&root, "/../../etc/passwd").is_none());
    }

    #[test]
    fn refuses_missing_file() {
        let root = tmp_root("missing");
        assert!(resolve(&root, "/nope.js").is_none());
    }

    #[test]
    fn content_type_matches_extension() {
        assert_eq!(content_type(Path::new("a.js")), "text/javascript; charset=utf-8");
        assert_eq!(content_type(Path::new("a.unknown")), "application/octet-stream");
    }
}
