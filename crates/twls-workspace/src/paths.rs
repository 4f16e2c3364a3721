//! Path, URI and glob conversion utilities
//!
//! Every path that reaches a selector or the watch layer goes through
//! [`normalize_path`] first so that string comparisons between config paths,
//! event paths and document paths are meaningful.

use camino::Utf8Component;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use tower_lsp_server::lsp_types;
use tower_lsp_server::UriExt;

/// Characters with meaning inside a glob pattern.
const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Convert an LSP URI to a normalized [`Utf8PathBuf`].
///
/// Only `file://` URIs have a path; everything else (`untitled:`, `git:`) yields `None`.
#[must_use]
pub fn uri_to_path(uri: &lsp_types::Uri) -> Option<Utf8PathBuf> {
    #[allow(clippy::redundant_closure_for_method_calls)]
    if uri.scheme().map(|s| s.as_str()) != Some("file") {
        tracing::trace!("URI conversion to path failed for: {} (non-file scheme)", uri.as_str());
        return None;
    }

    let path = uri.to_file_path()?;
    let path = Utf8PathBuf::from_path_buf(path.into_owned())
        .inspect_err(|_| {
            tracing::trace!(
                "URI conversion to path failed for: {} (non-UTF-8 path)",
                uri.as_str()
            );
        })
        .ok()?;

    Some(normalize_path(&path))
}

/// Convert a path to a `file://` URI.
#[must_use]
pub fn path_to_uri(path: &Utf8Path) -> Option<lsp_types::Uri> {
    lsp_types::Uri::from_file_path(path.as_std_path())
}

/// Lexically normalize a path: drop `.` segments, fold `..` segments and,
/// on Windows, lowercase the drive letter and use forward slashes.
///
/// Never touches the file system, so it is safe for paths that do not exist
/// (deleted files, configs declared by a stylesheet).
#[must_use]
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut normalized = Utf8PathBuf::new();

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_str()),
        }
    }

    #[cfg(windows)]
    let normalized = {
        let mut s = normalized.as_str().replace('\\', "/");
        if s.as_bytes().get(1) == Some(&b':') {
            s[..1].make_ascii_lowercase();
        }
        Utf8PathBuf::from(s)
    };

    normalized
}

/// Escape glob metacharacters in a literal path so it can prefix a pattern.
#[must_use]
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if GLOB_META.contains(&c) {
            escaped.push('[');
            escaped.push(c);
            escaped.push(']');
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Resolve a possibly relative, possibly negated glob against `base`.
///
/// Leading `./` and `../` segments are folded into `base` before it is
/// escaped; the remainder of the pattern is kept verbatim.
#[must_use]
pub fn join_glob(base: &Utf8Path, pattern: &str) -> String {
    let (negated, body) = match pattern.strip_prefix('!') {
        Some(body) => (true, body),
        None => (false, pattern),
    };

    let joined = if Utf8Path::new(body).is_absolute() || body.starts_with('/') {
        body.to_string()
    } else {
        let mut dir = normalize_path(base);
        let mut rest = body;
        loop {
            if let Some(stripped) = rest.strip_prefix("./") {
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix("../") {
                dir.pop();
                rest = stripped;
            } else {
                break;
            }
        }

        let dir = escape_glob(dir.as_str());
        if rest.is_empty() || rest == "." {
            dir
        } else {
            format!("{}/{rest}", dir.trim_end_matches('/'))
        }
    };

    if negated {
        format!("!{joined}")
    } else {
        joined
    }
}

/// Glob matching everything beneath `dir`.
#[must_use]
pub fn directory_glob(dir: &Utf8Path) -> String {
    format!("{}/**", escape_glob(dir.as_str()).trim_end_matches('/'))
}

/// The longest leading directory of `pattern` that contains no glob syntax.
#[must_use]
pub fn glob_base(pattern: &str) -> Utf8PathBuf {
    let body = pattern.strip_prefix('!').unwrap_or(pattern);
    let mut base = Utf8PathBuf::new();
    for segment in body.split('/') {
        if segment.contains(GLOB_META) {
            break;
        }
        if segment.is_empty() && base.as_str().is_empty() {
            base.push("/");
            continue;
        }
        base.push(segment);
    }
    if base.as_str() == body {
        base.pop();
    }
    base
}
