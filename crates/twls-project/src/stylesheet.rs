//! `@config` directive extraction from stylesheets.

use camino::Utf8Path;
use camino::Utf8PathBuf;
use twls_workspace::normalize_path;

/// Remove `/* ... */` comments. An unterminated comment swallows the rest.
#[must_use]
pub fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// The raw path of the first `@config "<path>"` directive, comments ignored.
#[must_use]
pub fn extract_config_directive(css: &str) -> Option<String> {
    let css = strip_comments(css);
    let mut rest = css.as_str();

    while let Some(at) = rest.find("@config") {
        let after = &rest[at + "@config".len()..];
        rest = after;

        let trimmed = after.trim_start();
        let mut chars = trimmed.chars();
        let Some(quote @ ('"' | '\'')) = chars.next() else {
            continue;
        };
        let body = chars.as_str();
        if let Some(end) = body.find(quote) {
            let path = &body[..end];
            if !path.is_empty() {
                return Some(path.to_string());
            }
        }
    }

    None
}

/// Config path declared by the stylesheet at `css_path`, resolved against
/// the stylesheet's directory.
#[must_use]
pub fn resolve_config_directive(css_path: &Utf8Path, css: &str) -> Option<Utf8PathBuf> {
    let declared = extract_config_directive(css)?;
    let dir = css_path.parent().unwrap_or(css_path);
    Some(normalize_path(&dir.join(declared)))
}
