use camino::Utf8Path;
use camino::Utf8PathBuf;
use ignore::WalkBuilder;

use crate::exclude::ExcludeSet;
use crate::paths::normalize_path;

/// Options controlling how [`walk_files`] traverses the workspace.
///
/// The defaults match a plain recursive glob: hidden entries are visited and
/// VCS ignore files are not consulted. Only `exclude` prunes the walk.
#[derive(Clone, Debug)]
pub struct WalkOptions {
    /// Include hidden files and directories (those starting with `.`).
    pub hidden: bool,
    /// Honour `.gitignore`, `.ignore` and friends.
    pub respect_ignore_files: bool,
    /// Follow symbolic links.
    pub follow_links: bool,
    /// Maximum directory recursion depth. `None` means unlimited.
    pub max_depth: Option<usize>,
    /// Paths matching these patterns are neither reported nor descended into.
    pub exclude: ExcludeSet,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            hidden: true,
            respect_ignore_files: false,
            follow_links: false,
            max_depth: None,
            exclude: ExcludeSet::empty(),
        }
    }
}

/// Walk `root` and collect files that pass `predicate`.
///
/// Returns a sorted, deduplicated list of normalized absolute paths. Entries
/// the walker cannot read are skipped.
#[must_use]
pub fn walk_files(
    root: &Utf8Path,
    predicate: impl Fn(&Utf8Path) -> bool,
    options: &WalkOptions,
) -> Vec<Utf8PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut builder = WalkBuilder::new(root.as_std_path());
    // standard_filters first, it resets hidden/gitignore; override after.
    builder
        .standard_filters(options.respect_ignore_files)
        .hidden(!options.hidden)
        .follow_links(options.follow_links);

    if let Some(depth) = options.max_depth {
        builder.max_depth(Some(depth));
    }

    let exclude = options.exclude.clone();
    builder.filter_entry(move |entry| {
        let Some(path) = Utf8Path::from_path(entry.path()) else {
            return false;
        };
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        if is_dir {
            !exclude.is_excluded_dir(path)
        } else {
            !exclude.is_excluded(path)
        }
    });

    let mut files: Vec<Utf8PathBuf> = builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        .filter(|path| predicate(path))
        .map(|path| absolute(&path))
        .collect();

    files.sort();
    files.dedup();
    files
}

fn absolute(path: &Utf8Path) -> Utf8PathBuf {
    let simplified = dunce::simplified(path.as_std_path());
    let path = Utf8Path::from_path(simplified).unwrap_or(path);
    normalize_path(path)
}
