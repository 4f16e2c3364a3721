//! Decide whether a batch of file changes invalidates the project topology.

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;
use semver::Version;
use twls_project::resolve_config_directive;
use twls_project::resolve_version;
use twls_project::FileClass;
use twls_project::VersionResolver;
use twls_workspace::ExcludeSet;
use twls_workspace::FileChangeEvent;
use twls_workspace::FileChangeKind;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestartReason {
    VersionChanged { config: Utf8PathBuf },
    StylesheetConfigChanged { stylesheet: Utf8PathBuf },
    ConfigCreated { config: Utf8PathBuf },
    ConfigDeleted { config: Utf8PathBuf },
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionChanged { config } => write!(f, "tailwindcss version changed for {config}"),
            Self::StylesheetConfigChanged { stylesheet } => {
                write!(f, "@config directive changed in {stylesheet}")
            }
            Self::ConfigCreated { config } => write!(f, "config file created: {config}"),
            Self::ConfigDeleted { config } => write!(f, "config file deleted: {config}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Restart(RestartReason),
    /// Hand these events, in order, to every live project.
    Forward(Vec<FileChangeEvent>),
}

/// Snapshot of the topology the classifier compares changes against.
/// Classification reads the file system, so it runs on a blocking thread
/// with no session lock held.
#[derive(Clone)]
pub struct ClassifyContext {
    pub exclude: ExcludeSet,
    pub resolver: Arc<dyn VersionResolver>,
    pub versions: FxHashMap<Utf8PathBuf, Version>,
    pub css_configs: FxHashMap<Utf8PathBuf, Utf8PathBuf>,
    /// Config paths of the live projects.
    pub configs: Vec<Utf8PathBuf>,
}

/// Events are examined in order; the first one that invalidates the
/// topology decides the batch. Excluded events are dropped. Re-examining a
/// file that has not changed again never produces a restart.
#[must_use]
pub fn classify(events: &[FileChangeEvent], ctx: &ClassifyContext) -> Decision {
    let mut forward = Vec::with_capacity(events.len());

    for event in events {
        if ctx.exclude.is_excluded(&event.path) {
            continue;
        }

        if let Some(reason) = restart_reason(event, ctx) {
            return Decision::Restart(reason);
        }

        forward.push(event.clone());
    }

    Decision::Forward(forward)
}

fn restart_reason(event: &FileChangeEvent, ctx: &ClassifyContext) -> Option<RestartReason> {
    match FileClass::of(&event.path) {
        FileClass::Lock => version_drift(ctx),
        FileClass::Css if event.kind != FileChangeKind::Deleted => stylesheet_drift(&event.path, ctx),
        FileClass::Config if event.kind == FileChangeKind::Created => Some(RestartReason::ConfigCreated {
            config: event.path.clone(),
        }),
        _ if event.kind == FileChangeKind::Deleted && ctx.configs.contains(&event.path) => {
            Some(RestartReason::ConfigDeleted {
                config: event.path.clone(),
            })
        }
        _ => None,
    }
}

fn version_drift(ctx: &ClassifyContext) -> Option<RestartReason> {
    ctx.configs.iter().find_map(|config| {
        let recorded = ctx.versions.get(config)?;
        let dir = config.parent().unwrap_or(config);
        let current = resolve_version(ctx.resolver.as_ref(), dir).version;
        (&current != recorded).then(|| RestartReason::VersionChanged {
            config: config.clone(),
        })
    })
}

fn stylesheet_drift(path: &Utf8Path, ctx: &ClassifyContext) -> Option<RestartReason> {
    let declared = std::fs::read_to_string(path)
        .ok()
        .and_then(|css| resolve_config_directive(path, &css));

    let changed = match (ctx.css_configs.get(path), declared.as_ref()) {
        (Some(previous), Some(current)) => previous != current,
        (Some(_), None) | (None, Some(_)) => true,
        (None, None) => false,
    };

    changed.then(|| RestartReason::StylesheetConfigChanged {
        stylesheet: path.to_path_buf(),
    })
}
