use camino::Utf8PathBuf;
use thiserror::Error;

/// Failure to read or understand a single workspace file during discovery.
///
/// Discovery logs these and skips the file; they never abort a scan.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to read {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {reason}")]
    Parse { path: Utf8PathBuf, reason: String },
}

impl DiscoveryError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
