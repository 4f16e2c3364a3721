mod exclude;
pub mod paths;
mod walk;
mod watch_entries;
mod watcher;

pub use exclude::ExcludeSet;
pub use paths::normalize_path;
pub use paths::path_to_uri;
pub use paths::uri_to_path;
pub use walk::walk_files;
pub use walk::WalkOptions;
pub use watch_entries::WatchEntrySet;
pub use watcher::EventReceiver;
pub use watcher::EventSender;
pub use watcher::FileChangeEvent;
pub use watcher::FileChangeKind;
pub use watcher::NativeWatcher;
pub use watcher::PollingWatcher;
pub use watcher::POLL_SCAN_INTERVAL;
pub use watcher::POLL_STABILITY_CHECK;
pub use watcher::POLL_STABILITY_THRESHOLD;
