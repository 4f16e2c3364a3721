mod content;
mod descriptor;
mod discovery;
mod error;
mod files;
mod registry;
mod selector;
mod stylesheet;
mod version;

pub use content::parse_config_source;
pub use content::ConfigContent;
pub use content::ConfigLoader;
pub use content::StaticConfigLoader;
pub use descriptor::ProjectDescriptor;
pub use descriptor::ProjectId;
pub use discovery::Discovered;
pub use discovery::Discovery;
pub use error::DiscoveryError;
pub use files::client_watch_patterns;
pub use files::is_typescript_config;
pub use files::FileClass;
pub use files::CONFIG_GLOB;
pub use files::CSS_GLOB;
pub use files::LOCK_GLOB;
pub use registry::ProjectRegistry;
pub use registry::RegisteredProject;
pub use selector::Selector;
pub use selector::SelectorPriority;
pub use selector::PRIORITY_ORDER;
pub use stylesheet::extract_config_directive;
pub use stylesheet::resolve_config_directive;
pub use version::default_version;
pub use version::resolve_version;
pub use version::Feature;
pub use version::NodeModulesResolver;
pub use version::ResolvedVersion;
pub use version::VersionResolver;
pub use version::DEFAULT_VERSION;
