//! Installation of integrations into the managed directory

pub mod adapter;
pub mod extractor;
pub mod installer;
pub mod marker;

pub use adapter::InstallerAdapter;
pub use extractor::ArchiveExtractor;
pub use installer::FsInstaller;
pub use marker::{Marker, MARKER_FILE};

/// Everything the filesystem installer needs besides the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub domain: String,
    pub commit_sha: String,
    /// Path of the integration inside the archive root, e.g. `custom_components/hue`
    pub source_path: String,
    pub tracked_url: String,
    pub core_repository: bool,
    /// Replace an existing directory even without a marker
    pub overwrite: bool,
}
