use std::path::{Path, PathBuf};

/// Which build of the consumer application owns the storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
    #[default]
    Stable,
    Insiders,
}

impl Variant {
    /// Application directory name under the platform config dir.
    pub fn app_dir_name(self) -> &'static str {
        match self {
            Self::Stable => "Code",
            Self::Insiders => "Code - Insiders",
        }
    }
}

/// Where namespaces live, and for which variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub variant: Variant,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>, variant: Variant) -> Self {
        Self {
            root: root.into(),
            variant,
        }
    }

    /// `<config_dir>/<App>/User/workspaceStorage`
    pub fn platform_default(config_dir: &Path, variant: Variant) -> Self {
        Self::new(
            config_dir
                .join(variant.app_dir_name())
                .join("User")
                .join("workspaceStorage"),
            variant,
        )
    }
}

/// Policy flags for a repair run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairOptions {
    /// Rebuild the index from disk alone, dropping entries with no record.
    pub remove_orphans: bool,
    /// Copy orphaned sessions back from sibling namespaces before rebuilding.
    pub recover_orphans: bool,
    /// Compute everything, write nothing.
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_default_uses_variant_directory() {
        let stable = StorageConfig::platform_default(Path::new("/cfg"), Variant::Stable);
        assert_eq!(stable.root, PathBuf::from("/cfg/Code/User/workspaceStorage"));

        let insiders = StorageConfig::platform_default(Path::new("/cfg"), Variant::Insiders);
        assert_eq!(
            insiders.root,
            PathBuf::from("/cfg/Code - Insiders/User/workspaceStorage")
        );
        assert_eq!(insiders.variant, Variant::Insiders);
    }
}
