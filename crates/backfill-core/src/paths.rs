use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const BACKFILL_DIR: &str = ".backfill";
pub const CONFIG_FILE: &str = ".backfill/config.yaml";

/// Used when neither `--out` nor `output.path` names a file.
pub const DEFAULT_OUTPUT: &str = "filled_data.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn backfill_dir(root: &Path) -> PathBuf {
    root.join(BACKFILL_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lives_under_backfill_dir() {
        let root = Path::new("/project");
        assert_eq!(config_path(root), PathBuf::from("/project/.backfill/config.yaml"));
        assert!(config_path(root).starts_with(backfill_dir(root)));
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let root = Path::new("/project");
        assert_eq!(
            resolve(root, Path::new("out.json")),
            PathBuf::from("/project/out.json")
        );
        assert_eq!(
            resolve(root, Path::new("/tmp/out.json")),
            PathBuf::from("/tmp/out.json")
        );
    }
}
