use anyhow::{anyhow, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static CAPTURE_FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+\(\d+_\d+\)\.csv").expect("capture file name regex"));

static CAPTURE_RELATIVE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SquadGame/.+/\w+\(\d+_\d+\)\.csv").expect("capture relative path regex")
});

/// A finished capture file located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePath {
    /// `Name(12345_67890).csv`
    pub file_name: String,
    /// Location under the capture base directory.
    pub storage_path: PathBuf,
}

/// Resolves the path announced in the log against the directory that
/// contains `SquadGame/`.
pub fn resolve(base_dir: &Path, raw_file_path: &str) -> Result<CapturePath> {
    let normalized = raw_file_path.replace('\\', "/");

    let relative = CAPTURE_RELATIVE_PATH
        .find(&normalized)
        .ok_or_else(|| anyhow!("unexpected capture path shape: {raw_file_path}"))?
        .as_str();
    let file_name = CAPTURE_FILE_NAME
        .find(relative)
        .ok_or_else(|| anyhow!("unexpected capture file name: {raw_file_path}"))?
        .as_str();

    Ok(CapturePath {
        file_name: file_name.to_string(),
        storage_path: base_dir.join(relative),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_name_and_storage_path() {
        let capture = resolve(
            Path::new("/srv/squad"),
            "../../../SquadGame/Saved/Profiling/Foo(1234_5678).csv",
        )
        .unwrap();
        assert_eq!(capture.file_name, "Foo(1234_5678).csv");
        assert_eq!(
            capture.storage_path,
            PathBuf::from("/srv/squad/SquadGame/Saved/Profiling/Foo(1234_5678).csv")
        );
    }

    #[test]
    fn resolves_windows_separators() {
        let capture = resolve(
            Path::new("/srv/squad"),
            r"C:\squad\SquadGame\Saved\Profiling\CSV\Profile(20240302_181141).csv",
        )
        .unwrap();
        assert_eq!(capture.file_name, "Profile(20240302_181141).csv");
        assert_eq!(
            capture.storage_path,
            PathBuf::from("/srv/squad/SquadGame/Saved/Profiling/CSV/Profile(20240302_181141).csv")
        );
    }

    #[test]
    fn missing_numeric_groups_is_an_error() {
        assert!(resolve(
            Path::new("/srv/squad"),
            "../../../SquadGame/Saved/Profiling/Foo.csv"
        )
        .is_err());
        assert!(resolve(Path::new("/srv/squad"), "Foo(1234_5678).csv").is_err());
    }
}
