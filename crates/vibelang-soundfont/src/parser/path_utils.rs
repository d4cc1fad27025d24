use std::path::{Path, PathBuf};

/// Normalize a path string based on the current operating system
///
/// - On Windows: Keeps backslashes
/// - On other platforms: Converts backslashes to forward slashes
///
/// Text soundfonts are frequently authored on Windows, so `sample=samples\C4.wav`
/// has to resolve everywhere.
pub fn normalize_path(path: &str) -> String {
    if cfg!(windows) {
        path.to_string()
    } else {
        path.replace('\\', "/")
    }
}

/// Combine a default path with a sample path
///
/// - If the sample path is absolute, it's used as-is
/// - If the sample path is relative, it's appended to the default path
pub fn combine_sample_path(default_path: &str, sample_path: &str) -> PathBuf {
    let normalized_sample_path = normalize_path(sample_path);

    let path = Path::new(&normalized_sample_path);
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let mut combined_path = normalize_path(default_path);
    if !combined_path.is_empty() && !combined_path.ends_with('/') && !combined_path.ends_with('\\') {
        combined_path.push('/');
    }

    combined_path.push_str(&normalized_sample_path);
    PathBuf::from(combined_path)
}

/// Resolve a sample path against the directory of the container.
///
/// Absolute paths are returned unchanged; relative paths are joined onto
/// `base_dir` when one is known.
pub fn resolve_against(path: &Path, base_dir: Option<&Path>) -> PathBuf {
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
