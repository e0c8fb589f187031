//! Build context archiving.
//!
//! The engine receives the context directory as a single uncompressed tar
//! stream with paths relative to the directory root.

use std::path::Path;

use berth_common::constants::DOCKERFILE_NAME;
use berth_common::error::BuildFailure;

/// Archives `dir` into an in-memory tar.
///
/// # Errors
///
/// Returns `BuildFailure::Context` if the directory cannot be read, or
/// `BuildFailure::MissingDockerfile` if it has no `Dockerfile` at its root.
pub fn archive_context(dir: &Path) -> Result<Vec<u8>, BuildFailure> {
    let context_err = |source| BuildFailure::Context {
        path: dir.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(dir).map_err(context_err)?;
    if !metadata.is_dir() {
        return Err(context_err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "build context is not a directory",
        )));
    }
    if !dir.join(DOCKERFILE_NAME).is_file() {
        return Err(BuildFailure::MissingDockerfile {
            path: dir.to_path_buf(),
        });
    }

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir).map_err(context_err)?;
    let archive = builder.into_inner().map_err(context_err)?;

    tracing::debug!(context = %dir.display(), bytes = archive.len(), "build context archived");
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn entries(archive: &[u8]) -> BTreeSet<String> {
        let mut reader = tar::Archive::new(archive);
        reader
            .entries()
            .expect("entries")
            .map(|e| {
                e.expect("entry")
                    .path()
                    .expect("path")
                    .to_string_lossy()
                    .trim_start_matches("./")
                    .trim_end_matches('/')
                    .to_string()
            })
            .filter(|p| !p.is_empty() && p != ".")
            .collect()
    }

    #[test]
    fn archives_tree_relative_to_root() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").expect("write");
        std::fs::create_dir(dir.path().join("app")).expect("mkdir");
        std::fs::write(dir.path().join("app/main.sh"), "echo hi\n").expect("write");

        let archive = archive_context(dir.path()).expect("archive failed");
        let names = entries(&archive);
        assert!(names.contains("Dockerfile"));
        assert!(names.contains("app"));
        assert!(names.contains("app/main.sh"));
    }

    #[test]
    fn archive_is_uncompressed_tar() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").expect("write");

        let archive = archive_context(dir.path()).expect("archive failed");
        assert_ne!(&archive[..2], &[0x1f, 0x8b]);
        assert_eq!(archive.len() % 512, 0);
    }

    #[test]
    fn missing_dockerfile_is_rejected() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("README"), "no build here").expect("write");

        let err = archive_context(dir.path()).unwrap_err();
        assert!(matches!(err, BuildFailure::MissingDockerfile { .. }));
    }

    #[test]
    fn nonexistent_directory_is_context_error() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let err = archive_context(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, BuildFailure::Context { .. }));
    }
}
