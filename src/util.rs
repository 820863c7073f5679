use std::{fs, io::Write, path::Path};

use crate::Error;

/// Replaces the file at `path` with `contents` through a temporary file in the
/// same directory, so readers see either the old or the new file.
///
/// An existing file's permissions are carried over to the replacement. A new
/// file gets the usual `0o666` minus umask rather than the private mode of a
/// temporary file. Ownership is not carried over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let write_error = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let existing = fs::metadata(path).ok();

    let mut builder = tempfile::Builder::new();
    if existing.is_none() {
        default_permissions(&mut builder);
    }

    let mut file = builder.tempfile_in(dir).map_err(write_error)?;
    file.write_all(contents).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;

    if let Some(metadata) = existing {
        fs::set_permissions(file.path(), metadata.permissions()).map_err(write_error)?;
    }

    file.persist(path).map_err(|source| Error::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(unix)]
fn default_permissions(builder: &mut tempfile::Builder) {
    use std::os::unix::fs::PermissionsExt;

    // Masked by the umask on open(2).
    builder.permissions(fs::Permissions::from_mode(0o666));
}

#[cfg(not(unix))]
fn default_permissions(_builder: &mut tempfile::Builder) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");

        write_atomic(&path, b"ingress: []\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "ingress: []\n");
    }

    #[test]
    fn test_replaces_file_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "old contents that are longer than the new ones\n").unwrap();

        write_atomic(&path, b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "old\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_atomic(&path, b"new\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let plain = dir.path().join("plain.yml");
        fs::write(&plain, "plain\n").unwrap();

        write_atomic(&path, b"new\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let plain_mode = fs::metadata(&plain).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, plain_mode);
    }

    #[test]
    fn test_directory_target_is_persist_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::create_dir(&path).unwrap();

        let err = write_atomic(&path, b"new\n").unwrap_err();

        assert!(matches!(err, Error::Persist { .. }));
        assert!(err.to_string().starts_with("failed to replace"));
        assert!(path.is_dir());
    }

    #[test]
    fn test_missing_directory_is_write_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("config.yml");

        let err = write_atomic(&path, b"new\n").unwrap_err();

        assert!(matches!(err, Error::Write { .. }));
        assert!(!path.exists());
    }
}
