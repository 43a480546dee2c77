//! ConfigFS backing store for USB gadget trees

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{GadgetError, Result};

/// ConfigFS base path for USB gadgets
pub const CONFIGFS_PATH: &str = "/sys/kernel/config/usb_gadget";

/// Environment variable overriding the gadget root
pub const ROOT_ENV: &str = "GADGET_COMPOSER_ROOT";

/// Where the kernel lists USB device controllers
pub const UDC_CLASS_PATH: &str = "/sys/class/udc";

/// Activation control attribute of a gadget
pub const UDC_ATTR: &str = "UDC";

pub const STRINGS_DIR: &str = "strings";
pub const CONFIGS_DIR: &str = "configs";
pub const FUNCTIONS_DIR: &str = "functions";

/// Default gadget root, honouring `GADGET_COMPOSER_ROOT`
pub fn default_root() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIGFS_PATH))
}

/// Check if the gadget root is present (configfs mounted, libcomposite loaded)
pub fn is_configfs_available(root: &Path) -> bool {
    root.is_dir()
}

/// Find the first available UDC (USB Device Controller)
pub fn find_udc() -> Option<String> {
    find_udc_in(Path::new(UDC_CLASS_PATH))
}

/// Find the first UDC listed under `class_dir`, in name order
pub fn find_udc_in(class_dir: &Path) -> Option<String> {
    let mut names: Vec<String> = fs::read_dir(class_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Mutations the gadget tree performs on its backing store.
///
/// Every creation and teardown step goes through this trait, so a store that
/// records or rejects operations can stand in for configfs.
pub trait Store {
    /// Create a directory and its parents. An existing directory is not an error.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Remove a directory together with whatever it still contains.
    /// A missing directory is not an error.
    fn remove_dir(&self, path: &Path) -> Result<()>;

    /// Create `link` pointing at `target`
    fn create_symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// Remove a symlink. A missing link is not an error.
    fn remove_symlink(&self, link: &Path) -> Result<()>;

    /// Write a text attribute
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Write a binary attribute verbatim
    fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Read a text attribute, trimmed
    fn read_file(&self, path: &Path) -> Result<String>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigFs;

impl Store for ConfigFs {
    fn create_dir(&self, path: &Path) -> Result<()> {
        match fs::create_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(e) => Err(GadgetError::io("create directory", path, e)),
        }
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        // configfs drops attribute files together with the item on rmdir,
        // so a plain rmdir is tried first. Regular filesystems need the
        // recursive fallback.
        match fs::remove_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => fs::remove_dir_all(path)
                .map_err(|e| GadgetError::io("remove directory", path, e)),
            Err(e) => Err(GadgetError::io("remove directory", path, e)),
        }
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, link)
            .map_err(|e| GadgetError::io("create symlink", link, e))
    }

    fn remove_symlink(&self, link: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(link) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(GadgetError::io("inspect symlink", link, e)),
        };
        if !meta.file_type().is_symlink() {
            return Err(GadgetError::io(
                "remove symlink",
                link,
                io::Error::new(io::ErrorKind::InvalidInput, "not a symlink"),
            ));
        }
        fs::remove_file(link).map_err(|e| GadgetError::io("remove symlink", link, e))
    }

    /// Attribute files take the value in a single write() syscall, so the
    /// buffer (including the trailing newline) is built up front.
    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        // No O_TRUNC: attribute files may reject it
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .or_else(|e| {
                if path.exists() {
                    Err(e)
                } else {
                    File::create(path)
                }
            })
            .map_err(|e| GadgetError::io("open", path, e))?;

        let mut data = content.as_bytes().to_vec();
        if !content.ends_with('\n') {
            data.push(b'\n');
        }

        file.write_all(&data)
            .map_err(|e| GadgetError::io("write", path, e))?;
        file.flush().map_err(|e| GadgetError::io("flush", path, e))?;

        // Regular files keep stale tail bytes from a longer previous value.
        // Attribute files ignore or refuse the truncate, both are fine.
        let _ = file.set_len(data.len() as u64);

        Ok(())
    }

    fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = File::create(path).map_err(|e| GadgetError::io("create", path, e))?;
        file.write_all(data)
            .map_err(|e| GadgetError::io("write", path, e))
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| GadgetError::io("read", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_dir_tolerates_existing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("g1/configs/c.1");
        ConfigFs.create_dir(&dir).unwrap();
        ConfigFs.create_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_create_dir_over_file_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("UDC");
        fs::write(&path, "").unwrap();
        let err = ConfigFs.create_dir(&path).unwrap_err();
        assert!(matches!(err, GadgetError::Io { .. }));
    }

    #[test]
    fn test_write_file_replaces_longer_value() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("UDC");
        ConfigFs.write_file(&path, "controller0").unwrap();
        ConfigFs.write_file(&path, "\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "\n");
        assert_eq!(ConfigFs.read_file(&path).unwrap(), "");
    }

    #[test]
    fn test_write_bytes_is_verbatim() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("report_desc");
        ConfigFs.write_bytes(&path, &[0x05, 0x01, 0x0a]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x05, 0x01, 0x0a]);
    }

    #[test]
    fn test_remove_dir_recursive_and_missing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("functions/hid.usb0");
        ConfigFs.create_dir(&dir).unwrap();
        ConfigFs.write_file(&dir.join("protocol"), "1").unwrap();

        ConfigFs.remove_dir(&dir).unwrap();
        assert!(!dir.exists());
        ConfigFs.remove_dir(&dir).unwrap();
    }

    #[test]
    fn test_remove_symlink_rejects_regular_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hid.usb0");
        fs::write(&path, "").unwrap();
        assert!(ConfigFs.remove_symlink(&path).is_err());
        assert!(path.exists());
    }

    #[test]
    fn test_symlink_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("functions/hid.usb0");
        let link = tmp.path().join("hid.usb0");
        ConfigFs.create_dir(&target).unwrap();
        ConfigFs.create_symlink(&target, &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), target);

        ConfigFs.remove_symlink(&link).unwrap();
        ConfigFs.remove_symlink(&link).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_find_udc_in() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(find_udc_in(tmp.path()), None);
        fs::create_dir(tmp.path().join("fe980000.usb")).unwrap();
        fs::create_dir(tmp.path().join("dummy_udc.0")).unwrap();
        assert_eq!(find_udc_in(tmp.path()).as_deref(), Some("dummy_udc.0"));
        assert_eq!(find_udc_in(&tmp.path().join("missing")), None);
    }
}
