//! MSD (Mass Storage Device) function

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::attrs::{AttrSet, AttrWriter};
use super::function::FunctionKind;
use crate::error::Result;

/// Mass storage function
#[derive(Debug, Clone, Copy)]
pub struct MassStorage;

impl FunctionKind for MassStorage {
    const TYPE: &'static str = "mass_storage";
    type Attrs = MassStorageAttrs;
}

/// Mass storage function attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassStorageAttrs {
    /// Halt bulk endpoints on error (some hosts misbehave with it on)
    pub stall: Option<bool>,
    /// LUN 0 settings
    pub lun: LunAttrs,
}

/// Per-LUN settings, the kernel creates `lun.0` with the function
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LunAttrs {
    /// Backing image
    pub file: Option<PathBuf>,
    /// Present as CD-ROM
    pub cdrom: Option<bool>,
    /// Read-only
    pub ro: Option<bool>,
    /// Removable media
    pub removable: Option<bool>,
    /// Ignore Force Unit Access
    pub nofua: Option<bool>,
}

impl LunAttrs {
    /// CD-ROM image, always read-only
    pub fn cdrom(file: PathBuf) -> Self {
        Self {
            file: Some(file),
            cdrom: Some(true),
            ro: Some(true),
            removable: Some(true),
            nofua: Some(true),
        }
    }

    /// Disk image
    pub fn disk(file: PathBuf, read_only: bool) -> Self {
        Self {
            file: Some(file),
            cdrom: Some(false),
            ro: Some(read_only),
            removable: Some(true),
            nofua: Some(true),
        }
    }

    fn is_empty(&self) -> bool {
        *self == LunAttrs::default()
    }
}

impl AttrSet for MassStorageAttrs {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.flag("stall", self.stall)?;
        if self.lun.is_empty() {
            return Ok(());
        }
        w.child("lun.0", |lun| {
            let lun = lun.get()?;
            // Mode flags first: the kernel refuses to change them while a file is attached
            lun.flag("removable", self.lun.removable)?;
            lun.flag("cdrom", self.lun.cdrom)?;
            lun.flag("ro", self.lun.ro)?;
            lun.flag("nofua", self.lun.nofua)?;
            let file = self.lun.file.as_ref().map(|p| p.to_string_lossy());
            lun.text("file", file.as_deref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otg::configfs::ConfigFs;
    use tempfile::TempDir;

    #[test]
    fn test_lun_config_cdrom() {
        let lun = LunAttrs::cdrom(PathBuf::from("/tmp/test.iso"));
        assert_eq!(lun.cdrom, Some(true));
        assert_eq!(lun.ro, Some(true));
    }

    #[test]
    fn test_lun_config_disk() {
        let lun = LunAttrs::disk(PathBuf::from("/tmp/test.img"), false);
        assert_eq!(lun.cdrom, Some(false));
        assert_eq!(lun.ro, Some(false));
        assert_eq!(lun.removable, Some(true));
    }

    #[test]
    fn test_attrs_land_in_lun_dir() {
        let tmp = TempDir::new().unwrap();
        let attrs = MassStorageAttrs {
            stall: Some(false),
            lun: LunAttrs::disk(PathBuf::from("/srv/disk.img"), true),
        };
        let mut w = AttrWriter::new(&ConfigFs, tmp.path());
        attrs.write(&mut w).unwrap();

        assert_eq!(w.written(), 6);
        let read = |name: &str| std::fs::read_to_string(tmp.path().join(name)).unwrap();
        assert_eq!(read("stall"), "0\n");
        assert_eq!(read("lun.0/ro"), "1\n");
        assert_eq!(read("lun.0/file"), "/srv/disk.img\n");
    }

    #[test]
    fn test_empty_lun_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut w = AttrWriter::new(&ConfigFs, tmp.path());
        MassStorageAttrs::default().write(&mut w).unwrap();
        assert!(!tmp.path().join("lun.0").exists());
    }
}
