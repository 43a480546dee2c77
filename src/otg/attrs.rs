//! Attribute encoding shared by every node of the gadget tree
//!
//! Encoding rules:
//! - 8/16-bit identity fields (`bcdUSB`, `idVendor`, `bmAttributes`, ...) are
//!   hex with a `0x` prefix
//! - lengths, counts and power values are plain decimal
//! - booleans are `0`/`1`
//! - addresses and descriptor strings are UTF-8 text
//! - binary payloads such as report descriptors are written verbatim
//!
//! Every writer method takes an `Option`: `None` leaves the kernel default untouched
//! and writes nothing.

use std::path::{Path, PathBuf};

use super::configfs::Store;
use crate::error::Result;

/// US English language id
pub const LANG_US_ENG: u16 = 0x0409;

/// Encode an 8-bit value as `0xNN`
pub fn hex8(value: u8) -> String {
    format!("0x{:02x}", value)
}

/// Encode a 16-bit value as `0xNNNN`
pub fn hex16(value: u16) -> String {
    format!("0x{:04x}", value)
}

/// Directory name of a localized string set
pub fn lang_dir(lang: u16) -> String {
    hex16(lang)
}

/// Decode a `0x`-prefixed hex attribute
pub fn parse_hex(content: &str) -> Option<u32> {
    let content = content.trim();
    let digits = content
        .strip_prefix("0x")
        .or_else(|| content.strip_prefix("0X"))?;
    u32::from_str_radix(digits, 16).ok()
}

/// Decode a decimal attribute
pub fn parse_dec(content: &str) -> Option<u64> {
    content.trim().parse().ok()
}

/// A set of optional attributes that knows how to write itself
pub trait AttrSet {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()>;
}

/// Writes encoded attributes into one directory of the store
pub struct AttrWriter<'a> {
    store: &'a dyn Store,
    dir: PathBuf,
    written: usize,
}

impl<'a> AttrWriter<'a> {
    pub fn new(store: &'a dyn Store, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
            written: 0,
        }
    }

    /// Directory the attributes land in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of attribute files written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn hex8(&mut self, name: &str, value: Option<u8>) -> Result<()> {
        match value {
            Some(v) => self.put(name, &hex8(v)),
            None => Ok(()),
        }
    }

    pub fn hex16(&mut self, name: &str, value: Option<u16>) -> Result<()> {
        match value {
            Some(v) => self.put(name, &hex16(v)),
            None => Ok(()),
        }
    }

    pub fn dec<T: Into<u64>>(&mut self, name: &str, value: Option<T>) -> Result<()> {
        match value {
            Some(v) => self.put(name, &v.into().to_string()),
            None => Ok(()),
        }
    }

    pub fn flag(&mut self, name: &str, value: Option<bool>) -> Result<()> {
        match value {
            Some(v) => self.put(name, if v { "1" } else { "0" }),
            None => Ok(()),
        }
    }

    pub fn text(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.put(name, v),
            None => Ok(()),
        }
    }

    pub fn bytes(&mut self, name: &str, value: Option<&[u8]>) -> Result<()> {
        if let Some(data) = value {
            self.store.write_bytes(&self.dir.join(name), data)?;
            self.written += 1;
        }
        Ok(())
    }

    /// Run `f` against a child directory, creating it on first use.
    ///
    /// The directory is only created when `f` actually writes something, so an
    /// all-unset set stays free of side effects.
    pub fn child<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut ChildWriter<'_, 'a>) -> Result<()>,
    {
        let mut child = ChildWriter {
            parent: self,
            name,
            inner: None,
        };
        f(&mut child)?;
        if let Some(inner) = child.inner {
            self.written += inner.written;
        }
        Ok(())
    }

    fn put(&mut self, name: &str, content: &str) -> Result<()> {
        self.store.write_file(&self.dir.join(name), content)?;
        self.written += 1;
        Ok(())
    }
}

/// Lazily-created writer for a child directory, see [`AttrWriter::child`]
pub struct ChildWriter<'p, 'a> {
    parent: &'p AttrWriter<'a>,
    name: &'p str,
    inner: Option<AttrWriter<'a>>,
}

impl<'p, 'a> ChildWriter<'p, 'a> {
    /// Writer for the child directory, creating it if this is the first write
    pub fn get(&mut self) -> Result<&mut AttrWriter<'a>> {
        let inner = match self.inner.take() {
            Some(inner) => inner,
            None => {
                let dir = self.parent.dir.join(self.name);
                self.parent.store.create_dir(&dir)?;
                AttrWriter::new(self.parent.store, dir)
            }
        };
        Ok(self.inner.insert(inner))
    }
}
