//! USB gadget function contract

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use super::attrs::AttrSet;

/// A kind of USB function the kernel knows how to instantiate.
///
/// Adding a new function type only needs a new implementation of this trait:
/// the gadget tree and its teardown only ever look at name and path.
pub trait FunctionKind {
    /// configfs function type, the part of the directory name before the dot
    const TYPE: &'static str;

    /// Attributes this function type accepts
    type Attrs: AttrSet;
}

/// Identity and location shared by every function
pub trait Function {
    /// Function name (e.g., "hid.usb0", "ecm.usb0")
    fn name(&self) -> &str;

    /// Function directory (e.g., `<root>/<gadget>/functions/hid.usb0`)
    fn path(&self) -> &Path;
}

/// Derive a function directory name from type and instance
pub fn function_name(kind: &str, instance: &str) -> String {
    format!("{}.{}", kind, instance)
}

/// A function registered in a gadget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    kind: &'static str,
    instance: String,
    name: String,
    path: PathBuf,
}

impl FunctionEntry {
    pub(crate) fn new(kind: &'static str, instance: &str, functions_dir: &Path) -> Self {
        let name = function_name(kind, instance);
        let path = functions_dir.join(&name);
        Self {
            kind,
            instance: instance.to_string(),
            name,
            path,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }
}

impl Function for FunctionEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Typed handle to a registered function, returned by
/// [`Gadget::create_function`](super::Gadget::create_function)
pub struct FunctionHandle<K: FunctionKind> {
    entry: FunctionEntry,
    _kind: PhantomData<fn() -> K>,
}

impl<K: FunctionKind> FunctionHandle<K> {
    pub(crate) fn new(entry: FunctionEntry) -> Self {
        Self {
            entry,
            _kind: PhantomData,
        }
    }

    pub fn entry(&self) -> &FunctionEntry {
        &self.entry
    }

    pub fn instance(&self) -> &str {
        self.entry.instance()
    }
}

impl<K: FunctionKind> Function for FunctionHandle<K> {
    fn name(&self) -> &str {
        self.entry.name()
    }

    fn path(&self) -> &Path {
        self.entry.path()
    }
}

impl<K: FunctionKind> Clone for FunctionHandle<K> {
    fn clone(&self) -> Self {
        Self::new(self.entry.clone())
    }
}

impl<K: FunctionKind> fmt::Debug for FunctionHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("kind", &K::TYPE)
            .field("name", &self.entry.name)
            .field("path", &self.entry.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_entry_naming() {
        let entry = FunctionEntry::new("hid", "usb0", Path::new("/cfg/g1/functions"));
        assert_eq!(entry.name(), "hid.usb0");
        assert_eq!(entry.kind(), "hid");
        assert_eq!(entry.instance(), "usb0");
        assert_eq!(entry.path(), Path::new("/cfg/g1/functions/hid.usb0"));
    }
}
