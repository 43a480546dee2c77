//! Gadget configurations and the bindings they own

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::attrs::{AttrSet, AttrWriter};
use crate::error::Result;

/// Label used by most gadget scripts (`configs/c.1`)
pub const DEFAULT_CONFIG_LABEL: &str = "c";

/// bmAttributes bit 7, must always be set
pub const ATTR_RESERVED: u8 = 0x80;
/// bmAttributes bit 6
pub const ATTR_SELF_POWERED: u8 = 0x40;
/// bmAttributes bit 5
pub const ATTR_REMOTE_WAKEUP: u8 = 0x20;

/// Derive a configuration directory name
pub fn config_name(label: &str, id: u32) -> String {
    format!("{}.{}", label, id)
}

/// Configuration attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigAttrs {
    /// Maximum power draw in mA
    pub max_power: Option<u16>,
    /// bmAttributes power/wakeup bits
    pub attributes: Option<u8>,
}

impl AttrSet for ConfigAttrs {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.dec("MaxPower", self.max_power)?;
        w.hex8("bmAttributes", self.attributes)
    }
}

/// Configuration description string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigStrings {
    pub configuration: Option<String>,
}

impl AttrSet for ConfigStrings {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.text("configuration", self.configuration.as_deref())
    }
}

/// A function exposed under a configuration, realized as a symlink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    name: String,
    link: PathBuf,
    function: String,
    function_path: PathBuf,
}

impl Binding {
    pub(crate) fn new(
        config_path: &Path,
        name: &str,
        function: &str,
        function_path: &Path,
    ) -> Self {
        Self {
            name: name.to_string(),
            link: config_path.join(name),
            function: function.to_string(),
            function_path: function_path.to_path_buf(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symlink location inside the configuration directory
    pub fn link(&self) -> &Path {
        &self.link
    }

    /// Name of the bound function
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Where the symlink points
    pub fn function_path(&self) -> &Path {
        &self.function_path
    }
}

/// A configuration registered in a gadget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    name: String,
    label: String,
    id: u32,
    path: PathBuf,
    pub(crate) bindings: Vec<Binding>,
    pub(crate) strings: Vec<PathBuf>,
}

impl Configuration {
    pub(crate) fn new(configs_dir: &Path, label: &str, id: u32) -> Self {
        let name = config_name(label, id);
        let path = configs_dir.join(&name);
        Self {
            name,
            label: label.to_string(),
            id,
            path,
            bindings: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bindings in creation order
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// String-set directories in creation order
    pub fn strings(&self) -> &[PathBuf] {
        &self.strings
    }
}
