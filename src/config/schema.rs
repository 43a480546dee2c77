use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GadgetError, Result};
use crate::otg::attrs::LANG_US_ENG;
use crate::otg::configfs::default_root;
use crate::otg::configuration::{config_name, DEFAULT_CONFIG_LABEL};
use crate::otg::ether::{Ecm, EthernetAttrs, Ncm, Rndis};
use crate::otg::function::{function_name, FunctionKind};
use crate::otg::hid::{Hid, HidAttrs, HidPreset};
use crate::otg::manager::{validate_name, DEFAULT_GADGET_NAME};
use crate::otg::msd::{MassStorage, MassStorageAttrs};
use crate::otg::{ConfigAttrs, ConfigStrings, GadgetAttrs, GadgetStrings};

/// A complete gadget composition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Directory gadgets are created in
    pub root: PathBuf,
    /// Controller to enable the gadget on (auto-detected when unset)
    pub udc: Option<String>,
    /// The gadget tree
    pub gadget: GadgetConfig,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            udc: None,
            gadget: GadgetConfig::default(),
        }
    }
}

/// Gadget node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetConfig {
    pub name: String,
    pub attrs: GadgetAttrs,
    pub strings: Vec<GadgetStringsConfig>,
    /// Functions, created in this order
    pub functions: Vec<FunctionConfig>,
    /// Configurations, created in this order after the functions
    pub configs: Vec<ConfigurationConfig>,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_GADGET_NAME.to_string(),
            attrs: GadgetAttrs::default(),
            strings: Vec::new(),
            functions: Vec::new(),
            configs: Vec::new(),
        }
    }
}

/// Device strings for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GadgetStringsConfig {
    #[serde(default = "default_lang")]
    pub lang: u16,
    #[serde(flatten)]
    pub strings: GadgetStrings,
}

/// Configuration node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationConfig {
    pub label: String,
    pub id: u32,
    pub attrs: ConfigAttrs,
    pub strings: Vec<ConfigStringsConfig>,
    /// Bindings, linked in this order
    pub bindings: Vec<BindingConfig>,
}

impl Default for ConfigurationConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_CONFIG_LABEL.to_string(),
            id: 1,
            attrs: ConfigAttrs::default(),
            strings: Vec::new(),
            bindings: Vec::new(),
        }
    }
}

impl ConfigurationConfig {
    pub fn name(&self) -> String {
        config_name(&self.label, self.id)
    }
}

/// Configuration description for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStringsConfig {
    #[serde(default = "default_lang")]
    pub lang: u16,
    #[serde(flatten)]
    pub strings: ConfigStrings,
}

/// A function offered under a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Function name, e.g. "hid.usb0"
    pub function: String,
    /// Symlink name; defaults to the function name
    #[serde(default)]
    pub name: Option<String>,
}

impl BindingConfig {
    pub fn link_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.function)
    }
}

/// Function node, tagged by configfs function type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FunctionConfig {
    Ecm {
        instance: String,
        #[serde(flatten)]
        attrs: EthernetAttrs,
    },
    Ncm {
        instance: String,
        #[serde(flatten)]
        attrs: EthernetAttrs,
    },
    Rndis {
        instance: String,
        #[serde(flatten)]
        attrs: EthernetAttrs,
    },
    Hid {
        instance: String,
        /// Base attributes; explicit fields override the preset
        #[serde(default)]
        preset: Option<HidPreset>,
        #[serde(flatten)]
        attrs: HidAttrs,
    },
    MassStorage {
        instance: String,
        #[serde(flatten)]
        attrs: MassStorageAttrs,
    },
}

impl FunctionConfig {
    /// configfs function type
    pub fn kind(&self) -> &'static str {
        match self {
            FunctionConfig::Ecm { .. } => Ecm::TYPE,
            FunctionConfig::Ncm { .. } => Ncm::TYPE,
            FunctionConfig::Rndis { .. } => Rndis::TYPE,
            FunctionConfig::Hid { .. } => Hid::TYPE,
            FunctionConfig::MassStorage { .. } => MassStorage::TYPE,
        }
    }

    pub fn instance(&self) -> &str {
        match self {
            FunctionConfig::Ecm { instance, .. }
            | FunctionConfig::Ncm { instance, .. }
            | FunctionConfig::Rndis { instance, .. }
            | FunctionConfig::Hid { instance, .. }
            | FunctionConfig::MassStorage { instance, .. } => instance,
        }
    }

    pub fn name(&self) -> String {
        function_name(self.kind(), self.instance())
    }
}

fn default_lang() -> u16 {
    LANG_US_ENG
}

impl ComposerConfig {
    /// Check names and cross-references before anything touches the store
    pub fn validate(&self) -> Result<()> {
        let gadget = &self.gadget;
        validate_name("gadget", &gadget.name)?;
        unique_langs("gadget strings", gadget.strings.iter().map(|s| s.lang))?;

        let mut functions = HashSet::new();
        for function in &gadget.functions {
            validate_name("function instance", function.instance())?;
            if !functions.insert(function.name()) {
                return Err(GadgetError::Config(format!(
                    "Duplicate function {}",
                    function.name()
                )));
            }
        }

        let mut configs = HashSet::new();
        for config in &gadget.configs {
            validate_name("configuration label", &config.label)?;
            let name = config.name();
            if !configs.insert(name.clone()) {
                return Err(GadgetError::Config(format!(
                    "Duplicate configuration {}",
                    name
                )));
            }
            unique_langs(
                &format!("strings of {}", name),
                config.strings.iter().map(|s| s.lang),
            )?;

            let mut links = HashSet::new();
            for binding in &config.bindings {
                validate_name("binding", binding.link_name())?;
                if !functions.contains(&binding.function) {
                    return Err(GadgetError::Config(format!(
                        "Configuration {} binds undeclared function {}",
                        name, binding.function
                    )));
                }
                if !links.insert(binding.link_name()) {
                    return Err(GadgetError::Config(format!(
                        "Duplicate binding {} in configuration {}",
                        binding.link_name(),
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn unique_langs(what: &str, langs: impl Iterator<Item = u16>) -> Result<()> {
    let mut seen = HashSet::new();
    for lang in langs {
        if !seen.insert(lang) {
            return Err(GadgetError::Config(format!(
                "Language 0x{:04x} listed twice in {}",
                lang, what
            )));
        }
    }
    Ok(())
}
