//! Gadget lifecycle manager - owns the composition tree and drives its creation

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::attrs::{lang_dir, AttrSet, AttrWriter};
use super::configfs::{
    find_udc, ConfigFs, Store, CONFIGS_DIR, FUNCTIONS_DIR, STRINGS_DIR, UDC_ATTR,
};
use super::configuration::{Binding, ConfigAttrs, ConfigStrings, Configuration};
use super::function::{Function, FunctionEntry, FunctionHandle, FunctionKind};
use crate::error::{GadgetError, Result};

/// Default gadget name
pub const DEFAULT_GADGET_NAME: &str = "composer";

/// USB device descriptor fields. Unset fields keep the kernel default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetAttrs {
    /// USB version (0x0200 = USB 2.0)
    pub bcd_usb: Option<u16>,
    pub device_class: Option<u8>,
    pub device_sub_class: Option<u8>,
    pub device_protocol: Option<u8>,
    /// Max packet size for endpoint 0
    pub max_packet_size0: Option<u8>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    /// Device release number
    pub bcd_device: Option<u16>,
}

impl AttrSet for GadgetAttrs {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.hex16("bcdUSB", self.bcd_usb)?;
        w.hex8("bDeviceClass", self.device_class)?;
        w.hex8("bDeviceSubClass", self.device_sub_class)?;
        w.hex8("bDeviceProtocol", self.device_protocol)?;
        w.hex8("bMaxPacketSize0", self.max_packet_size0)?;
        w.hex16("idVendor", self.vendor_id)?;
        w.hex16("idProduct", self.product_id)?;
        w.hex16("bcdDevice", self.bcd_device)
    }
}

/// USB device strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GadgetStrings {
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl AttrSet for GadgetStrings {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.text("serialnumber", self.serial_number.as_deref())?;
        w.text("manufacturer", self.manufacturer.as_deref())?;
        w.text("product", self.product.as_deref())
    }
}

/// Reject names that cannot be a single configfs directory entry
pub(crate) fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(GadgetError::Config(format!("Invalid {} name: {:?}", what, name)));
    }
    Ok(())
}

/// Whether an operation touches the store or only records existing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Create,
    Register,
}

/// A USB gadget and everything it owns.
///
/// Configurations, functions and string sets are kept in creation order;
/// teardown walks them in that order. Bindings refer to functions by name only,
/// the gadget is the single owner of every function.
pub struct Gadget<S: Store = ConfigFs> {
    store: S,
    root: PathBuf,
    name: String,
    path: PathBuf,
    udc: Option<String>,
    configs: Vec<Configuration>,
    functions: Vec<FunctionEntry>,
    strings: Vec<PathBuf>,
}

impl Gadget<ConfigFs> {
    /// Create a gadget directory under `root` on the real filesystem
    pub fn create(root: impl Into<PathBuf>, name: &str) -> Result<Self> {
        Self::create_with_store(ConfigFs, root, name)
    }

    /// Track an existing gadget directory under `root` without creating anything
    pub fn attach(root: impl Into<PathBuf>, name: &str) -> Result<Self> {
        Self::attach_with_store(ConfigFs, root, name)
    }
}

impl<S: Store> Gadget<S> {
    fn new(store: S, root: PathBuf, name: &str) -> Result<Self> {
        validate_name("gadget", name)?;
        let path = root.join(name);
        Ok(Self {
            store,
            root,
            name: name.to_string(),
            path,
            udc: None,
            configs: Vec::new(),
            functions: Vec::new(),
            strings: Vec::new(),
        })
    }

    /// Create the gadget directory. An existing directory is reused, together
    /// with whatever controller it is still bound to.
    pub fn create_with_store(store: S, root: impl Into<PathBuf>, name: &str) -> Result<Self> {
        let mut gadget = Self::new(store, root.into(), name)?;
        gadget.store.create_dir(&gadget.path)?;
        gadget.udc = gadget.read_udc()?;
        if let Some(udc) = &gadget.udc {
            warn!("USB gadget {} is already bound to {}", gadget.name, udc);
        }
        info!("Created USB gadget {} at {}", gadget.name, gadget.path.display());
        Ok(gadget)
    }

    /// Track an existing gadget. Its activation state is read back from `UDC`;
    /// children have to be registered with the `register_*` methods.
    pub fn attach_with_store(store: S, root: impl Into<PathBuf>, name: &str) -> Result<Self> {
        let mut gadget = Self::new(store, root.into(), name)?;
        gadget.udc = gadget.read_udc()?;
        debug!("Attached to USB gadget {} (udc: {:?})", gadget.name, gadget.udc);
        Ok(gadget)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gadget directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root the gadget directory lives in
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Configurations in creation order
    pub fn configs(&self) -> &[Configuration] {
        &self.configs
    }

    /// Functions in creation order
    pub fn functions(&self) -> &[FunctionEntry] {
        &self.functions
    }

    /// Gadget string-set directories in creation order
    pub fn strings(&self) -> &[PathBuf] {
        &self.strings
    }

    pub fn config(&self, name: &str) -> Option<&Configuration> {
        self.configs.iter().find(|c| c.name() == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Whether the gadget is on a controller, as enabled here or found at creation
    pub fn is_enabled(&self) -> bool {
        self.udc.is_some()
    }

    /// Controller the gadget is enabled on
    pub fn udc(&self) -> Option<&str> {
        self.udc.as_deref()
    }

    /// Check the `UDC` attribute, regardless of who wrote it
    pub fn is_bound(&self) -> Result<bool> {
        self.read_udc().map(|udc| udc.is_some())
    }

    /// Controller named in `UDC`. A missing attribute means unbound.
    fn read_udc(&self) -> Result<Option<String>> {
        match self.store.read_file(&self.path.join(UDC_ATTR)) {
            Ok(udc) if udc.is_empty() => Ok(None),
            Ok(udc) => Ok(Some(udc)),
            Err(GadgetError::Io { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Write device descriptor fields
    pub fn set_attrs(&self, attrs: &GadgetAttrs) -> Result<()> {
        let mut w = AttrWriter::new(&self.store, &self.path);
        attrs.write(&mut w)?;
        debug!("Set {} device attributes on {}", w.written(), self.name);
        Ok(())
    }

    /// Create the string set for `lang` and write the device strings
    pub fn set_strings(&mut self, strs: &GadgetStrings, lang: u16) -> Result<()> {
        let dir = self.add_gadget_strings(lang, Mode::Create)?;
        let mut w = AttrWriter::new(&self.store, dir);
        strs.write(&mut w)?;
        debug!("Set {} strings ({}) on {}", w.written(), lang_dir(lang), self.name);
        Ok(())
    }

    /// Record an existing gadget string set for teardown
    pub fn register_strings(&mut self, lang: u16) -> Result<()> {
        self.add_gadget_strings(lang, Mode::Register).map(|_| ())
    }

    fn add_gadget_strings(&mut self, lang: u16, mode: Mode) -> Result<PathBuf> {
        let dir = self.path.join(STRINGS_DIR).join(lang_dir(lang));
        if mode == Mode::Create {
            self.store.create_dir(&dir)?;
        }
        if !self.strings.contains(&dir) {
            self.strings.push(dir.clone());
        }
        Ok(dir)
    }

    /// Create configuration `{label}.{id}` and return its name.
    ///
    /// Creating a configuration that is already registered is a no-op.
    pub fn create_config(&mut self, label: &str, id: u32) -> Result<String> {
        self.add_config(label, id, Mode::Create)
    }

    /// Record an existing configuration for teardown
    pub fn register_config(&mut self, label: &str, id: u32) -> Result<String> {
        self.add_config(label, id, Mode::Register)
    }

    fn add_config(&mut self, label: &str, id: u32, mode: Mode) -> Result<String> {
        validate_name("configuration label", label)?;
        let config = Configuration::new(&self.path.join(CONFIGS_DIR), label, id);
        let name = config.name().to_string();
        if self.config(&name).is_some() {
            debug!("Configuration {} already registered", name);
            return Ok(name);
        }

        if mode == Mode::Create {
            self.store.create_dir(config.path())?;
            debug!("Created configuration {}", name);
        }
        self.configs.push(config);
        Ok(name)
    }

    /// Write configuration attributes
    pub fn set_config_attrs(&self, config: &str, attrs: &ConfigAttrs) -> Result<()> {
        let path = self.require_config(config)?.path();
        let mut w = AttrWriter::new(&self.store, path);
        attrs.write(&mut w)?;
        debug!("Set {} attributes on configuration {}", w.written(), config);
        Ok(())
    }

    /// Create the configuration string set for `lang` and write its description
    pub fn set_config_strings(
        &mut self,
        config: &str,
        strs: &ConfigStrings,
        lang: u16,
    ) -> Result<()> {
        let dir = self.add_config_strings(config, lang, Mode::Create)?;
        let mut w = AttrWriter::new(&self.store, dir);
        strs.write(&mut w)?;
        debug!(
            "Set {} strings ({}) on configuration {}",
            w.written(),
            lang_dir(lang),
            config
        );
        Ok(())
    }

    /// Record an existing configuration string set for teardown
    pub fn register_config_strings(&mut self, config: &str, lang: u16) -> Result<()> {
        self.add_config_strings(config, lang, Mode::Register).map(|_| ())
    }

    fn add_config_strings(&mut self, config: &str, lang: u16, mode: Mode) -> Result<PathBuf> {
        let gadget = &self.name;
        let entry = self
            .configs
            .iter_mut()
            .find(|c| c.name() == config)
            .ok_or_else(|| GadgetError::UnknownConfig {
                gadget: gadget.clone(),
                config: config.to_string(),
            })?;

        let dir = entry.path().join(STRINGS_DIR).join(lang_dir(lang));
        if mode == Mode::Create {
            self.store.create_dir(&dir)?;
        }
        if !entry.strings.contains(&dir) {
            entry.strings.push(dir.clone());
        }
        Ok(dir)
    }

    /// Create function `{K::TYPE}.{instance}`.
    ///
    /// Creating a function that is already registered returns the existing one
    /// without touching the store.
    pub fn create_function<K: FunctionKind>(
        &mut self,
        instance: &str,
    ) -> Result<FunctionHandle<K>> {
        self.add_function(K::TYPE, instance, Mode::Create)
            .map(FunctionHandle::new)
    }

    /// Record an existing function for teardown
    pub fn register_function(
        &mut self,
        kind: &'static str,
        instance: &str,
    ) -> Result<FunctionEntry> {
        self.add_function(kind, instance, Mode::Register)
    }

    fn add_function(
        &mut self,
        kind: &'static str,
        instance: &str,
        mode: Mode,
    ) -> Result<FunctionEntry> {
        validate_name("function instance", instance)?;
        let entry = FunctionEntry::new(kind, instance, &self.path.join(FUNCTIONS_DIR));
        if let Some(existing) = self.function(entry.name()) {
            debug!("Function {} already registered", existing.name());
            return Ok(existing.clone());
        }

        if mode == Mode::Create {
            self.store.create_dir(entry.path())?;
            debug!("Created function {}", entry.name());
        }
        self.functions.push(entry.clone());
        Ok(entry)
    }

    /// Write function attributes. The function must belong to this gadget.
    pub fn set_function_attrs<K: FunctionKind>(
        &self,
        func: &FunctionHandle<K>,
        attrs: &K::Attrs,
    ) -> Result<()> {
        match self.function(func.name()) {
            Some(entry) if entry.path() == func.path() => {}
            _ => return Err(self.missing_function(func.name())),
        }
        let mut w = AttrWriter::new(&self.store, func.path());
        attrs.write(&mut w)?;
        debug!("Set {} attributes on function {}", w.written(), func.name());
        Ok(())
    }

    /// Expose `function` under `config` as the symlink `name`.
    ///
    /// Fails without touching the store if the function is not registered in
    /// this gadget or the configuration already has a binding called `name`.
    pub fn create_binding(&mut self, config: &str, function: &str, name: &str) -> Result<()> {
        self.add_binding(config, function, name, Mode::Create)
    }

    /// Record an existing binding for teardown
    pub fn register_binding(&mut self, config: &str, function: &str, name: &str) -> Result<()> {
        self.add_binding(config, function, name, Mode::Register)
    }

    fn add_binding(&mut self, config: &str, function: &str, name: &str, mode: Mode) -> Result<()> {
        validate_name("binding", name)?;
        let function_path = match self.function(function) {
            Some(entry) => entry.path().to_path_buf(),
            None => return Err(self.missing_function(function)),
        };

        let gadget = &self.name;
        let entry = self
            .configs
            .iter_mut()
            .find(|c| c.name() == config)
            .ok_or_else(|| GadgetError::UnknownConfig {
                gadget: gadget.clone(),
                config: config.to_string(),
            })?;
        if entry.binding(name).is_some() {
            return Err(GadgetError::DuplicateBinding {
                config: config.to_string(),
                binding: name.to_string(),
            });
        }

        let binding = Binding::new(entry.path(), name, function, &function_path);
        if mode == Mode::Create {
            self.store.create_symlink(&function_path, binding.link())?;
            debug!("Linked function {} into {} as {}", function, config, name);
        }
        entry.bindings.push(binding);
        Ok(())
    }

    /// Bind the gadget to a USB device controller
    pub fn enable(&mut self, udc: &str) -> Result<()> {
        let udc = udc.trim();
        if udc.is_empty() {
            return Err(GadgetError::Config(
                "Controller name must not be empty".to_string(),
            ));
        }
        self.store.write_file(&self.path.join(UDC_ATTR), udc)?;
        self.udc = Some(udc.to_string());
        info!("Enabled USB gadget {} on UDC {}", self.name, udc);
        Ok(())
    }

    /// Bind the gadget to the first controller found in sysfs
    pub fn enable_auto(&mut self) -> Result<String> {
        let udc = find_udc().ok_or(GadgetError::NoController)?;
        self.enable(&udc)?;
        Ok(udc)
    }

    /// Detach the gadget from its controller
    pub fn disable(&mut self) -> Result<()> {
        self.store.write_file(&self.path.join(UDC_ATTR), "\n")?;
        self.udc = None;
        info!("Disabled USB gadget {}", self.name);
        Ok(())
    }

    /// Forget every child after a completed teardown
    pub(super) fn reset(&mut self) {
        self.udc = None;
        self.configs.clear();
        self.functions.clear();
        self.strings.clear();
    }

    fn require_config(&self, config: &str) -> Result<&Configuration> {
        self.config(config).ok_or_else(|| GadgetError::UnknownConfig {
            gadget: self.name.clone(),
            config: config.to_string(),
        })
    }

    fn missing_function(&self, function: &str) -> GadgetError {
        GadgetError::PrerequisiteMissing {
            gadget: self.name.clone(),
            function: function.to_string(),
        }
    }
}

impl<S: Store> std::fmt::Debug for Gadget<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gadget")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("udc", &self.udc)
            .field("configs", &self.configs)
            .field("functions", &self.functions)
            .field("strings", &self.strings)
            .finish()
    }
}
