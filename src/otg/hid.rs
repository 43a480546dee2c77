//! HID Function implementation for USB Gadget

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::attrs::{AttrSet, AttrWriter};
use super::configfs::Store;
use super::function::{Function, FunctionHandle, FunctionKind};
use super::report_desc::{ABSOLUTE_MOUSE, BOOT_KEYBOARD, BOOT_MOUSE, CONSUMER_CONTROL};
use crate::error::{GadgetError, Result};

/// Human interface device function
#[derive(Debug, Clone, Copy)]
pub struct Hid;

impl FunctionKind for Hid {
    const TYPE: &'static str = "hid";
    type Attrs = HidAttrs;
}

/// HID function attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidAttrs {
    /// Interface subclass (1 = boot interface)
    pub subclass: Option<u8>,
    /// Interface protocol (1 = keyboard, 2 = mouse)
    pub protocol: Option<u8>,
    /// Report length in bytes
    pub report_length: Option<u16>,
    /// Raw report descriptor
    pub report_desc: Option<Vec<u8>>,
    /// Drop the interrupt OUT endpoint
    pub no_out_endpoint: Option<bool>,
}

impl HidAttrs {
    /// Fields set in `other` replace the ones in `self`
    pub fn with_overrides(self, other: &HidAttrs) -> HidAttrs {
        HidAttrs {
            subclass: other.subclass.or(self.subclass),
            protocol: other.protocol.or(self.protocol),
            report_length: other.report_length.or(self.report_length),
            report_desc: other.report_desc.clone().or(self.report_desc),
            no_out_endpoint: other.no_out_endpoint.or(self.no_out_endpoint),
        }
    }
}

impl AttrSet for HidAttrs {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.dec("subclass", self.subclass)?;
        w.dec("protocol", self.protocol)?;
        w.dec("report_length", self.report_length)?;
        w.bytes("report_desc", self.report_desc.as_deref())?;
        w.flag("no_out_endpoint", self.no_out_endpoint)
    }
}

/// Ready-made HID device shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HidPreset {
    /// Boot keyboard with LEDs, 8-byte reports
    Keyboard,
    /// Boot mouse with wheel, 4-byte reports
    Mouse,
    /// Absolute pointer, 6-byte reports
    AbsoluteMouse,
    /// Media keys, 2-byte reports
    ConsumerControl,
}

impl HidPreset {
    /// 1 for boot interface devices, 0 otherwise
    pub fn subclass(&self) -> u8 {
        match self {
            HidPreset::Keyboard | HidPreset::Mouse => 1,
            HidPreset::AbsoluteMouse | HidPreset::ConsumerControl => 0,
        }
    }

    pub fn protocol(&self) -> u8 {
        match self {
            HidPreset::Keyboard => 1,
            HidPreset::Mouse => 2,
            HidPreset::AbsoluteMouse | HidPreset::ConsumerControl => 0,
        }
    }

    pub fn report_length(&self) -> u16 {
        match self {
            HidPreset::Keyboard => 8,
            HidPreset::Mouse => 4,
            HidPreset::AbsoluteMouse => 6,
            HidPreset::ConsumerControl => 2,
        }
    }

    pub fn report_desc(&self) -> &'static [u8] {
        match self {
            HidPreset::Keyboard => BOOT_KEYBOARD,
            HidPreset::Mouse => BOOT_MOUSE,
            HidPreset::AbsoluteMouse => ABSOLUTE_MOUSE,
            HidPreset::ConsumerControl => CONSUMER_CONTROL,
        }
    }

    pub fn attrs(&self) -> HidAttrs {
        HidAttrs {
            subclass: Some(self.subclass()),
            protocol: Some(self.protocol()),
            report_length: Some(self.report_length()),
            report_desc: Some(self.report_desc().to_vec()),
            no_out_endpoint: None,
        }
    }
}

impl FunctionHandle<Hid> {
    /// Character device number (`major:minor`) the kernel assigned.
    ///
    /// Only present once the function exists in a live configfs tree.
    pub fn device_number(&self, store: &dyn Store) -> Result<String> {
        store.read_file(&self.path().join("dev"))
    }

    /// Device node of this function (e.g., /dev/hidg0), derived from the minor number
    pub fn device_path(&self, store: &dyn Store) -> Result<PathBuf> {
        let dev = self.device_number(store)?;
        let minor = dev
            .split_once(':')
            .and_then(|(_, minor)| minor.parse::<u32>().ok())
            .ok_or_else(|| {
                GadgetError::Config(format!(
                    "Unexpected device number {:?} for {}",
                    dev,
                    self.name()
                ))
            })?;
        Ok(PathBuf::from(format!("/dev/hidg{}", minor)))
    }

    /// Open the device node for bidirectional report I/O.
    ///
    /// Reports written to the file go to the host; reads return output
    /// reports (e.g. keyboard LEDs). Requires the gadget to be enabled.
    pub fn open_device(&self, store: &dyn Store) -> Result<File> {
        let path = self.device_path(store)?;
        debug!("Opening HID device {} for {}", path.display(), self.name());
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| GadgetError::io("open", path, e))
    }
}
