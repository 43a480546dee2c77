//! gadget-composer - declarative USB gadget composition over Linux configfs
//!
//! This crate builds, activates and tears down USB device personalities
//! (network adapters, HID devices, mass storage) through the kernel's
//! configfs gadget interface.

pub mod config;
pub mod error;
pub mod otg;

pub use error::{GadgetError, Result};
