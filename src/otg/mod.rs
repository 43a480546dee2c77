//! USB gadget composition over configfs
//!
//! A gadget owns its configurations, functions and string sets. Functions are
//! offered to the host by binding them into configurations; the gadget goes
//! live once a UDC is written.
//!
//! Layout:
//! ```text
//! Gadget (manager.rs, teardown.rs)
//!     ├── strings/<lang>
//!     ├── functions/<type>.<instance>   (ether.rs, hid.rs, msd.rs)
//!     └── configs/<label>.<id>          (configuration.rs)
//!             ├── strings/<lang>
//!             └── <binding> -> functions/<type>.<instance>
//! ```
//!
//! All filesystem access goes through [`Store`]; [`ConfigFs`] is the real one.

pub mod attrs;
pub mod compose;
pub mod configfs;
pub mod configuration;
pub mod ether;
pub mod function;
pub mod hid;
pub mod manager;
pub mod msd;
pub mod report_desc;
pub mod teardown;

#[cfg(test)]
mod testing;

pub use attrs::{AttrSet, AttrWriter};
pub use configfs::{ConfigFs, Store};
pub use configuration::{Binding, ConfigAttrs, ConfigStrings, Configuration};
pub use ether::{Ecm, EthernetAttrs, Ncm, Rndis};
pub use function::{Function, FunctionEntry, FunctionHandle, FunctionKind};
pub use hid::{Hid, HidAttrs, HidPreset};
pub use manager::{Gadget, GadgetAttrs, GadgetStrings};
pub use msd::{LunAttrs, MassStorage, MassStorageAttrs};
pub use report_desc::{ABSOLUTE_MOUSE, BOOT_KEYBOARD, BOOT_MOUSE, CONSUMER_CONTROL};
pub use teardown::TeardownStep;
