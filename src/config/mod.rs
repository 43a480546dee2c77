//! Declarative gadget compositions
//!
//! A composition is a JSON document describing one gadget tree:
//!
//! ```json
//! {
//!   "root": "/sys/kernel/config/usb_gadget",
//!   "gadget": {
//!     "name": "g1",
//!     "attrs": { "vendor_id": 7531, "product_id": 260 },
//!     "strings": [{ "lang": 1033, "manufacturer": "Acme", "product": "Keyboard" }],
//!     "functions": [{ "type": "hid", "instance": "usb0", "preset": "keyboard" }],
//!     "configs": [{
//!       "label": "c", "id": 1,
//!       "attrs": { "max_power": 250 },
//!       "bindings": [{ "function": "hid.usb0" }]
//!     }]
//!   }
//! }
//! ```

mod schema;
pub use schema::*;

use std::path::Path;

use crate::error::{GadgetError, Result};

/// Load and validate a composition file
pub fn load(path: &Path) -> Result<ComposerConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| GadgetError::io("read", path, e))?;
    let config = from_json(&content)?;
    tracing::debug!(
        "Loaded composition {} from {}",
        config.gadget.name,
        path.display()
    );
    Ok(config)
}

/// Parse and validate a composition
pub fn from_json(content: &str) -> Result<ComposerConfig> {
    let config: ComposerConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}
