//! Build a gadget tree from a declarative composition
//!
//! Creation runs in dependency order: gadget, device attributes and strings,
//! functions, configurations, then bindings. Enabling is left to the caller.

use tracing::info;

use super::configfs::Store;
use super::ether::{Ecm, Ncm, Rndis};
use super::function::FunctionKind;
use super::hid::Hid;
use super::manager::Gadget;
use super::msd::MassStorage;
use crate::config::{ComposerConfig, FunctionConfig};
use crate::error::Result;

/// Create every node of `config` in `store`
pub fn build<S: Store>(store: S, config: &ComposerConfig) -> Result<Gadget<S>> {
    let tree = &config.gadget;
    let mut gadget = Gadget::create_with_store(store, &config.root, &tree.name)?;

    gadget.set_attrs(&tree.attrs)?;
    for strings in &tree.strings {
        gadget.set_strings(&strings.strings, strings.lang)?;
    }

    for function in &tree.functions {
        match function {
            FunctionConfig::Ecm { instance, attrs } => {
                create_function::<Ecm, S>(&mut gadget, instance, attrs)?
            }
            FunctionConfig::Ncm { instance, attrs } => {
                create_function::<Ncm, S>(&mut gadget, instance, attrs)?
            }
            FunctionConfig::Rndis { instance, attrs } => {
                create_function::<Rndis, S>(&mut gadget, instance, attrs)?
            }
            FunctionConfig::Hid {
                instance,
                preset,
                attrs,
            } => {
                let attrs = preset
                    .map(|p| p.attrs())
                    .unwrap_or_default()
                    .with_overrides(attrs);
                create_function::<Hid, S>(&mut gadget, instance, &attrs)?
            }
            FunctionConfig::MassStorage { instance, attrs } => {
                create_function::<MassStorage, S>(&mut gadget, instance, attrs)?
            }
        }
    }

    for config in &tree.configs {
        let name = gadget.create_config(&config.label, config.id)?;
        gadget.set_config_attrs(&name, &config.attrs)?;
        for strings in &config.strings {
            gadget.set_config_strings(&name, &strings.strings, strings.lang)?;
        }
        for binding in &config.bindings {
            gadget.create_binding(&name, &binding.function, binding.link_name())?;
        }
    }

    info!(
        "Built gadget {}: {} functions, {} configurations",
        gadget.name(),
        gadget.functions().len(),
        gadget.configs().len()
    );
    Ok(gadget)
}

/// Track the nodes of `config` as they already exist in `store`, so that a
/// gadget left behind by a previous run can be torn down
pub fn attach<S: Store>(store: S, config: &ComposerConfig) -> Result<Gadget<S>> {
    let tree = &config.gadget;
    let mut gadget = Gadget::attach_with_store(store, &config.root, &tree.name)?;

    for strings in &tree.strings {
        gadget.register_strings(strings.lang)?;
    }
    for function in &tree.functions {
        gadget.register_function(function.kind(), function.instance())?;
    }
    for config in &tree.configs {
        let name = gadget.register_config(&config.label, config.id)?;
        for strings in &config.strings {
            gadget.register_config_strings(&name, strings.lang)?;
        }
        for binding in &config.bindings {
            gadget.register_binding(&name, &binding.function, binding.link_name())?;
        }
    }

    Ok(gadget)
}

fn create_function<K: FunctionKind, S: Store>(
    gadget: &mut Gadget<S>,
    instance: &str,
    attrs: &K::Attrs,
) -> Result<()> {
    let handle = gadget.create_function::<K>(instance)?;
    gadget.set_function_attrs(&handle, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_json;
    use crate::otg::report_desc::BOOT_KEYBOARD;
    use crate::otg::testing::RecordingStore;
    use crate::otg::ConfigFs;
    use std::fs;
    use tempfile::TempDir;

    fn composition(root: &std::path::Path) -> ComposerConfig {
        let mut config = from_json(
            r#"{ "gadget": {
                "name": "g1",
                "attrs": { "vendor_id": 7531, "product_id": 260 },
                "strings": [{ "serial_number": "0001", "product": "Combo" }],
                "functions": [
                    { "type": "hid", "instance": "usb0", "preset": "keyboard" },
                    { "type": "ncm", "instance": "usb0", "dev_addr": "42:61:64:55:53:42" }
                ],
                "configs": [{
                    "attrs": { "max_power": 250, "attributes": 128 },
                    "strings": [{ "configuration": "Combo" }],
                    "bindings": [{ "function": "hid.usb0" }, { "function": "ncm.usb0", "name": "net" }]
                }]
            } }"#,
        )
        .unwrap();
        config.root = root.to_path_buf();
        config
    }

    #[test]
    fn test_build_materializes_tree() {
        let tmp = TempDir::new().unwrap();
        let gadget = build(ConfigFs, &composition(tmp.path())).unwrap();
        let base = tmp.path().join("g1");

        let read = |p: &str| fs::read_to_string(base.join(p)).unwrap();
        assert_eq!(read("idVendor"), "0x1d6b\n");
        assert_eq!(read("idProduct"), "0x0104\n");
        assert_eq!(read("strings/0x0409/serialnumber"), "0001\n");
        assert!(!base.join("strings/0x0409/manufacturer").exists());
        assert_eq!(read("functions/hid.usb0/protocol"), "1\n");
        assert_eq!(
            fs::read(base.join("functions/hid.usb0/report_desc")).unwrap(),
            BOOT_KEYBOARD
        );
        assert_eq!(read("functions/ncm.usb0/dev_addr"), "42:61:64:55:53:42\n");
        assert_eq!(read("configs/c.1/MaxPower"), "250\n");
        assert_eq!(read("configs/c.1/bmAttributes"), "0x80\n");
        assert_eq!(read("configs/c.1/strings/0x0409/configuration"), "Combo\n");
        assert_eq!(
            fs::read_link(base.join("configs/c.1/net")).unwrap(),
            base.join("functions/ncm.usb0")
        );
        assert!(!gadget.is_enabled());
    }

    #[test]
    fn test_attach_tears_down_built_tree() {
        let tmp = TempDir::new().unwrap();
        let config = composition(tmp.path());
        let mut built = build(ConfigFs, &config).unwrap();
        built.enable("dummy_udc.0").unwrap();
        let plan = built.teardown_plan();
        drop(built);

        let mut attached = attach(RecordingStore::new(), &config).unwrap();
        assert!(attached.store().ops().is_empty());
        assert_eq!(attached.teardown_plan(), plan);

        attached.cleanup().unwrap();
        assert!(!tmp.path().join("g1").exists());
    }
}
