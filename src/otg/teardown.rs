//! Strict-order gadget teardown
//!
//! configfs refuses to remove a directory that still has children created by
//! userspace, so the tree is dismantled leaves first:
//!
//! ```text
//! disable (if enabled)
//! for each configuration:
//!     unlink bindings -> remove string sets -> remove configuration
//! remove functions
//! remove gadget string sets
//! remove gadget
//! ```
//!
//! The first failing step aborts the walk. Nothing is rolled back; removal of
//! already-missing entries succeeds, so running cleanup again resumes where the
//! previous attempt stopped.

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::configfs::Store;
use super::function::Function;
use super::manager::Gadget;
use crate::error::{GadgetError, Result};

/// One step of the teardown walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownStep {
    Disable,
    Unlink {
        config: String,
        binding: String,
        path: PathBuf,
    },
    RemoveConfigStrings {
        config: String,
        path: PathBuf,
    },
    RemoveConfig {
        config: String,
        path: PathBuf,
    },
    RemoveFunction {
        function: String,
        path: PathBuf,
    },
    RemoveGadgetStrings {
        path: PathBuf,
    },
    RemoveGadget {
        path: PathBuf,
    },
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownStep::Disable => write!(f, "disable"),
            TeardownStep::Unlink {
                config, binding, ..
            } => write!(f, "unlink binding {} from {}", binding, config),
            TeardownStep::RemoveConfigStrings { config, path } => {
                write!(f, "remove strings {} of {}", path.display(), config)
            }
            TeardownStep::RemoveConfig { config, .. } => {
                write!(f, "remove configuration {}", config)
            }
            TeardownStep::RemoveFunction { function, .. } => {
                write!(f, "remove function {}", function)
            }
            TeardownStep::RemoveGadgetStrings { path } => {
                write!(f, "remove gadget strings {}", path.display())
            }
            TeardownStep::RemoveGadget { path } => {
                write!(f, "remove gadget {}", path.display())
            }
        }
    }
}

impl<S: Store> Gadget<S> {
    /// The steps [`cleanup`](Self::cleanup) would run, in order
    pub fn teardown_plan(&self) -> Vec<TeardownStep> {
        let mut steps = Vec::new();

        if self.is_enabled() {
            steps.push(TeardownStep::Disable);
        }

        for config in self.configs() {
            for binding in config.bindings() {
                steps.push(TeardownStep::Unlink {
                    config: config.name().to_string(),
                    binding: binding.name().to_string(),
                    path: binding.link().to_path_buf(),
                });
            }
            for path in config.strings() {
                steps.push(TeardownStep::RemoveConfigStrings {
                    config: config.name().to_string(),
                    path: path.clone(),
                });
            }
            steps.push(TeardownStep::RemoveConfig {
                config: config.name().to_string(),
                path: config.path().to_path_buf(),
            });
        }

        for function in self.functions() {
            steps.push(TeardownStep::RemoveFunction {
                function: function.name().to_string(),
                path: function.path().to_path_buf(),
            });
        }

        for path in self.strings() {
            steps.push(TeardownStep::RemoveGadgetStrings { path: path.clone() });
        }

        steps.push(TeardownStep::RemoveGadget {
            path: self.path().to_path_buf(),
        });

        steps
    }

    /// Undo everything this gadget created.
    ///
    /// Stops at the first failing step with [`GadgetError::PartialTeardown`];
    /// the gadget keeps its registrations so cleanup can be retried.
    pub fn cleanup(&mut self) -> Result<()> {
        info!("Cleaning up USB gadget {}", self.name());

        for (completed, step) in self.teardown_plan().into_iter().enumerate() {
            debug!("Teardown of {}: {}", self.name(), step);
            if let Err(e) = self.run_step(&step) {
                warn!("Teardown of {} failed at {}: {}", self.name(), step, e);
                return Err(GadgetError::PartialTeardown {
                    gadget: self.name().to_string(),
                    step,
                    completed,
                    source: Box::new(e),
                });
            }
        }

        self.reset();
        info!("USB gadget {} removed", self.name());
        Ok(())
    }

    fn run_step(&mut self, step: &TeardownStep) -> Result<()> {
        match step {
            TeardownStep::Disable => self.disable(),
            TeardownStep::Unlink { path, .. } => self.store().remove_symlink(path),
            TeardownStep::RemoveConfigStrings { path, .. }
            | TeardownStep::RemoveConfig { path, .. }
            | TeardownStep::RemoveFunction { path, .. }
            | TeardownStep::RemoveGadgetStrings { path }
            | TeardownStep::RemoveGadget { path } => self.store().remove_dir(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otg::attrs::LANG_US_ENG;
    use crate::otg::configuration::{ConfigAttrs, ConfigStrings};
    use crate::otg::ether::Ecm;
    use crate::otg::hid::{Hid, HidAttrs};
    use crate::otg::manager::{GadgetAttrs, GadgetStrings};
    use crate::otg::testing::{Op, RecordingStore};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Two configurations with two bindings each, all string sets, enabled
    fn populated(root: &Path) -> Gadget<RecordingStore> {
        let mut g = Gadget::create_with_store(RecordingStore::new(), root, "g1").unwrap();
        g.set_strings(&GadgetStrings::default(), LANG_US_ENG).unwrap();
        let hid = g.create_function::<Hid>("usb0").unwrap();
        let ecm = g.create_function::<Ecm>("usb0").unwrap();
        for id in 1..=2 {
            let config = g.create_config("c", id).unwrap();
            g.set_config_strings(&config, &ConfigStrings::default(), LANG_US_ENG)
                .unwrap();
            g.create_binding(&config, hid.name(), "f1").unwrap();
            g.create_binding(&config, ecm.name(), "f2").unwrap();
        }
        g.enable("controller0").unwrap();
        g.store().clear();
        g
    }

    fn expected_op(gadget: &Path, step: &TeardownStep) -> Op {
        match step {
            TeardownStep::Disable => Op::Write(gadget.join("UDC"), "\n".to_string()),
            TeardownStep::Unlink { path, .. } => Op::RemoveSymlink(path.clone()),
            TeardownStep::RemoveConfigStrings { path, .. }
            | TeardownStep::RemoveConfig { path, .. }
            | TeardownStep::RemoveFunction { path, .. }
            | TeardownStep::RemoveGadgetStrings { path }
            | TeardownStep::RemoveGadget { path } => Op::RemoveDir(path.clone()),
        }
    }

    #[test]
    fn test_teardown_order() {
        let tmp = TempDir::new().unwrap();
        let mut g = populated(tmp.path());
        let base = g.path().to_path_buf();

        g.cleanup().unwrap();

        let rm = |p: &str| Op::RemoveDir(base.join(p));
        let unlink = |p: &str| Op::RemoveSymlink(base.join(p));
        assert_eq!(
            g.store().ops(),
            vec![
                Op::Write(base.join("UDC"), "\n".to_string()),
                unlink("configs/c.1/f1"),
                unlink("configs/c.1/f2"),
                rm("configs/c.1/strings/0x0409"),
                rm("configs/c.1"),
                unlink("configs/c.2/f1"),
                unlink("configs/c.2/f2"),
                rm("configs/c.2/strings/0x0409"),
                rm("configs/c.2"),
                rm("functions/hid.usb0"),
                rm("functions/ecm.usb0"),
                rm("strings/0x0409"),
                Op::RemoveDir(base.clone()),
            ]
        );
        assert!(!base.exists());
        assert!(!g.is_enabled());
        assert!(g.configs().is_empty());
        assert!(g.functions().is_empty());
        assert!(g.strings().is_empty());
    }

    #[test]
    fn test_fault_halts_later_steps() {
        let tmp = TempDir::new().unwrap();
        let plan = populated(tmp.path()).teardown_plan();
        assert_eq!(plan.len(), 13);
        fs::remove_dir_all(tmp.path().join("g1")).unwrap();

        for (index, step) in plan.iter().enumerate() {
            let mut g = populated(tmp.path());
            let target = expected_op(g.path(), step);
            g.store().fail_when(move |op| *op == target);

            let err = g.cleanup().unwrap_err();
            match &err {
                GadgetError::PartialTeardown {
                    gadget,
                    step: failed,
                    completed,
                    ..
                } => {
                    assert_eq!(gadget, "g1");
                    assert_eq!(failed, step);
                    assert_eq!(*completed, index);
                }
                other => panic!("unexpected error: {}", other),
            }
            assert_eq!(err.teardown_step(), Some(step));

            let expected: Vec<_> = plan[..index]
                .iter()
                .map(|s| expected_op(g.path(), s))
                .collect();
            assert_eq!(g.store().ops(), expected, "fault at step {}", step);

            g.store().heal();
            g.cleanup().unwrap();
            assert!(!g.path().exists());
        }
    }

    #[test]
    fn test_retry_after_partial_teardown() {
        let tmp = TempDir::new().unwrap();
        let mut g = populated(tmp.path());
        g.store()
            .fail_when(|op| matches!(op, Op::RemoveDir(p) if p.ends_with("ecm.usb0")));

        assert!(g.cleanup().is_err());
        assert!(!g.is_enabled());
        assert!(!g.path().join("configs/c.1").exists());
        assert!(g.path().join("functions/ecm.usb0").exists());
        assert_eq!(g.configs().len(), 2);

        g.store().heal();
        g.store().clear();
        g.cleanup().unwrap();
        assert!(!g.path().exists());
        assert!(!g
            .store()
            .ops()
            .iter()
            .any(|op| matches!(op, Op::Write(..))));
    }

    #[test]
    fn test_disabled_gadget_skips_disable() {
        let tmp = TempDir::new().unwrap();
        let mut g = Gadget::create_with_store(RecordingStore::new(), tmp.path(), "g1").unwrap();
        g.create_function::<Hid>("usb0").unwrap();

        let plan = g.teardown_plan();
        assert_eq!(plan.len(), 2);
        assert!(matches!(
            plan[0],
            TeardownStep::RemoveFunction { ref function, .. } if function == "hid.usb0"
        ));

        g.cleanup().unwrap();
        assert!(!g.store().ops().iter().any(|op| matches!(op, Op::Write(..))));
    }

    #[test]
    fn test_end_to_end_scenario() {
        let tmp = TempDir::new().unwrap();
        let mut g = Gadget::create_with_store(RecordingStore::new(), tmp.path(), "g1").unwrap();
        g.set_attrs(&GadgetAttrs {
            vendor_id: Some(0x1d6b),
            product_id: Some(0x0104),
            ..Default::default()
        })
        .unwrap();
        let config = g.create_config("c", 1).unwrap();
        g.set_config_attrs(
            &config,
            &ConfigAttrs {
                max_power: Some(250),
                ..Default::default()
            },
        )
        .unwrap();
        let hid = g.create_function::<Hid>("usb0").unwrap();
        g.set_function_attrs(
            &hid,
            &HidAttrs {
                subclass: Some(0),
                protocol: Some(1),
                report_length: Some(8),
                ..Default::default()
            },
        )
        .unwrap();
        g.create_binding(&config, hid.name(), "hid.usb0").unwrap();
        g.enable("controller0").unwrap();

        let base = tmp.path().join("g1");
        assert_eq!(fs::read_to_string(base.join("UDC")).unwrap(), "controller0\n");
        assert_eq!(fs::read_to_string(base.join("idVendor")).unwrap(), "0x1d6b\n");
        assert_eq!(fs::read_to_string(base.join("configs/c.1/MaxPower")).unwrap(), "250\n");
        let link = base.join("configs/c.1/hid.usb0");
        assert_eq!(fs::read_link(&link).unwrap(), base.join("functions/hid.usb0"));
        assert!(link.is_dir());

        g.store().clear();
        g.cleanup().unwrap();

        let ops = g.store().ops();
        let position = |wanted: &Op| ops.iter().position(|op| op == wanted).unwrap();
        let disable = position(&Op::Write(base.join("UDC"), "\n".to_string()));
        let unlink = position(&Op::RemoveSymlink(link.clone()));
        let remove_function = position(&Op::RemoveDir(base.join("functions/hid.usb0")));
        assert_eq!(disable, 0);
        assert!(unlink < remove_function);
        assert!(!base.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_step_display() {
        let step = TeardownStep::Unlink {
            config: "c.1".to_string(),
            binding: "hid.usb0".to_string(),
            path: PathBuf::from("/cfg/g1/configs/c.1/hid.usb0"),
        };
        assert_eq!(step.to_string(), "unlink binding hid.usb0 from c.1");
        assert_eq!(TeardownStep::Disable.to_string(), "disable");
    }
}
