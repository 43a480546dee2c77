//! Recording store for tests: passes every operation through to the real
//! filesystem, keeps a log of mutations and can reject selected ones.

use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};

use super::configfs::{ConfigFs, Store};
use crate::error::{GadgetError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateDir(PathBuf),
    RemoveDir(PathBuf),
    Symlink { target: PathBuf, link: PathBuf },
    RemoveSymlink(PathBuf),
    Write(PathBuf, String),
    WriteBytes(PathBuf, Vec<u8>),
}

type Fault = Box<dyn Fn(&Op) -> bool>;

#[derive(Default)]
pub struct RecordingStore {
    ops: RefCell<Vec<Op>>,
    fault: RefCell<Option<Fault>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every operation matching `pred`
    pub fn fail_when(&self, pred: impl Fn(&Op) -> bool + 'static) {
        *self.fault.borrow_mut() = Some(Box::new(pred));
    }

    pub fn heal(&self) {
        *self.fault.borrow_mut() = None;
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.borrow().clone()
    }

    pub fn clear(&self) {
        self.ops.borrow_mut().clear();
    }

    pub fn writes(&self) -> usize {
        self.ops
            .borrow()
            .iter()
            .filter(|op| matches!(op, Op::Write(..) | Op::WriteBytes(..)))
            .count()
    }

    fn record(&self, op: Op, path: &Path) -> Result<()> {
        if let Some(fault) = self.fault.borrow().as_ref() {
            if fault(&op) {
                return Err(GadgetError::io(
                    "inject fault into",
                    path,
                    io::Error::new(io::ErrorKind::Other, "injected fault"),
                ));
            }
        }
        self.ops.borrow_mut().push(op);
        Ok(())
    }
}

impl Store for RecordingStore {
    fn create_dir(&self, path: &Path) -> Result<()> {
        self.record(Op::CreateDir(path.to_path_buf()), path)?;
        ConfigFs.create_dir(path)
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        self.record(Op::RemoveDir(path.to_path_buf()), path)?;
        ConfigFs.remove_dir(path)
    }

    fn create_symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let op = Op::Symlink {
            target: target.to_path_buf(),
            link: link.to_path_buf(),
        };
        self.record(op, link)?;
        ConfigFs.create_symlink(target, link)
    }

    fn remove_symlink(&self, link: &Path) -> Result<()> {
        self.record(Op::RemoveSymlink(link.to_path_buf()), link)?;
        ConfigFs.remove_symlink(link)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        self.record(Op::Write(path.to_path_buf(), content.to_string()), path)?;
        ConfigFs.write_file(path, content)
    }

    fn write_bytes(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.record(Op::WriteBytes(path.to_path_buf(), data.to_vec()), path)?;
        ConfigFs.write_bytes(path, data)
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        ConfigFs.read_file(path)
    }
}
