//! Ethernet-style functions (ECM, NCM, RNDIS)
//!
//! All three share the `u_ether` attribute set.

use serde::{Deserialize, Serialize};

use super::attrs::{AttrSet, AttrWriter};
use super::function::FunctionKind;
use crate::error::Result;

/// CDC ECM network function
#[derive(Debug, Clone, Copy)]
pub struct Ecm;

/// CDC NCM network function
#[derive(Debug, Clone, Copy)]
pub struct Ncm;

/// RNDIS network function (Windows hosts)
#[derive(Debug, Clone, Copy)]
pub struct Rndis;

impl FunctionKind for Ecm {
    const TYPE: &'static str = "ecm";
    type Attrs = EthernetAttrs;
}

impl FunctionKind for Ncm {
    const TYPE: &'static str = "ncm";
    type Attrs = EthernetAttrs;
}

impl FunctionKind for Rndis {
    const TYPE: &'static str = "rndis";
    type Attrs = EthernetAttrs;
}

/// Ethernet function attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthernetAttrs {
    /// MAC address of the host side, `xx:xx:xx:xx:xx:xx`
    pub host_addr: Option<String>,
    /// MAC address of the device side
    pub dev_addr: Option<String>,
    /// Queue length multiplier for high/super speed
    pub qmult: Option<u32>,
}

impl AttrSet for EthernetAttrs {
    fn write(&self, w: &mut AttrWriter<'_>) -> Result<()> {
        w.text("host_addr", self.host_addr.as_deref())?;
        w.text("dev_addr", self.dev_addr.as_deref())?;
        w.dec("qmult", self.qmult)
    }
}
