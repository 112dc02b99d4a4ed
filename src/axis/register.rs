use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{Master, Port, Slave};
use crate::builtin::register_slice::{RegType, RegisterSlice};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub format: BeatFormat,
    pub reg_type: RegType,
}

/// Pipeline stage that breaks the ready path between two components.
pub struct Register {
    base: ModuleBase<RegisterSlice<Beat>, RegisterConfig>,
    pub s_axis: Port<Slave>,
    pub m_axis: Port<Master>,
}

impl Register {
    pub fn new(name: &str, config: Arc<RegisterConfig>) -> anyhow::Result<Self> {
        config.format.validate()?;
        let slice = RegisterSlice::new(config.reg_type);
        Ok(Register {
            base: ModuleBase::new(name, config, slice),
            s_axis: Port::new(),
            m_axis: Port::new(),
        })
    }

    pub fn occupancy(&self) -> usize {
        self.base.state.occupancy()
    }
}

module!(Register, RegisterSlice<Beat>, RegisterConfig, "axis_register",);

impl ModuleBehaviors for Register {
    fn drive(&mut self) {
        let slice = &self.base.state;
        self.s_axis.set_ready(slice.ready());
        self.m_axis.drive(slice.output().cloned());
    }

    fn tick_one(&mut self) {
        let format = self.base.config.format;
        let input = self.s_axis.take_fired().map(|b| format.conform(&b));
        self.base.state.tick(input, self.m_axis.ready());
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state.reset();
    }
}
