use std::sync::Arc;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ports, Master, Port, Slave};
use crate::builtin::register_slice::{RegType, RegisterSlice};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub s_count: usize,
    pub format: BeatFormat,
    pub reg_type: RegType,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            s_count: 4,
            format: BeatFormat::default(),
            reg_type: RegType::Skid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MuxControl {
    pub select: usize,
    pub enable: bool,
}

#[derive(Debug)]
pub struct MuxState {
    control: MuxControl,
    inputs: Vec<RegisterSlice<Beat>>,
    output: RegisterSlice<Beat>,
}

/// Statically selected many-to-one mux. Changing `select` while a frame is in flight splices
/// frames together; callers must only switch between frames.
pub struct Mux {
    base: ModuleBase<MuxState, MuxConfig>,
    pub s_axis: Vec<Port<Slave>>,
    pub m_axis: Port<Master>,
}

impl Mux {
    pub fn new(name: &str, config: Arc<MuxConfig>) -> anyhow::Result<Self> {
        ensure!(config.s_count > 0, "mux needs at least one input");
        config.format.validate()?;
        let n = config.s_count;
        let state = MuxState {
            control: MuxControl::default(),
            inputs: (0..n).map(|_| RegisterSlice::new(RegType::Skid)).collect(),
            output: RegisterSlice::new(config.reg_type),
        };
        Ok(Mux {
            base: ModuleBase::new(name, config, state),
            s_axis: ports(n),
            m_axis: Port::new(),
        })
    }

    /// Takes effect from the next edge.
    pub fn set_control(&mut self, control: MuxControl) {
        self.base.state.control = control;
    }

    pub fn control(&self) -> MuxControl {
        self.base.state.control
    }
}

module!(Mux, MuxState, MuxConfig, "axis_mux",);

impl ModuleBehaviors for Mux {
    fn drive(&mut self) {
        let state = &self.base.state;
        for (port, slice) in self.s_axis.iter().zip(&state.inputs) {
            port.set_ready(slice.ready());
        }
        self.m_axis.drive(state.output.output().cloned());
    }

    fn tick_one(&mut self) {
        let format = self.base.config.format;
        let state = &mut self.base.state;
        let MuxControl { select, enable } = state.control;

        let selected = (enable && select < state.inputs.len()).then_some(select);
        let moved = match selected {
            Some(s) if state.output.ready() => state.inputs[s].output().cloned(),
            _ => None,
        };
        let forwarded = moved.is_some();
        state.output.tick(moved, self.m_axis.ready());

        for (i, slice) in state.inputs.iter_mut().enumerate() {
            let fired = self.s_axis[i].take_fired().map(|b| format.conform(&b));
            slice.tick(fired, forwarded && selected == Some(i));
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.control = MuxControl::default();
        state.inputs.iter_mut().for_each(|s| s.reset());
        state.output.reset();
    }
}
