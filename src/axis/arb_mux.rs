use std::sync::Arc;

use anyhow::ensure;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::axis::arbiter::{Arbiter, ArbiterConfig};
use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ports, Master, Port, Slave};
use crate::builtin::register_slice::{RegType, RegisterSlice};

/// Bits needed to encode an index below `count`.
pub fn select_width(count: usize) -> u32 {
    if count <= 1 {
        0
    } else {
        usize::BITS - (count - 1).leading_zeros()
    }
}

/// Frame-atomic routing needs the arbiter to hold a grant until the last beat is acknowledged.
pub(crate) fn ensure_frame_atomic(arbiter: &ArbiterConfig) -> anyhow::Result<()> {
    ensure!(
        arbiter.block && arbiter.block_ack,
        "arbiter must hold grants until acknowledged (block and block_ack)"
    );
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbMuxConfig {
    pub s_count: usize,
    pub format: BeatFormat,
    pub arbiter: ArbiterConfig,
    /// Record the winning input above the source id bits.
    pub update_tid: bool,
    pub reg_type: RegType,
}

impl Default for ArbMuxConfig {
    fn default() -> Self {
        Self {
            s_count: 4,
            format: BeatFormat::default(),
            arbiter: ArbiterConfig::default(),
            update_tid: false,
            reg_type: RegType::Skid,
        }
    }
}

impl ArbMuxConfig {
    /// Output format; the id field widens when `update_tid` is set.
    pub fn m_format(&self) -> BeatFormat {
        if self.update_tid {
            let width = self.format.id_width + select_width(self.s_count);
            self.format.with_id_width(width)
        } else {
            self.format
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.s_count > 0, "arb mux needs at least one input");
        self.format.validate()?;
        self.m_format().validate()?;
        ensure_frame_atomic(&self.arbiter)
    }
}

#[derive(Debug)]
pub struct ArbMuxState {
    inputs: Vec<RegisterSlice<Beat>>,
    arbiter: Arbiter,
    output: RegisterSlice<Beat>,
    frames: Vec<u64>,
}

/// Many-to-one mux that arbitrates between inputs a frame at a time.
pub struct ArbMux {
    base: ModuleBase<ArbMuxState, ArbMuxConfig>,
    pub s_axis: Vec<Port<Slave>>,
    pub m_axis: Port<Master>,
}

impl ArbMux {
    pub fn new(name: &str, config: Arc<ArbMuxConfig>) -> anyhow::Result<Self> {
        config.validate()?;
        let n = config.s_count;
        let state = ArbMuxState {
            inputs: (0..n).map(|_| RegisterSlice::new(RegType::Skid)).collect(),
            arbiter: Arbiter::new(n, config.arbiter),
            output: RegisterSlice::new(config.reg_type),
            frames: vec![0; n],
        };
        Ok(ArbMux {
            base: ModuleBase::new(name, config, state),
            s_axis: ports(n),
            m_axis: Port::new(),
        })
    }

    pub fn grant(&self) -> Option<usize> {
        self.base.state.arbiter.grant()
    }

    /// Frames forwarded from each input.
    pub fn frames(&self) -> &[u64] {
        &self.base.state.frames
    }
}

module!(ArbMux, ArbMuxState, ArbMuxConfig, "axis_arb_mux",);

impl ModuleBehaviors for ArbMux {
    fn drive(&mut self) {
        let state = &self.base.state;
        for (port, slice) in self.s_axis.iter().zip(&state.inputs) {
            port.set_ready(slice.ready());
        }
        self.m_axis.drive(state.output.output().cloned());
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let m_format = conf.m_format();
        let state = &mut self.base.state;
        let n = conf.s_count;

        let grant = state.arbiter.grant();
        let moved = match grant {
            Some(g) if state.output.ready() => state.inputs[g].output().cloned(),
            _ => None,
        };
        let mut ack = vec![false; n];
        let out_beat = match (grant, moved) {
            (Some(g), Some(mut beat)) => {
                ack[g] = beat.last;
                if beat.last {
                    state.frames[g] += 1;
                }
                if conf.update_tid {
                    beat.id |= (g as u64) << conf.format.id_width;
                }
                Some(m_format.conform(&beat))
            }
            _ => None,
        };
        let forwarded = out_beat.is_some();
        state.output.tick(out_beat, self.m_axis.ready());

        for (i, slice) in state.inputs.iter_mut().enumerate() {
            let fired = self.s_axis[i].take_fired().map(|b| conf.format.conform(&b));
            slice.tick(fired, forwarded && grant == Some(i));
        }

        let request = state
            .inputs
            .iter()
            .map(|s| s.output().is_some())
            .collect::<Vec<_>>();
        let next = state.arbiter.arbitrate(&request, &ack);
        if next != grant {
            debug!("{}: grant {:?} -> {:?}", self.base.name, grant, next);
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.inputs.iter_mut().for_each(|s| s.reset());
        state.output.reset();
        state.arbiter.reset();
        state.frames.iter_mut().for_each(|f| *f = 0);
    }
}
