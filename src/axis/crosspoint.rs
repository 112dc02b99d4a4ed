use std::sync::Arc;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ports, Master, Port, Slave};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrosspointConfig {
    pub s_count: usize,
    pub m_count: usize,
    pub format: BeatFormat,
}

impl Default for CrosspointConfig {
    fn default() -> Self {
        Self {
            s_count: 4,
            m_count: 4,
            format: BeatFormat::default(),
        }
    }
}

#[derive(Debug)]
pub struct CrosspointState {
    select: Vec<usize>,
    captured: Vec<Option<Beat>>,
    outs: Vec<Option<Beat>>,
}

/// Static patch panel: output `m` mirrors input `select[m]` two cycles later.
///
/// There is no flow control through it. Inputs are always ready and downstream `ready` is never
/// looked at, so a beat presented to a sink that is not ready is lost. Use it only where the
/// sinks are known to keep up.
pub struct Crosspoint {
    base: ModuleBase<CrosspointState, CrosspointConfig>,
    pub s_axis: Vec<Port<Slave>>,
    pub m_axis: Vec<Port<Master>>,
}

impl Crosspoint {
    pub fn new(name: &str, config: Arc<CrosspointConfig>) -> anyhow::Result<Self> {
        ensure!(
            config.s_count > 0 && config.m_count > 0,
            "crosspoint needs at least one input and one output"
        );
        config.format.validate()?;
        let (s, m) = (config.s_count, config.m_count);
        let state = CrosspointState {
            select: (0..m).map(|i| i % s).collect(),
            captured: vec![None; s],
            outs: vec![None; m],
        };
        Ok(Crosspoint {
            base: ModuleBase::new(name, config, state),
            s_axis: ports(s),
            m_axis: ports(m),
        })
    }

    /// Input index per output, effective from the next edge. Out-of-range entries idle the
    /// output.
    pub fn set_select(&mut self, select: &[usize]) {
        for (sel, &s) in self.base.state.select.iter_mut().zip(select) {
            *sel = s;
        }
    }

    pub fn select(&self) -> &[usize] {
        &self.base.state.select
    }
}

module!(Crosspoint, CrosspointState, CrosspointConfig, "axis_crosspoint",);

impl ModuleBehaviors for Crosspoint {
    fn drive(&mut self) {
        for port in &self.s_axis {
            port.set_ready(true);
        }
        for (port, out) in self.m_axis.iter().zip(&self.base.state.outs) {
            port.drive(out.clone());
        }
    }

    fn tick_one(&mut self) {
        let format = self.base.config.format;
        let state = &mut self.base.state;
        for (out, &sel) in state.outs.iter_mut().zip(&state.select) {
            *out = state.captured.get(sel).cloned().flatten();
        }
        for (reg, port) in state.captured.iter_mut().zip(&self.s_axis) {
            *reg = port.take_fired().map(|b| format.conform(&b));
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        let s = state.captured.len();
        state.select.iter_mut().enumerate().for_each(|(i, sel)| *sel = i % s);
        state.captured.iter_mut().for_each(|c| *c = None);
        state.outs.iter_mut().for_each(|o| *o = None);
    }
}
