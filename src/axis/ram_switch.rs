use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::axis::fifo::{Fifo, FifoConfig};
use crate::axis::switch::{Switch, SwitchConfig};
use crate::base::beat::BadFrameMarker;
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{link, Master, Port, Slave};
use crate::base::status::{FrameStatus, StatusCounters};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RamSwitchConfig {
    pub switch: SwitchConfig,
    /// Per-input frame buffer depth, in beats.
    pub fifo_depth: usize,
    pub marker: BadFrameMarker,
    pub drop_bad_frame: bool,
    pub drop_when_full: bool,
}

impl Default for RamSwitchConfig {
    fn default() -> Self {
        Self {
            switch: SwitchConfig::default(),
            fifo_depth: 4096,
            marker: BadFrameMarker::default(),
            drop_bad_frame: false,
            drop_when_full: false,
        }
    }
}

impl RamSwitchConfig {
    pub fn fifo_config(&self) -> FifoConfig {
        FifoConfig {
            depth: self.fifo_depth,
            format: self.switch.format,
            frame_fifo: true,
            marker: self.marker,
            drop_bad_frame: self.drop_bad_frame,
            drop_when_full: self.drop_when_full,
            drop_oversize_frame: false,
        }
    }
}

/// Switch with a frame buffer on every input, so only complete frames enter arbitration.
pub struct RamSwitch {
    base: ModuleBase<(), RamSwitchConfig>,
    fifos: Vec<Fifo>,
    switch: Switch,
}

impl RamSwitch {
    pub fn new(name: &str, config: Arc<RamSwitchConfig>) -> anyhow::Result<Self> {
        let fifo_config = Arc::new(config.fifo_config());
        let mut switch = Switch::new(&format!("{name}.switch"), Arc::new(config.switch.clone()))?;
        let mut fifos = (0..config.switch.s_count)
            .map(|i| Fifo::new(&format!("{name}.fifo{i}"), Arc::clone(&fifo_config)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        for (fifo, s) in fifos.iter_mut().zip(switch.s_axis.iter_mut()) {
            link(&mut fifo.m_axis, s);
        }
        Ok(RamSwitch {
            base: ModuleBase::new(name, config, ()),
            fifos,
            switch,
        })
    }

    pub fn s_axis(&mut self, s: usize) -> &mut Port<Slave> {
        &mut self.fifos[s].s_axis
    }

    pub fn m_axis(&mut self, m: usize) -> &mut Port<Master> {
        &mut self.switch.m_axis[m]
    }

    /// Status pulses of each input buffer on the last edge.
    pub fn s_status(&self) -> Vec<FrameStatus> {
        self.fifos.iter().map(Fifo::status).collect()
    }

    pub fn s_counters(&self) -> Vec<StatusCounters> {
        self.fifos.iter().map(Fifo::counters).collect()
    }

    pub fn switch(&self) -> &Switch {
        &self.switch
    }
}

module!(RamSwitch, (), RamSwitchConfig, "axis_ram_switch",);

impl ModuleBehaviors for RamSwitch {
    fn drive(&mut self) {
        self.fifos.iter_mut().for_each(|f| f.drive());
        self.switch.drive();
    }

    fn settle(&mut self) -> bool {
        let mut changed = false;
        for fifo in self.fifos.iter_mut() {
            changed |= fifo.settle();
        }
        changed | self.switch.settle()
    }

    fn tick_one(&mut self) {
        self.fifos.iter_mut().for_each(|f| f.tick_one());
        self.switch.tick_one();
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.fifos.iter_mut().for_each(|f| f.reset());
        self.switch.reset();
    }
}
