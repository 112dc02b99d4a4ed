use std::sync::Arc;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ports, Master, Port, Slave};
use crate::builtin::queue::FrameQueue;
use crate::builtin::register_slice::{RegType, RegisterSlice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// Every enabled output takes the beat in the same cycle, or none does.
    #[default]
    LockStep,
    /// Each output drains its own queue.
    Decoupled { depth: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub m_count: usize,
    pub format: BeatFormat,
    pub mode: BroadcastMode,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            m_count: 2,
            format: BeatFormat::default(),
            mode: BroadcastMode::LockStep,
        }
    }
}

#[derive(Debug)]
enum Fanout {
    LockStep {
        held: RegisterSlice<Beat>,
    },
    Decoupled {
        queues: Vec<FrameQueue>,
        outs: Vec<Option<Beat>>,
    },
}

#[derive(Debug)]
pub struct BroadcastState {
    enable: Vec<bool>,
    fanout: Fanout,
    beats: u64,
}

/// One-to-many copy of a stream.
///
/// In lock-step mode the outputs form a lazy fork over a single registered beat: an output's
/// `valid` is raised only in a cycle where every enabled output is ready, so a beat presented on
/// any output is taken by all of them in that same cycle. Downstream `ready` must not depend on
/// `valid`.
pub struct Broadcast {
    base: ModuleBase<BroadcastState, BroadcastConfig>,
    pub s_axis: Port<Slave>,
    pub m_axis: Vec<Port<Master>>,
}

impl Broadcast {
    pub fn new(name: &str, config: Arc<BroadcastConfig>) -> anyhow::Result<Self> {
        ensure!(config.m_count > 0, "broadcast needs at least one output");
        config.format.validate()?;
        let m = config.m_count;
        let fanout = match config.mode {
            BroadcastMode::LockStep => Fanout::LockStep {
                held: RegisterSlice::new(RegType::Skid),
            },
            BroadcastMode::Decoupled { depth } => {
                ensure!(depth > 0, "decoupled broadcast depth must be > 0");
                Fanout::Decoupled {
                    queues: (0..m).map(|_| FrameQueue::new(depth)).collect(),
                    outs: vec![None; m],
                }
            }
        };
        let state = BroadcastState {
            enable: vec![true; m],
            fanout,
            beats: 0,
        };
        Ok(Broadcast {
            base: ModuleBase::new(name, config, state),
            s_axis: Port::new(),
            m_axis: ports(m),
        })
    }

    /// Per-output enable mask, effective from the next edge. Disabled outputs neither receive
    /// beats nor hold the others back.
    pub fn set_enable(&mut self, mask: &[bool]) {
        for (en, &m) in self.base.state.enable.iter_mut().zip(mask) {
            *en = m;
        }
    }

    /// Beats accepted on the input.
    pub fn beats(&self) -> u64 {
        self.base.state.beats
    }

    fn all_enabled_ready(&self) -> bool {
        self.m_axis
            .iter()
            .zip(&self.base.state.enable)
            .all(|(port, &en)| !en || port.ready())
    }
}

module!(Broadcast, BroadcastState, BroadcastConfig, "axis_broadcast",);

impl ModuleBehaviors for Broadcast {
    fn drive(&mut self) {
        match &self.base.state.fanout {
            Fanout::LockStep { held } => {
                self.s_axis.set_ready(held.ready());
                self.m_axis.iter().for_each(|port| {
                    port.drive(None);
                });
            }
            Fanout::Decoupled { queues, outs } => {
                // follows the current enable mask, so re-enabling a backed-up output stalls the
                // input until that output's queue has room again
                let s_ready = queues
                    .iter()
                    .zip(&self.base.state.enable)
                    .all(|(q, &en)| !en || !q.is_full());
                self.s_axis.set_ready(s_ready);
                for (port, out) in self.m_axis.iter().zip(outs) {
                    port.drive(out.clone());
                }
            }
        }
    }

    fn settle(&mut self) -> bool {
        let Fanout::LockStep { held } = &self.base.state.fanout else {
            return false;
        };
        let beat = held.output().cloned();
        let go = beat.is_some() && self.all_enabled_ready();
        let mut changed = false;
        for (port, &en) in self.m_axis.iter().zip(&self.base.state.enable) {
            let drive = if go && en { beat.clone() } else { None };
            changed |= port.drive(drive);
        }
        changed
    }

    fn tick_one(&mut self) {
        let format = self.base.config.format;
        let all_ready = self.all_enabled_ready();
        let state = &mut self.base.state;
        let fired = self.s_axis.take_fired().map(|b| format.conform(&b));
        if fired.is_some() {
            state.beats += 1;
        }

        match &mut state.fanout {
            Fanout::LockStep { held } => {
                let consumed = held.output().is_some() && all_ready;
                held.tick(fired, consumed);
            }
            Fanout::Decoupled { queues, outs } => {
                for (j, (queue, out)) in queues.iter_mut().zip(outs.iter_mut()).enumerate() {
                    if out.is_some() && self.m_axis[j].ready() {
                        *out = None;
                    }
                    // the input was ready only with room in every enabled queue
                    if let (Some(beat), true) = (&fired, state.enable[j]) {
                        if queue.try_push(beat.clone()) {
                            queue.commit();
                        }
                    }
                    if out.is_none() {
                        *out = queue.try_pop();
                    }
                }
            }
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.enable.iter_mut().for_each(|en| *en = true);
        state.beats = 0;
        match &mut state.fanout {
            Fanout::LockStep { held } => held.reset(),
            Fanout::Decoupled { queues, outs } => {
                queues.iter_mut().for_each(|q| q.clear());
                outs.iter_mut().for_each(|o| *o = None);
            }
        }
    }
}
