use std::sync::Arc;

use anyhow::ensure;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::axis::address_map::AddressMap;
use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ports, Master, Port, Slave};
use crate::builtin::register_slice::{RegType, RegisterSlice};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemuxRoute {
    /// Route by the `select` control register.
    #[default]
    Select,
    /// Route by decoding `dest` against an address map.
    Dest(AddressMap),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemuxConfig {
    pub m_count: usize,
    pub format: BeatFormat,
    pub route: DemuxRoute,
    pub reg_type: RegType,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            m_count: 4,
            format: BeatFormat::default(),
            route: DemuxRoute::Select,
            reg_type: RegType::Skid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DemuxControl {
    pub select: usize,
    pub enable: bool,
    /// Consume and discard frames instead of forwarding them.
    pub drop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Port(usize),
    Drop,
    Unrouted,
}

#[derive(Debug)]
pub struct DemuxState {
    control: DemuxControl,
    /// Route latched on the first beat of the frame in flight.
    frame: Option<Target>,
    input: RegisterSlice<Beat>,
    outputs: Vec<RegisterSlice<Beat>>,
    dropped: u64,
    unrouted: u64,
}

/// One-to-many demux. As with [crate::axis::mux::Mux], `select` must only change between frames;
/// the route is latched when a frame starts.
pub struct Demux {
    base: ModuleBase<DemuxState, DemuxConfig>,
    pub s_axis: Port<Slave>,
    pub m_axis: Vec<Port<Master>>,
}

impl Demux {
    pub fn new(name: &str, config: Arc<DemuxConfig>) -> anyhow::Result<Self> {
        ensure!(config.m_count > 0, "demux needs at least one output");
        config.format.validate()?;
        if let DemuxRoute::Dest(map) = &config.route {
            map.validate(config.m_count, config.format.dest_width)?;
        }
        let m = config.m_count;
        let state = DemuxState {
            control: DemuxControl::default(),
            frame: None,
            input: RegisterSlice::new(RegType::Skid),
            outputs: (0..m).map(|_| RegisterSlice::new(config.reg_type)).collect(),
            dropped: 0,
            unrouted: 0,
        };
        Ok(Demux {
            base: ModuleBase::new(name, config, state),
            s_axis: Port::new(),
            m_axis: ports(m),
        })
    }

    /// Takes effect from the next edge.
    pub fn set_control(&mut self, control: DemuxControl) {
        self.base.state.control = control;
    }

    /// Beats discarded because `drop` was set.
    pub fn dropped(&self) -> u64 {
        self.base.state.dropped
    }

    /// Beats discarded because they matched no output.
    pub fn unrouted(&self) -> u64 {
        self.base.state.unrouted
    }

    fn decode(conf: &DemuxConfig, control: DemuxControl, beat: &Beat) -> Option<Target> {
        if control.drop {
            return Some(Target::Drop);
        }
        if !control.enable {
            return None;
        }
        let port = match &conf.route {
            DemuxRoute::Select => (control.select < conf.m_count).then_some(control.select),
            DemuxRoute::Dest(map) => map.route(beat.dest),
        };
        Some(port.map_or(Target::Unrouted, Target::Port))
    }
}

module!(Demux, DemuxState, DemuxConfig, "axis_demux",);

impl ModuleBehaviors for Demux {
    fn drive(&mut self) {
        let state = &self.base.state;
        self.s_axis.set_ready(state.input.ready());
        for (port, slice) in self.m_axis.iter().zip(&state.outputs) {
            port.drive(slice.output().cloned());
        }
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let state = &mut self.base.state;

        let head = state.input.output().cloned();
        let target = match (&head, state.frame) {
            (Some(_), Some(latched)) => Some(latched),
            (Some(beat), None) => Demux::decode(&conf, state.control, beat),
            (None, _) => None,
        };

        let mut moved = vec![None; conf.m_count];
        let mut consumed = false;
        if let (Some(beat), Some(target)) = (head, target) {
            consumed = match target {
                Target::Port(j) if state.outputs[j].ready() => {
                    moved[j] = Some(beat.clone());
                    true
                }
                Target::Port(_) => false,
                Target::Drop => {
                    state.dropped += 1;
                    true
                }
                Target::Unrouted => {
                    if state.frame.is_none() {
                        debug!("{}: unrouted dest {}", self.base.name, beat.dest);
                    }
                    state.unrouted += 1;
                    true
                }
            };
            state.frame = match (consumed, beat.last) {
                (true, true) => None,
                _ => Some(target),
            };
        }

        for ((slice, beat), port) in state.outputs.iter_mut().zip(moved).zip(&self.m_axis) {
            slice.tick(beat, port.ready());
        }
        let fired = self.s_axis.take_fired().map(|b| conf.format.conform(&b));
        state.input.tick(fired, consumed);
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.control = DemuxControl::default();
        state.frame = None;
        state.input.reset();
        state.outputs.iter_mut().for_each(|s| s.reset());
        state.dropped = 0;
        state.unrouted = 0;
    }
}
