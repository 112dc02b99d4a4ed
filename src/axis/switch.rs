use std::sync::Arc;

use anyhow::ensure;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::axis::address_map::AddressMap;
use crate::axis::arb_mux::{ensure_frame_atomic, select_width};
use crate::axis::arbiter::{Arbiter, ArbiterConfig};
use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ports, Master, Port, Slave};
use crate::builtin::register_slice::{RegType, RegisterSlice};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub s_count: usize,
    pub m_count: usize,
    pub format: BeatFormat,
    /// `dest` range per output. Defaults to an equal split of the dest space.
    pub address_map: Option<AddressMap>,
    /// `connect[s][m]`: input `s` may reach output `m`. Defaults to fully connected.
    pub connect: Option<Vec<Vec<bool>>>,
    pub update_tid: bool,
    pub arbiter: ArbiterConfig,
    pub s_reg_type: RegType,
    pub m_reg_type: RegType,
    /// Discard frames whose dest matches no reachable output instead of stalling on them.
    pub drop_unrouted: bool,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            s_count: 4,
            m_count: 4,
            format: BeatFormat::default().with_dest_width(2),
            address_map: None,
            connect: None,
            update_tid: false,
            arbiter: ArbiterConfig::default(),
            s_reg_type: RegType::Skid,
            m_reg_type: RegType::Skid,
            drop_unrouted: false,
        }
    }
}

impl SwitchConfig {
    pub fn address_map(&self) -> AddressMap {
        self.address_map
            .clone()
            .unwrap_or_else(|| AddressMap::partitioned(self.m_count, self.format.dest_width))
    }

    pub fn connected(&self, s: usize, m: usize) -> bool {
        self.connect
            .as_ref()
            .map_or(true, |rows| rows.get(s).and_then(|r| r.get(m)).copied().unwrap_or(false))
    }

    pub fn m_format(&self) -> BeatFormat {
        if self.update_tid {
            let width = self.format.id_width + select_width(self.s_count);
            self.format.with_id_width(width)
        } else {
            self.format
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.s_count > 0 && self.m_count > 0,
            "switch needs at least one input and one output"
        );
        self.format.validate()?;
        self.m_format().validate()?;
        self.address_map()
            .validate(self.m_count, self.format.dest_width)?;
        if let Some(rows) = &self.connect {
            ensure!(
                rows.len() == self.s_count && rows.iter().all(|r| r.len() == self.m_count),
                "connect matrix must be {} x {}",
                self.s_count,
                self.m_count
            );
        }
        ensure_frame_atomic(&self.arbiter)
    }
}

/// Decision for the frame at the head of an input, made on its first beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Port(usize),
    Drop,
    /// No output matches; the input is stuck until reset.
    Stalled,
}

#[derive(Debug)]
pub struct SwitchState {
    map: AddressMap,
    inputs: Vec<RegisterSlice<Beat>>,
    routes: Vec<Option<Route>>,
    arbiters: Vec<Arbiter>,
    outputs: Vec<RegisterSlice<Beat>>,
    unrouted: Vec<u64>,
    frames: Vec<u64>,
}

/// Full crossbar routing each frame by its `dest` to exactly one output. Every output arbitrates
/// between the inputs routed to it and holds the grant for a whole frame.
pub struct Switch {
    base: ModuleBase<SwitchState, SwitchConfig>,
    pub s_axis: Vec<Port<Slave>>,
    pub m_axis: Vec<Port<Master>>,
}

impl Switch {
    pub fn new(name: &str, config: Arc<SwitchConfig>) -> anyhow::Result<Self> {
        config.validate()?;
        let (s, m) = (config.s_count, config.m_count);
        let state = SwitchState {
            map: config.address_map(),
            inputs: (0..s).map(|_| RegisterSlice::new(config.s_reg_type)).collect(),
            routes: vec![None; s],
            arbiters: (0..m).map(|_| Arbiter::new(s, config.arbiter)).collect(),
            outputs: (0..m).map(|_| RegisterSlice::new(config.m_reg_type)).collect(),
            unrouted: vec![0; s],
            frames: vec![0; m],
        };
        Ok(Switch {
            base: ModuleBase::new(name, config, state),
            s_axis: ports(s),
            m_axis: ports(m),
        })
    }

    /// Frames per input that matched no reachable output.
    pub fn unrouted(&self) -> &[u64] {
        &self.base.state.unrouted
    }

    /// Frames forwarded per output.
    pub fn frames(&self) -> &[u64] {
        &self.base.state.frames
    }

    pub fn route(&self, s: usize) -> Option<Route> {
        self.base.state.routes[s]
    }

    pub fn grant(&self, m: usize) -> Option<usize> {
        self.base.state.arbiters[m].grant()
    }

    /// First reachable output whose range holds `dest`.
    pub fn decode(conf: &SwitchConfig, map: &AddressMap, s: usize, dest: u64) -> Route {
        let port = map
            .ranges
            .iter()
            .enumerate()
            .position(|(m, r)| r.contains(dest) && conf.connected(s, m));
        match port {
            Some(m) => Route::Port(m),
            None if conf.drop_unrouted => Route::Drop,
            None => Route::Stalled,
        }
    }
}

module!(Switch, SwitchState, SwitchConfig, "axis_switch",);

impl ModuleBehaviors for Switch {
    fn drive(&mut self) {
        let state = &self.base.state;
        for (port, slice) in self.s_axis.iter().zip(&state.inputs) {
            port.set_ready(slice.ready());
        }
        for (port, slice) in self.m_axis.iter().zip(&state.outputs) {
            port.drive(slice.output().cloned());
        }
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let m_format = conf.m_format();
        let state = &mut self.base.state;
        let (s_count, m_count) = (conf.s_count, conf.m_count);

        let mut consumed = vec![false; s_count];
        let mut acks = vec![vec![false; s_count]; m_count];
        let mut moved = vec![None; m_count];
        for m in 0..m_count {
            let Some(g) = state.arbiters[m].grant() else {
                continue;
            };
            if state.routes[g] != Some(Route::Port(m)) || !state.outputs[m].ready() {
                continue;
            }
            if let Some(beat) = state.inputs[g].output() {
                let mut beat = beat.clone();
                consumed[g] = true;
                acks[m][g] = beat.last;
                if beat.last {
                    state.frames[m] += 1;
                }
                if conf.update_tid {
                    beat.id |= (g as u64) << conf.format.id_width;
                }
                moved[m] = Some(m_format.conform(&beat));
            }
        }
        for (s, route) in state.routes.iter().enumerate() {
            if *route == Some(Route::Drop) && state.inputs[s].output().is_some() {
                consumed[s] = true;
            }
        }

        for ((slice, beat), port) in state.outputs.iter_mut().zip(moved).zip(&self.m_axis) {
            slice.tick(beat, port.ready());
        }

        for s in 0..s_count {
            let head_last = state.inputs[s].output().map(|b| b.last);
            let fired = self.s_axis[s].take_fired().map(|b| conf.format.conform(&b));
            state.inputs[s].tick(fired, consumed[s]);
            if consumed[s] && head_last == Some(true) {
                state.routes[s] = None;
            }
            if state.routes[s].is_none() {
                if let Some(head) = state.inputs[s].output() {
                    let route = Switch::decode(&conf, &state.map, s, head.dest);
                    if route == Route::Drop || route == Route::Stalled {
                        debug!(
                            "{}: input {} dest {} matches no output",
                            self.base.name, s, head.dest
                        );
                        state.unrouted[s] += 1;
                    }
                    state.routes[s] = Some(route);
                }
            }
        }

        for (m, arbiter) in state.arbiters.iter_mut().enumerate() {
            let request = (0..s_count)
                .map(|s| {
                    state.routes[s] == Some(Route::Port(m)) && state.inputs[s].output().is_some()
                })
                .collect::<Vec<_>>();
            arbiter.arbitrate(&request, &acks[m]);
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.inputs.iter_mut().for_each(|s| s.reset());
        state.routes.iter_mut().for_each(|r| *r = None);
        state.arbiters.iter_mut().for_each(|a| a.reset());
        state.outputs.iter_mut().for_each(|s| s.reset());
        state.unrouted.iter_mut().for_each(|u| *u = 0);
        state.frames.iter_mut().for_each(|f| *f = 0);
    }
}
