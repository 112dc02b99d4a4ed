use std::sync::Arc;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::base::beat::{BadFrameMarker, Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{ChannelRef, Master, Port};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub format: BeatFormat,
    /// Cut a partially mirrored frame short with a beat carrying the bad-frame marker instead of
    /// leaving a hole in it.
    pub mark_truncated: bool,
    pub marker: BadFrameMarker,
}

#[derive(Debug, Default)]
pub struct TapState {
    out: Option<Beat>,
    /// The mirror has emitted part of the frame now on the channel.
    mid_frame: bool,
    /// Drop until the end of the current frame.
    discarding: bool,
    terminator: Option<Beat>,
    mirrored: u64,
    dropped: u64,
}

/// Passive monitor. Mirrors every transfer on an observed channel to `m_axis` and never touches
/// the observed channel's wires, so the monitored link runs exactly as if the tap were absent.
pub struct Tap {
    base: ModuleBase<TapState, TapConfig>,
    observed: ChannelRef,
    pub m_axis: Port<Master>,
}

impl Tap {
    pub fn new(name: &str, config: Arc<TapConfig>, observed: ChannelRef) -> anyhow::Result<Self> {
        config.format.validate()?;
        Ok(Tap {
            base: ModuleBase::new(name, config, TapState::default()),
            observed,
            m_axis: Port::new(),
        })
    }

    pub fn mirrored(&self) -> u64 {
        self.base.state.mirrored
    }

    /// Observed beats that did not reach the mirror.
    pub fn dropped(&self) -> u64 {
        self.base.state.dropped
    }
}

module!(Tap, TapState, TapConfig, "axis_tap",);

impl ModuleBehaviors for Tap {
    fn drive(&mut self) {
        self.m_axis.drive(self.base.state.out.clone());
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let state = &mut self.base.state;

        if state.out.is_some() && self.m_axis.ready() {
            state.out = None;
        }
        if state.out.is_none() {
            if let Some(term) = state.terminator.take() {
                state.out = Some(term);
                state.mid_frame = false;
            }
        }

        let wire = self.observed.snapshot();
        let Some(beat) = wire.beat.filter(|_| wire.ready) else {
            self.base.cycle += 1;
            return;
        };
        let beat = conf.format.conform(&beat);
        let last = beat.last;

        if state.discarding {
            state.dropped += 1;
            state.discarding = !last;
        } else if state.out.is_none() {
            state.mid_frame = !last;
            state.out = Some(beat);
            state.mirrored += 1;
        } else {
            trace!("{}: mirror busy, dropping beat", self.base.name);
            state.dropped += 1;
            if conf.mark_truncated {
                if state.mid_frame {
                    let mut term = beat.with_last(true).with_user(conf.marker.value);
                    term = conf.format.conform(&term);
                    state.terminator = Some(term);
                    state.mid_frame = false;
                }
                state.discarding = !last;
            }
        }
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state = TapState::default();
    }
}
