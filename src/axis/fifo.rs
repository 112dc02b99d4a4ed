use std::sync::Arc;

use anyhow::ensure;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::base::beat::{BadFrameMarker, Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{Master, Port, Slave};
use crate::base::status::{FrameStatus, StatusCounters};
use crate::builtin::queue::FrameQueue;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoConfig {
    pub depth: usize,
    pub format: BeatFormat,
    /// Hold beats until their frame's last beat is written.
    pub frame_fifo: bool,
    pub marker: BadFrameMarker,
    pub drop_bad_frame: bool,
    pub drop_when_full: bool,
    pub drop_oversize_frame: bool,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            depth: 4096,
            format: BeatFormat::default(),
            frame_fifo: false,
            marker: BadFrameMarker::default(),
            drop_bad_frame: false,
            drop_when_full: false,
            drop_oversize_frame: false,
        }
    }
}

impl FifoConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.format.validate()?;
        ensure!(self.depth > 0, "fifo depth must be > 0");
        let drops = self.drop_bad_frame || self.drop_when_full || self.drop_oversize_frame;
        ensure!(
            !drops || self.frame_fifo,
            "drop_bad_frame, drop_when_full and drop_oversize_frame require frame_fifo"
        );
        ensure!(
            !self.frame_fifo || self.format.last_enable,
            "frame_fifo requires last_enable"
        );
        Ok(())
    }
}

/// Storage that can hold a frame back until it is committed.
pub(crate) trait FrameStore {
    fn capacity(&self) -> usize;
    fn is_full(&self) -> bool;
    fn pending(&self) -> usize;
    fn push(&mut self, beat: Beat);
    fn commit(&mut self);
    fn rollback(&mut self);
}

impl FrameStore for FrameQueue {
    fn capacity(&self) -> usize {
        FrameQueue::capacity(self)
    }

    fn is_full(&self) -> bool {
        FrameQueue::is_full(self)
    }

    fn pending(&self) -> usize {
        FrameQueue::pending(self)
    }

    fn push(&mut self, beat: Beat) {
        let pushed = self.try_push(beat);
        debug_assert!(pushed, "write accepted while full");
    }

    fn commit(&mut self) {
        FrameQueue::commit(self)
    }

    fn rollback(&mut self) {
        FrameQueue::rollback(self);
    }
}

/// Write-side frame policy shared by the synchronous and asynchronous FIFOs.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameAdmission {
    dropping: bool,
    cut_through: bool,
}

impl FrameAdmission {
    /// Registered write-side ready for the next cycle.
    pub(crate) fn ready(&self, conf: &FifoConfig, store: &impl FrameStore) -> bool {
        if !conf.frame_fifo {
            return !store.is_full();
        }
        !store.is_full()
            || conf.drop_when_full
            || self.dropping
            || (conf.drop_oversize_frame && store.pending() >= store.capacity())
    }

    /// Handle one accepted beat.
    pub(crate) fn write(
        &mut self,
        conf: &FifoConfig,
        store: &mut impl FrameStore,
        beat: Beat,
    ) -> FrameStatus {
        let mut status = FrameStatus::default();
        if !conf.frame_fifo {
            let last = beat.last;
            store.push(beat);
            store.commit();
            status.good_frame = last as u32;
            return status;
        }

        let oversize = store.pending() >= store.capacity();
        let no_room = store.is_full();
        if self.dropping
            || (oversize && (conf.drop_oversize_frame || conf.drop_when_full))
            || (no_room && conf.drop_when_full)
        {
            if !self.dropping {
                debug!("dropping frame, {} beats pending", store.pending());
                store.rollback();
                self.dropping = true;
            }
            if beat.last {
                self.dropping = false;
                status.overflow = 1;
            }
            return status;
        }

        let last = beat.last;
        let bad = conf.drop_bad_frame && !self.cut_through && conf.marker.is_bad(&beat);
        store.push(beat);
        if last {
            if bad {
                debug!("dropping bad frame");
                store.rollback();
                status.bad_frame = 1;
            } else {
                store.commit();
                status.good_frame = 1;
            }
            self.cut_through = false;
        } else if self.cut_through
            || (!conf.drop_oversize_frame
                && !conf.drop_when_full
                && store.pending() >= store.capacity())
        {
            // frame larger than the whole buffer: let it flow instead of deadlocking
            store.commit();
            self.cut_through = true;
        }
        status
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug)]
pub struct FifoState {
    queue: FrameQueue,
    admission: FrameAdmission,
    out: Option<Beat>,
    s_ready: bool,
    status: FrameStatus,
    counters: StatusCounters,
}

/// Synchronous FIFO with optional frame buffering and drop policies.
pub struct Fifo {
    base: ModuleBase<FifoState, FifoConfig>,
    pub s_axis: Port<Slave>,
    pub m_axis: Port<Master>,
}

impl Fifo {
    pub fn new(name: &str, config: Arc<FifoConfig>) -> anyhow::Result<Self> {
        config.validate()?;
        let state = FifoState {
            queue: FrameQueue::new(config.depth),
            admission: FrameAdmission::default(),
            out: None,
            s_ready: true,
            status: FrameStatus::default(),
            counters: StatusCounters::default(),
        };
        Ok(Fifo {
            base: ModuleBase::new(name, config, state),
            s_axis: Port::new(),
            m_axis: Port::new(),
        })
    }

    /// Status pulses raised on the last edge.
    pub fn status(&self) -> FrameStatus {
        self.base.state.status
    }

    pub fn counters(&self) -> StatusCounters {
        self.base.state.counters
    }

    /// Beats held, including the output register.
    pub fn occupancy(&self) -> usize {
        self.base.state.queue.len() + self.base.state.out.is_some() as usize
    }
}

module!(Fifo, FifoState, FifoConfig, "axis_fifo",);

impl ModuleBehaviors for Fifo {
    fn drive(&mut self) {
        let state = &self.base.state;
        self.s_axis.set_ready(state.s_ready);
        self.m_axis.drive(state.out.clone());
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let state = &mut self.base.state;

        if state.out.is_some() && self.m_axis.ready() {
            state.out = None;
        }

        state.status = FrameStatus::default();
        if let Some(beat) = self.s_axis.take_fired() {
            let beat = conf.format.conform(&beat);
            state.status = state.admission.write(&conf, &mut state.queue, beat);
            if !state.status.is_idle() {
                trace!("{}: {:?}", self.base.name, state.status);
            }
        }
        state.counters += state.status;

        if state.out.is_none() {
            state.out = state.queue.try_pop();
        }
        state.s_ready = state.admission.ready(&conf, &state.queue);
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.queue.clear();
        state.admission.reset();
        state.out = None;
        state.s_ready = true;
        state.status = FrameStatus::default();
        state.counters = StatusCounters::default();
    }
}
