//! FIFO spanning two unrelated clock domains.
//!
//! The writer and reader are separate modules, each clocked only by its own domain. They share a
//! dual-port memory and nothing else directly: every pointer or counter one side needs from the
//! other is published as a gray-coded register and passes through a two-register synchronizer on
//! the receiving side. A slot is written before the pointer covering it is published, so the
//! reader can never observe a slot whose write is still in flight.
//!
//! A reset on either side bumps that side's reset epoch, which crosses like any other register.
//! The other side clears itself on seeing a newer epoch and echoes it back; until the echo arrives
//! the side that was reset neither accepts nor presents beats.

use std::sync::{Arc, RwLock};

use log::debug;

use crate::axis::fifo::{FifoConfig, FrameAdmission, FrameStore};
use crate::base::beat::Beat;
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{Master, Port, Slave};
use crate::base::status::{FrameStatus, StatusCounters};

pub fn bin_to_gray(value: u64) -> u64 {
    value ^ (value >> 1)
}

pub fn gray_to_bin(gray: u64) -> u64 {
    let mut value = gray;
    let mut shift = 1;
    while shift < 64 {
        value ^= value >> shift;
        shift <<= 1;
    }
    value
}

/// Register output visible to the other domain.
#[derive(Debug, Clone, Default)]
struct CrossingRegister(Arc<RwLock<u64>>);

impl CrossingRegister {
    fn publish(&self, value: u64) {
        *self.0.write().expect("rw lock poisoned") = value;
    }

    fn sample(&self) -> u64 {
        *self.0.read().expect("rw lock poisoned")
    }
}

/// Two-register resynchronizer clocked by the receiving domain.
#[derive(Debug, Clone, Copy, Default)]
struct Synchronizer {
    stages: [u64; 2],
}

impl Synchronizer {
    fn value(&self) -> u64 {
        self.stages[1]
    }

    fn clock(&mut self, input: u64) {
        self.stages[1] = self.stages[0];
        self.stages[0] = input;
    }
}

type Memory = Arc<RwLock<Vec<Option<Beat>>>>;

#[derive(Debug)]
struct WritePointers {
    mem: Memory,
    depth: u64,
    wr_ptr: u64,
    wr_commit: u64,
    rd_ptr: u64,
}

impl FrameStore for WritePointers {
    fn capacity(&self) -> usize {
        self.depth as usize
    }

    fn is_full(&self) -> bool {
        self.wr_ptr.wrapping_sub(self.rd_ptr) >= self.depth
    }

    fn pending(&self) -> usize {
        self.wr_ptr.wrapping_sub(self.wr_commit) as usize
    }

    fn push(&mut self, beat: Beat) {
        debug_assert!(!self.is_full(), "write accepted while full");
        let slot = (self.wr_ptr & (self.depth - 1)) as usize;
        self.mem.write().expect("rw lock poisoned")[slot] = Some(beat);
        self.wr_ptr = self.wr_ptr.wrapping_add(1);
    }

    fn commit(&mut self) {
        self.wr_commit = self.wr_ptr;
    }

    fn rollback(&mut self) {
        self.wr_ptr = self.wr_commit;
    }
}

#[derive(Debug)]
pub struct WriterState {
    ptrs: WritePointers,
    rd_sync: Synchronizer,
    admission: FrameAdmission,
    s_ready: bool,
    status: FrameStatus,
    counters: StatusCounters,
    epoch: u64,
    peer_epoch: Synchronizer,
}

impl WriterState {
    fn clear(&mut self) {
        self.ptrs.wr_ptr = 0;
        self.ptrs.wr_commit = 0;
        self.ptrs.rd_ptr = 0;
        self.rd_sync = Synchronizer::default();
        self.admission.reset();
        self.status = FrameStatus::default();
        self.counters = StatusCounters::default();
    }
}

/// Write side of an async FIFO; clock it with the source domain.
pub struct AsyncFifoWriter {
    base: ModuleBase<WriterState, FifoConfig>,
    wr_ptr_gray: CrossingRegister,
    rd_ptr_gray: CrossingRegister,
    event_gray: [CrossingRegister; 3],
    wr_epoch: CrossingRegister,
    rd_epoch: CrossingRegister,
    pub s_axis: Port<Slave>,
}

#[derive(Debug)]
pub struct ReaderState {
    mem: Memory,
    depth: u64,
    rd_ptr: u64,
    wr_sync: Synchronizer,
    event_sync: [Synchronizer; 3],
    events_seen: [u64; 3],
    out: Option<Beat>,
    status: FrameStatus,
    counters: StatusCounters,
    epoch: u64,
    peer_epoch: Synchronizer,
}

impl ReaderState {
    fn clear(&mut self) {
        self.rd_ptr = 0;
        self.wr_sync = Synchronizer::default();
        self.event_sync = Default::default();
        self.events_seen = [0; 3];
        self.out = None;
        self.status = FrameStatus::default();
        self.counters = StatusCounters::default();
    }
}

/// Read side of an async FIFO; clock it with the sink domain.
pub struct AsyncFifoReader {
    base: ModuleBase<ReaderState, FifoConfig>,
    wr_ptr_gray: CrossingRegister,
    rd_ptr_gray: CrossingRegister,
    event_gray: [CrossingRegister; 3],
    wr_epoch: CrossingRegister,
    rd_epoch: CrossingRegister,
    pub m_axis: Port<Master>,
}

/// Build both halves of an async FIFO. The depth is rounded up to a power of two.
pub fn async_fifo(
    name: &str,
    config: Arc<FifoConfig>,
) -> anyhow::Result<(AsyncFifoWriter, AsyncFifoReader)> {
    config.validate()?;
    let depth = config.depth.next_power_of_two() as u64;
    let mem: Memory = Arc::new(RwLock::new(vec![None; depth as usize]));
    let wr_ptr_gray = CrossingRegister::default();
    let rd_ptr_gray = CrossingRegister::default();
    let event_gray: [CrossingRegister; 3] = Default::default();
    let wr_epoch = CrossingRegister::default();
    let rd_epoch = CrossingRegister::default();

    let writer = AsyncFifoWriter {
        base: ModuleBase::new(
            format!("{name}.s"),
            Arc::clone(&config),
            WriterState {
                ptrs: WritePointers {
                    mem: Arc::clone(&mem),
                    depth,
                    wr_ptr: 0,
                    wr_commit: 0,
                    rd_ptr: 0,
                },
                rd_sync: Synchronizer::default(),
                admission: FrameAdmission::default(),
                s_ready: true,
                status: FrameStatus::default(),
                counters: StatusCounters::default(),
                epoch: 0,
                peer_epoch: Synchronizer::default(),
            },
        ),
        wr_ptr_gray: wr_ptr_gray.clone(),
        rd_ptr_gray: rd_ptr_gray.clone(),
        event_gray: event_gray.clone(),
        wr_epoch: wr_epoch.clone(),
        rd_epoch: rd_epoch.clone(),
        s_axis: Port::new(),
    };
    let reader = AsyncFifoReader {
        base: ModuleBase::new(
            format!("{name}.m"),
            config,
            ReaderState {
                mem,
                depth,
                rd_ptr: 0,
                wr_sync: Synchronizer::default(),
                event_sync: Default::default(),
                events_seen: [0; 3],
                out: None,
                status: FrameStatus::default(),
                counters: StatusCounters::default(),
                epoch: 0,
                peer_epoch: Synchronizer::default(),
            },
        ),
        wr_ptr_gray,
        rd_ptr_gray,
        event_gray,
        wr_epoch,
        rd_epoch,
        m_axis: Port::new(),
    };
    Ok((writer, reader))
}

impl AsyncFifoWriter {
    /// Write-side status pulses raised on the last write-clock edge.
    pub fn status(&self) -> FrameStatus {
        self.base.state.status
    }

    pub fn counters(&self) -> StatusCounters {
        self.base.state.counters
    }

    pub fn depth(&self) -> usize {
        self.base.state.ptrs.depth as usize
    }

    fn publish(&self) {
        let state = &self.base.state;
        self.wr_ptr_gray.publish(bin_to_gray(state.ptrs.wr_commit));
        let counters = state.counters;
        for (reg, count) in self.event_gray.iter().zip([
            counters.overflow,
            counters.bad_frame,
            counters.good_frame,
        ]) {
            reg.publish(bin_to_gray(count));
        }
        self.wr_epoch.publish(bin_to_gray(state.epoch));
    }
}

impl AsyncFifoReader {
    /// Read-side view of the write-side status events, delayed by the synchronizer.
    pub fn status(&self) -> FrameStatus {
        self.base.state.status
    }

    pub fn counters(&self) -> StatusCounters {
        self.base.state.counters
    }

    fn publish(&self) {
        let state = &self.base.state;
        self.rd_ptr_gray.publish(bin_to_gray(state.rd_ptr));
        self.rd_epoch.publish(bin_to_gray(state.epoch));
    }
}

module!(AsyncFifoWriter, WriterState, FifoConfig, "axis_async_fifo",);
module!(AsyncFifoReader, ReaderState, FifoConfig, "axis_async_fifo",);

impl ModuleBehaviors for AsyncFifoWriter {
    fn drive(&mut self) {
        self.s_axis.set_ready(self.base.state.s_ready);
        self.publish();
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let state = &mut self.base.state;

        let peer = gray_to_bin(state.peer_epoch.value());
        if peer > state.epoch {
            debug!("{}: reset from read side", self.base.name);
            state.clear();
            state.epoch = peer;
        }
        let settled = peer == state.epoch;

        if settled {
            state.ptrs.rd_ptr = gray_to_bin(state.rd_sync.value());
        }
        state.status = FrameStatus::default();
        if let Some(beat) = self.s_axis.take_fired() {
            let beat = conf.format.conform(&beat);
            state.status = state.admission.write(&conf, &mut state.ptrs, beat);
            if state.status.overflow > 0 {
                debug!("{}: overflow", self.base.name);
            }
        }
        state.counters += state.status;
        state.s_ready = settled && state.admission.ready(&conf, &state.ptrs);
        state.rd_sync.clock(self.rd_ptr_gray.sample());
        state.peer_epoch.clock(self.rd_epoch.sample());
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.clear();
        state.epoch += 1;
        state.peer_epoch = Synchronizer::default();
        state.s_ready = false;
        self.publish();
    }
}

impl ModuleBehaviors for AsyncFifoReader {
    fn drive(&mut self) {
        self.m_axis.drive(self.base.state.out.clone());
        self.publish();
    }

    fn tick_one(&mut self) {
        let state = &mut self.base.state;

        if state.out.is_some() && self.m_axis.ready() {
            state.out = None;
        }
        let peer = gray_to_bin(state.peer_epoch.value());
        if peer > state.epoch {
            debug!("{}: reset from write side", self.base.name);
            state.clear();
            state.epoch = peer;
        }

        state.status = FrameStatus::default();
        if peer == state.epoch {
            let wr_commit = gray_to_bin(state.wr_sync.value());
            if state.out.is_none() && state.rd_ptr != wr_commit {
                let slot = (state.rd_ptr & (state.depth - 1)) as usize;
                state.out = state.mem.read().expect("rw lock poisoned")[slot].clone();
                state.rd_ptr = state.rd_ptr.wrapping_add(1);
            }

            let mut deltas = [0u32; 3];
            for (i, sync) in state.event_sync.iter().enumerate() {
                let seen = gray_to_bin(sync.value());
                deltas[i] = seen.wrapping_sub(state.events_seen[i]) as u32;
                state.events_seen[i] = seen;
            }
            state.status = FrameStatus {
                overflow: deltas[0],
                bad_frame: deltas[1],
                good_frame: deltas[2],
            };
            state.counters += state.status;
        }

        state.wr_sync.clock(self.wr_ptr_gray.sample());
        for (sync, reg) in state.event_sync.iter_mut().zip(self.event_gray.iter()) {
            sync.clock(reg.sample());
        }
        state.peer_epoch.clock(self.wr_epoch.sample());
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let state = &mut self.base.state;
        state.clear();
        state.epoch += 1;
        state.peer_epoch = Synchronizer::default();
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gray_code_round_trips() {
        for value in [0u64, 1, 2, 3, 7, 8, 255, 1 << 40, u64::MAX] {
            assert_eq!(value, gray_to_bin(bin_to_gray(value)));
        }
    }

    #[test]
    fn adjacent_gray_codes_differ_in_one_bit() {
        for value in 0u64..1024 {
            let diff = bin_to_gray(value) ^ bin_to_gray(value + 1);
            assert_eq!(1, diff.count_ones());
        }
    }

    #[test]
    fn synchronizer_delays_two_edges() {
        let mut sync = Synchronizer::default();
        sync.clock(5);
        assert_eq!(0, sync.value());
        sync.clock(5);
        assert_eq!(5, sync.value());
    }
}
