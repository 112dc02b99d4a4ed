use crate::axis::async_fifo::{AsyncFifoReader, AsyncFifoWriter};
use crate::base::beat::Beat;
use crate::base::behavior::ModuleBehaviors;
use crate::sim::clock::{clock_edge, ClockScheduler};
use crate::sim::driver::{StreamSink, StreamSource};

/// One edge over sources, devices under test and sinks, in that order.
pub(crate) fn step(
    sources: &mut [StreamSource],
    duts: &mut [&mut dyn ModuleBehaviors],
    sinks: &mut [StreamSink],
) {
    let mut mods: Vec<&mut dyn ModuleBehaviors> = Vec::new();
    mods.extend(sources.iter_mut().map(|s| s as &mut dyn ModuleBehaviors));
    for dut in duts.iter_mut() {
        mods.push(&mut **dut);
    }
    mods.extend(sinks.iter_mut().map(|s| s as &mut dyn ModuleBehaviors));
    clock_edge(&mut mods).expect("edge did not settle");
}

pub(crate) fn run(
    sources: &mut [StreamSource],
    duts: &mut [&mut dyn ModuleBehaviors],
    sinks: &mut [StreamSink],
    cycles: u64,
) {
    for _ in 0..cycles {
        step(sources, duts, sinks);
    }
}

/// Clocks `source -> writer` on domain `wr` and `reader -> sink` on domain `rd` for `edges`
/// scheduler steps.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_crossing(
    sched: &mut ClockScheduler,
    (wr, rd): (usize, usize),
    source: &mut StreamSource,
    writer: &mut AsyncFifoWriter,
    reader: &mut AsyncFifoReader,
    sink: &mut StreamSink,
    edges: u64,
) {
    for _ in 0..edges {
        let clocked = sched.next_edge();
        let mut mods: Vec<&mut dyn ModuleBehaviors> = Vec::new();
        if clocked.contains(&wr) {
            mods.push(&mut *source);
            mods.push(&mut *writer);
        }
        if clocked.contains(&rd) {
            mods.push(&mut *reader);
            mods.push(&mut *sink);
        }
        clock_edge(&mut mods).expect("edge did not settle");
    }
}

pub(crate) fn words(beats: &[Beat]) -> Vec<u64> {
    beats.iter().map(Beat::word).collect()
}

#[cfg(test)]
mod broadcast_tests;
#[cfg(test)]
mod crosspoint_tests;
#[cfg(test)]
mod fifo_tests;
#[cfg(test)]
mod property_tests;
#[cfg(test)]
mod rate_limit_tests;
