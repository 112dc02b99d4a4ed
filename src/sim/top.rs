use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{ensure, Context};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::axis::arb_mux::ArbMux;
use crate::axis::async_fifo::async_fifo;
use crate::axis::broadcast::Broadcast;
use crate::axis::fifo::Fifo;
use crate::axis::ram_switch::RamSwitch;
use crate::axis::switch::{Route, Switch, SwitchConfig};
use crate::base::beat::{BadFrameMarker, Beat, BeatFormat, Data};
use crate::base::behavior::{ModuleBehaviors, Parameterizable};
use crate::base::module::{ConfigSummary, IsModule};
use crate::base::port::link;
use crate::base::status::StatusCounters;
use crate::sim::clock::{clock_edge, ClockScheduler, Cycle, EdgeError};
use crate::sim::config::{FabricConfig, SimConfig, Topology, TrafficConfig};
use crate::sim::driver::{make_frame, ReadyPattern, StreamSink, StreamSource};
use crate::sim::trace::TransferTrace;

/// Cycles without any delivery after the sources drain before a lossy run is considered done.
const QUIET_LIMIT: u64 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct SinkReport {
    pub port: String,
    pub beats: usize,
    pub frames: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub topology: Topology,
    pub cycles: Cycle,
    pub components: Vec<ConfigSummary>,
    pub beats_sent: u64,
    pub sinks: Vec<SinkReport>,
    pub status: Vec<(String, StatusCounters)>,
    pub unrouted: u64,
    /// Expected frames not delivered when the run ended.
    pub outstanding: usize,
    pub violations: Vec<String>,
    pub mismatches: Vec<String>,
}

impl SimReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty() && self.mismatches.is_empty()
    }
}

fn payload(frame: &[Beat]) -> Vec<Data> {
    frame.iter().map(|b| b.data.clone()).collect()
}

/// Frames each sink should see, queued per source. Order within a queue is the order the source
/// sent them; order across queues is up to arbitration.
struct Expectation {
    queues: Vec<Vec<VecDeque<Vec<Data>>>>,
    lossy: bool,
}

impl Expectation {
    fn new(sinks: usize, sources: usize, lossy: bool) -> Self {
        Self {
            queues: vec![vec![VecDeque::new(); sources]; sinks],
            lossy,
        }
    }

    fn expect(&mut self, sink: usize, source: usize, frame: &[Beat]) {
        self.queues[sink][source].push_back(payload(frame));
    }

    fn total(&self) -> usize {
        self.queues.iter().flatten().map(VecDeque::len).sum()
    }

    fn check(&mut self, sink: usize, frame: &[Beat]) -> Result<(), String> {
        let got = payload(frame);
        for queue in self.queues[sink].iter_mut() {
            if self.lossy {
                if let Some(pos) = queue.iter().position(|e| *e == got) {
                    queue.drain(..=pos);
                    return Ok(());
                }
            } else if queue.front() == Some(&got) {
                queue.pop_front();
                return Ok(());
            }
        }
        Err(format!(
            "m{}: unexpected or out-of-order frame of {} beats",
            sink,
            frame.len()
        ))
    }
}

struct Bench {
    sources: Vec<StreamSource>,
    sinks: Vec<StreamSink>,
    expect: Expectation,
    trace: Option<TransferTrace>,
    total: usize,
    delivered: usize,
    quiet: u64,
}

impl Bench {
    fn new(
        sim: &SimConfig,
        traffic: &TrafficConfig,
        n_sources: usize,
        n_sinks: usize,
        lossy: bool,
    ) -> Self {
        let sources = (0..n_sources)
            .map(|i| {
                StreamSource::new(sim.seed.wrapping_add(i as u64)).with_idle(traffic.idle_prob)
            })
            .collect();
        let sinks = (0..n_sinks)
            .map(|j| {
                StreamSink::new(
                    ReadyPattern::Random(traffic.ready_prob),
                    sim.seed.wrapping_add(1000 + j as u64),
                )
            })
            .collect();
        Self {
            sources,
            sinks,
            expect: Expectation::new(n_sinks, n_sources, lossy),
            trace: sim.trace.as_ref().map(|_| TransferTrace::new()),
            total: 0,
            delivered: 0,
            quiet: 0,
        }
    }

    /// Probe sink channels; call once every link is made.
    fn probe_sinks(&mut self) {
        if let Some(trace) = self.trace.as_mut() {
            for (j, sink) in self.sinks.iter().enumerate() {
                trace.probe(format!("m{j}"), sink.s_axis.channel());
            }
        }
    }

    fn seal(&mut self) {
        self.total = self.expect.total();
    }

    fn edge(
        &mut self,
        duts: &mut [&mut dyn ModuleBehaviors],
        sources: bool,
        sinks: bool,
    ) -> Result<(), EdgeError> {
        let mut mods: Vec<&mut dyn ModuleBehaviors> = Vec::new();
        if sources {
            mods.extend(
                self.sources
                    .iter_mut()
                    .map(|s| s as &mut dyn ModuleBehaviors),
            );
        }
        for dut in duts.iter_mut() {
            mods.push(&mut **dut);
        }
        if sinks {
            mods.extend(self.sinks.iter_mut().map(|s| s as &mut dyn ModuleBehaviors));
        }
        clock_edge(&mut mods)
    }

    fn after_edge(&mut self, cycle: Cycle) {
        if let Some(trace) = self.trace.as_mut() {
            trace.sample(cycle);
        }
        let delivered = self.sinks.iter().map(|s| s.frames().len()).sum();
        if delivered == self.delivered {
            self.quiet += 1;
        } else {
            self.delivered = delivered;
            self.quiet = 0;
        }
    }

    fn done(&self) -> bool {
        self.sources.iter().all(StreamSource::is_done)
            && (self.delivered >= self.total || self.quiet >= QUIET_LIMIT)
    }

    fn finish(
        mut self,
        sim: &SimConfig,
        topology: Topology,
        cycles: Cycle,
        components: Vec<ConfigSummary>,
        status: Vec<(String, StatusCounters)>,
        unrouted: u64,
    ) -> anyhow::Result<SimReport> {
        let mut mismatches = Vec::new();
        let mut violations = Vec::new();
        let mut sinks = Vec::new();
        for (j, sink) in self.sinks.iter().enumerate() {
            for frame in sink.frames() {
                if let Err(msg) = self.expect.check(j, frame) {
                    mismatches.push(msg);
                }
            }
            violations.extend(sink.violations().iter().map(|v| format!("m{j}: {v}")));
            sinks.push(SinkReport {
                port: format!("m{j}"),
                beats: sink.received().len(),
                frames: sink.frames().len(),
            });
        }
        if let (Some(trace), Some(path)) = (self.trace.take(), sim.trace.as_ref()) {
            trace
                .save(path)
                .with_context(|| format!("cannot write trace to {}", path.display()))?;
        }
        Ok(SimReport {
            topology,
            cycles,
            components,
            beats_sent: self.sources.iter().map(StreamSource::sent).sum(),
            sinks,
            status,
            unrouted,
            outstanding: self.expect.total(),
            violations,
            mismatches,
        })
    }
}

/// Builds the configured topology, drives random traffic through it and checks what comes out.
pub struct Sim {
    sim: SimConfig,
    traffic: TrafficConfig,
    fabric: FabricConfig,
    rng: StdRng,
}

impl Sim {
    pub fn new(
        sim: SimConfig,
        traffic: TrafficConfig,
        fabric: FabricConfig,
    ) -> anyhow::Result<Self> {
        traffic.validate()?;
        let (drop_bad, depth) = match fabric.topology {
            Topology::Fifo | Topology::AsyncFifo => (fabric.fifo.drop_bad_frame, fabric.fifo.depth),
            Topology::RamSwitch => (fabric.ram_switch.drop_bad_frame, fabric.ram_switch.fifo_depth),
            _ => (false, 0),
        };
        // longer frames cut through and can no longer be dropped
        ensure!(
            !drop_bad || traffic.max_len <= depth,
            "drop_bad_frame needs frames no longer than the fifo depth ({} > {})",
            traffic.max_len,
            depth
        );
        let rng = StdRng::seed_from_u64(sim.seed ^ 0x5eed);
        Ok(Self {
            sim,
            traffic,
            fabric,
            rng,
        })
    }

    fn gen_frame(&mut self, format: &BeatFormat, marker: &BadFrameMarker, dest: u64) -> Vec<Beat> {
        let traffic = &self.traffic;
        let len = self.rng.gen_range(traffic.min_len..=traffic.max_len);
        let words = (0..len).map(|_| self.rng.gen()).collect::<Vec<u64>>();
        let bad = traffic.bad_frame_prob > 0.0 && self.rng.gen_bool(traffic.bad_frame_prob);
        let user = if bad {
            marker.value
        } else {
            marker.value ^ marker.mask
        };
        make_frame(&words, format.data_bytes(), 0, dest, user)
            .iter()
            .map(|b| format.conform(b))
            .collect()
    }

    pub fn simulate(&mut self) -> anyhow::Result<SimReport> {
        info!("simulating {:?} for up to {} cycles", self.fabric.topology, self.sim.cycles);
        match self.fabric.topology {
            Topology::Fifo => self.run_fifo(),
            Topology::AsyncFifo => self.run_async_fifo(),
            Topology::ArbMux => self.run_arb_mux(),
            Topology::Switch => self.run_switch(),
            Topology::RamSwitch => self.run_ram_switch(),
            Topology::Broadcast => self.run_broadcast(),
        }
    }

    /// Queue frames on a single-source bench, expecting each at sink 0 unless it is dropped as bad.
    fn load_stream(
        &mut self,
        bench: &mut Bench,
        format: BeatFormat,
        marker: BadFrameMarker,
        drop_bad: bool,
    ) {
        for _ in 0..self.traffic.frames {
            let frame = self.gen_frame(&format, &marker, 0);
            let bad = frame.last().is_some_and(|b| marker.is_bad(b));
            if !(drop_bad && bad) {
                bench.expect.expect(0, 0, &frame);
            }
            bench.sources[0].push_frame(frame);
        }
        bench.seal();
    }

    fn run_fifo(&mut self) -> anyhow::Result<SimReport> {
        let mut fifo = Fifo::new("fifo", Arc::new(self.fabric.fifo.clone()))?;
        let conf = fifo.conf();
        let lossy = conf.drop_when_full || conf.drop_oversize_frame;
        let (format, marker) = (conf.format, conf.marker);
        let drop_bad = conf.frame_fifo && conf.drop_bad_frame;
        let mut bench = Bench::new(&self.sim, &self.traffic, 1, 1, lossy);
        link(&mut bench.sources[0].m_axis, &mut fifo.s_axis);
        link(&mut fifo.m_axis, &mut bench.sinks[0].s_axis);
        bench.probe_sinks();
        self.load_stream(&mut bench, format, marker, drop_bad);

        let mut cycle = 0;
        while cycle < self.sim.cycles && !bench.done() {
            bench.edge(&mut [&mut fifo], true, true)?;
            bench.after_edge(cycle);
            cycle += 1;
        }
        let status = vec![(fifo.name().to_string(), fifo.counters())];
        bench.finish(&self.sim, Topology::Fifo, cycle, vec![fifo.summary()], status, 0)
    }

    fn run_async_fifo(&mut self) -> anyhow::Result<SimReport> {
        let conf = Arc::new(self.fabric.fifo.clone());
        let lossy = conf.drop_when_full || conf.drop_oversize_frame;
        let mut bench = Bench::new(&self.sim, &self.traffic, 1, 1, lossy);
        let (mut writer, mut reader) = async_fifo("async_fifo", Arc::clone(&conf))?;
        link(&mut bench.sources[0].m_axis, &mut writer.s_axis);
        link(&mut reader.m_axis, &mut bench.sinks[0].s_axis);
        bench.probe_sinks();
        let drop_bad = conf.frame_fifo && conf.drop_bad_frame;
        self.load_stream(&mut bench, conf.format, conf.marker, drop_bad);

        let mut sched = ClockScheduler::new();
        let (wr_clock, rd_clock) = (&self.fabric.wr_clock, &self.fabric.rd_clock);
        let wr = sched.add_domain("wr", wr_clock.period_ps, wr_clock.phase_ps)?;
        let rd = sched.add_domain("rd", rd_clock.period_ps, rd_clock.phase_ps)?;
        let mut edges = 0;
        loop {
            let cycles = sched.domain(wr).cycle().max(sched.domain(rd).cycle());
            if cycles >= self.sim.cycles || bench.done() {
                break;
            }
            let ticking = sched.next_edge();
            let (w, r) = (ticking.contains(&wr), ticking.contains(&rd));
            match (w, r) {
                (true, true) => bench.edge(&mut [&mut writer, &mut reader], true, true)?,
                (true, false) => bench.edge(&mut [&mut writer], true, false)?,
                (false, true) => bench.edge(&mut [&mut reader], false, true)?,
                (false, false) => {}
            }
            if r {
                bench.after_edge(edges);
            }
            edges += 1;
        }
        let status = vec![
            (writer.name().to_string(), writer.counters()),
            (reader.name().to_string(), reader.counters()),
        ];
        let cycles = sched.domain(wr).cycle().max(sched.domain(rd).cycle());
        bench.finish(&self.sim, Topology::AsyncFifo, cycles, vec![writer.summary()], status, 0)
    }

    fn run_arb_mux(&mut self) -> anyhow::Result<SimReport> {
        let conf = Arc::new(self.fabric.arb_mux.clone());
        let n = conf.s_count;
        let mut bench = Bench::new(&self.sim, &self.traffic, n, 1, false);
        let mut mux = ArbMux::new("arb_mux", Arc::clone(&conf))?;
        for (src, s) in bench.sources.iter_mut().zip(mux.s_axis.iter_mut()) {
            link(&mut src.m_axis, s);
        }
        link(&mut mux.m_axis, &mut bench.sinks[0].s_axis);
        bench.probe_sinks();
        for i in 0..n {
            for _ in 0..self.traffic.frames {
                let frame = self.gen_frame(&conf.format, &BadFrameMarker::default(), 0);
                bench.expect.expect(0, i, &frame);
                bench.sources[i].push_frame(frame);
            }
        }
        bench.seal();

        let mut cycle = 0;
        while cycle < self.sim.cycles && !bench.done() {
            bench.edge(&mut [&mut mux], true, true)?;
            bench.after_edge(cycle);
            cycle += 1;
        }
        bench.finish(&self.sim, Topology::ArbMux, cycle, vec![mux.summary()], Vec::new(), 0)
    }

    /// Queue frames with dests drawn from each input's reachable ranges, expecting each at the
    /// output the switch decodes it to.
    fn load_switch(
        &mut self,
        bench: &mut Bench,
        conf: &SwitchConfig,
        drop_bad: Option<BadFrameMarker>,
    ) {
        let map = conf.address_map();
        for s in 0..conf.s_count {
            let reachable = (0..conf.m_count)
                .filter(|&m| conf.connected(s, m))
                .collect::<Vec<_>>();
            if reachable.is_empty() {
                continue;
            }
            for _ in 0..self.traffic.frames {
                let m = reachable[self.rng.gen_range(0..reachable.len())];
                let range = map.ranges[m];
                let dest = self.rng.gen_range(range.base..=range.top);
                let marker = drop_bad.unwrap_or_default();
                let frame = self.gen_frame(&conf.format, &marker, dest);
                let bad = drop_bad.is_some() && frame.last().is_some_and(|b| marker.is_bad(b));
                if let (Route::Port(out), false) = (Switch::decode(conf, &map, s, dest), bad) {
                    bench.expect.expect(out, s, &frame);
                }
                bench.sources[s].push_frame(frame);
            }
        }
        bench.seal();
    }

    fn run_switch(&mut self) -> anyhow::Result<SimReport> {
        let conf = Arc::new(self.fabric.switch.clone());
        let mut bench = Bench::new(&self.sim, &self.traffic, conf.s_count, conf.m_count, false);
        let mut switch = Switch::new("switch", Arc::clone(&conf))?;
        for (src, s) in bench.sources.iter_mut().zip(switch.s_axis.iter_mut()) {
            link(&mut src.m_axis, s);
        }
        for (m, sink) in switch.m_axis.iter_mut().zip(bench.sinks.iter_mut()) {
            link(m, &mut sink.s_axis);
        }
        bench.probe_sinks();
        self.load_switch(&mut bench, &conf, None);

        let mut cycle = 0;
        while cycle < self.sim.cycles && !bench.done() {
            bench.edge(&mut [&mut switch], true, true)?;
            bench.after_edge(cycle);
            cycle += 1;
        }
        let unrouted = switch.unrouted().iter().sum();
        let components = vec![switch.summary()];
        bench.finish(&self.sim, Topology::Switch, cycle, components, Vec::new(), unrouted)
    }

    fn run_ram_switch(&mut self) -> anyhow::Result<SimReport> {
        let conf = Arc::new(self.fabric.ram_switch.clone());
        let sw = &conf.switch;
        let lossy = conf.drop_when_full;
        let mut bench = Bench::new(&self.sim, &self.traffic, sw.s_count, sw.m_count, lossy);
        let mut ram_switch = RamSwitch::new("ram_switch", Arc::clone(&conf))?;
        for (s, src) in bench.sources.iter_mut().enumerate() {
            link(&mut src.m_axis, ram_switch.s_axis(s));
        }
        for (m, sink) in bench.sinks.iter_mut().enumerate() {
            link(ram_switch.m_axis(m), &mut sink.s_axis);
        }
        bench.probe_sinks();
        let drop_bad = conf.drop_bad_frame.then_some(conf.marker);
        self.load_switch(&mut bench, sw, drop_bad);

        let mut cycle = 0;
        while cycle < self.sim.cycles && !bench.done() {
            bench.edge(&mut [&mut ram_switch], true, true)?;
            bench.after_edge(cycle);
            cycle += 1;
        }
        let status = ram_switch
            .s_counters()
            .into_iter()
            .enumerate()
            .map(|(i, c)| (format!("ram_switch.fifo{i}"), c))
            .collect();
        let unrouted = ram_switch.switch().unrouted().iter().sum();
        let components = vec![ram_switch.summary(), ram_switch.switch().summary()];
        bench.finish(&self.sim, Topology::RamSwitch, cycle, components, status, unrouted)
    }

    fn run_broadcast(&mut self) -> anyhow::Result<SimReport> {
        let conf = Arc::new(self.fabric.broadcast.clone());
        let mut bench = Bench::new(&self.sim, &self.traffic, 1, conf.m_count, false);
        let mut bcast = Broadcast::new("broadcast", Arc::clone(&conf))?;
        link(&mut bench.sources[0].m_axis, &mut bcast.s_axis);
        for (m, sink) in bcast.m_axis.iter_mut().zip(bench.sinks.iter_mut()) {
            link(m, &mut sink.s_axis);
        }
        bench.probe_sinks();
        for _ in 0..self.traffic.frames {
            let frame = self.gen_frame(&conf.format, &BadFrameMarker::default(), 0);
            for m in 0..conf.m_count {
                bench.expect.expect(m, 0, &frame);
            }
            bench.sources[0].push_frame(frame);
        }
        bench.seal();

        let mut cycle = 0;
        while cycle < self.sim.cycles && !bench.done() {
            bench.edge(&mut [&mut bcast], true, true)?;
            bench.after_edge(cycle);
            cycle += 1;
        }
        bench.finish(&self.sim, Topology::Broadcast, cycle, vec![bcast.summary()], Vec::new(), 0)
    }
}
