use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::base::beat::Beat;
use crate::base::behavior::ModuleBehaviors;
use crate::base::port::{Master, Port, Slave, Wire};
use crate::sim::clock::Cycle;

/// Frame of `words.len()` beats of `bytes` bytes each, last beat marked.
pub fn make_frame(words: &[u64], bytes: usize, id: u64, dest: u64, user: u64) -> Vec<Beat> {
    let n = words.len();
    words
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            Beat::from_word(w, bytes)
                .with_id(id)
                .with_dest(dest)
                .with_user(user)
                .with_last(i + 1 == n)
        })
        .collect()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("valid withdrawn without a transfer at cycle {cycle}")]
    ValidWithdrawn { cycle: Cycle },
    #[error("payload changed while stalled at cycle {cycle}")]
    PayloadChanged { cycle: Cycle },
}

/// Watches one channel for handshake breaches: once `valid` is raised it must stay raised with the
/// same payload until the transfer happens.
#[derive(Debug, Default, Clone)]
pub struct ProtocolChecker {
    stalled: Option<Beat>,
    transfers: u64,
    violations: Vec<ProtocolViolation>,
}

impl ProtocolChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, cycle: Cycle, wire: &Wire) -> Result<(), ProtocolViolation> {
        let mut result = Ok(());
        if let Some(prev) = self.stalled.take() {
            match &wire.beat {
                None => result = Err(ProtocolViolation::ValidWithdrawn { cycle }),
                Some(beat) if *beat != prev => {
                    result = Err(ProtocolViolation::PayloadChanged { cycle })
                }
                Some(_) => {}
            }
        }
        if wire.fired() {
            self.transfers += 1;
        } else {
            self.stalled = wire.beat.clone();
        }
        if let Err(violation) = &result {
            self.violations.push(violation.clone());
        }
        result
    }

    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    pub fn violations(&self) -> &[ProtocolViolation] {
        &self.violations
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Drives queued frames onto a channel. With a non-zero idle probability it inserts random gaps
/// between beats, but never drops `valid` once it has been raised.
pub struct StreamSource {
    pub m_axis: Port<Master>,
    pending: VecDeque<Beat>,
    current: Option<Beat>,
    idle_prob: f64,
    rng: StdRng,
    seed: u64,
    sent: u64,
}

impl StreamSource {
    pub fn new(seed: u64) -> Self {
        Self {
            m_axis: Port::new(),
            pending: VecDeque::new(),
            current: None,
            idle_prob: 0.0,
            rng: StdRng::seed_from_u64(seed),
            seed,
            sent: 0,
        }
    }

    pub fn with_idle(mut self, idle_prob: f64) -> Self {
        self.idle_prob = idle_prob.clamp(0.0, 1.0);
        self
    }

    pub fn push_frame(&mut self, frame: Vec<Beat>) {
        self.pending.extend(frame);
    }

    pub fn push_beat(&mut self, beat: Beat) {
        self.pending.push_back(beat);
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty() && self.current.is_none()
    }
}

impl ModuleBehaviors for StreamSource {
    fn drive(&mut self) {
        self.m_axis.drive(self.current.clone());
    }

    fn tick_one(&mut self) {
        if self.current.is_some() && self.m_axis.ready() {
            self.current = None;
            self.sent += 1;
        }
        if self.current.is_none() && !self.pending.is_empty() && !self.rng.gen_bool(self.idle_prob)
        {
            self.current = self.pending.pop_front();
        }
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
        self.sent = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadyPattern {
    Always,
    /// Ready with this probability each cycle.
    Random(f64),
    /// Repeat this pattern.
    Script(Vec<bool>),
}

/// Consumes a channel, recording every transfer and checking the handshake.
pub struct StreamSink {
    pub s_axis: Port<Slave>,
    pattern: ReadyPattern,
    rng: StdRng,
    seed: u64,
    ready: bool,
    cycle: Cycle,
    received: Vec<(Cycle, Beat)>,
    partial: Vec<Beat>,
    frames: Vec<Vec<Beat>>,
    checker: ProtocolChecker,
}

impl StreamSink {
    pub fn new(pattern: ReadyPattern, seed: u64) -> Self {
        let mut sink = Self {
            s_axis: Port::new(),
            pattern,
            rng: StdRng::seed_from_u64(seed),
            seed,
            ready: false,
            cycle: 0,
            received: Vec::new(),
            partial: Vec::new(),
            frames: Vec::new(),
            checker: ProtocolChecker::new(),
        };
        sink.ready = sink.next_ready();
        sink
    }

    pub fn always() -> Self {
        Self::new(ReadyPattern::Always, 0)
    }

    fn next_ready(&mut self) -> bool {
        match &self.pattern {
            ReadyPattern::Always => true,
            ReadyPattern::Random(p) => {
                let p = p.clamp(0.0, 1.0);
                self.rng.gen_bool(p)
            }
            ReadyPattern::Script(script) if script.is_empty() => false,
            ReadyPattern::Script(script) => script[self.cycle as usize % script.len()],
        }
    }

    pub fn set_pattern(&mut self, pattern: ReadyPattern) {
        self.pattern = pattern;
    }

    pub fn received(&self) -> &[(Cycle, Beat)] {
        &self.received
    }

    pub fn beats(&self) -> Vec<Beat> {
        self.received.iter().map(|(_, b)| b.clone()).collect()
    }

    /// Completed frames, in arrival order.
    pub fn frames(&self) -> &[Vec<Beat>] {
        &self.frames
    }

    pub fn violations(&self) -> &[ProtocolViolation] {
        self.checker.violations()
    }
}

impl ModuleBehaviors for StreamSink {
    fn drive(&mut self) {
        self.s_axis.set_ready(self.ready);
    }

    fn tick_one(&mut self) {
        let wire = self.s_axis.wire();
        let _ = self.checker.observe(self.cycle, &wire);
        if let (true, Some(beat)) = (wire.fired(), wire.beat) {
            self.partial.push(beat.clone());
            if beat.last {
                self.frames.push(std::mem::take(&mut self.partial));
            }
            self.received.push((self.cycle, beat));
        }
        self.cycle += 1;
        self.ready = self.next_ready();
    }

    fn reset(&mut self) {
        self.cycle = 0;
        self.rng = StdRng::seed_from_u64(self.seed);
        self.received.clear();
        self.partial.clear();
        self.frames.clear();
        self.checker.reset();
        self.ready = self.next_ready();
    }
}
