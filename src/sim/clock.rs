use anyhow::ensure;
use thiserror::Error;

use crate::base::behavior::ModuleBehaviors;

pub type Cycle = u64;

pub const SETTLE_LIMIT: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EdgeError {
    #[error("combinational loop: outputs still changing after {0} settle passes")]
    CombinationalLoop(usize),
}

/// Evaluate one clock edge for every module in a domain: publish registered outputs, resolve
/// combinational refinements to a fixed point, then commit.
pub fn clock_edge(modules: &mut [&mut dyn ModuleBehaviors]) -> Result<(), EdgeError> {
    for module in modules.iter_mut() {
        module.drive();
    }

    let mut passes = 0;
    loop {
        let mut changed = false;
        for module in modules.iter_mut() {
            changed |= module.settle();
        }
        if !changed {
            break;
        }
        passes += 1;
        if passes >= SETTLE_LIMIT {
            return Err(EdgeError::CombinationalLoop(passes));
        }
    }

    for module in modules.iter_mut() {
        module.tick_one();
    }
    Ok(())
}

pub fn run_cycles(modules: &mut [&mut dyn ModuleBehaviors], cycles: u64) -> Result<(), EdgeError> {
    for _ in 0..cycles {
        clock_edge(modules)?;
    }
    Ok(())
}

pub fn reset_all(modules: &mut [&mut dyn ModuleBehaviors]) {
    modules.iter_mut().for_each(|m| m.reset());
}

#[derive(Debug, Clone)]
pub struct ClockDomain {
    pub name: String,
    pub period_ps: u64,
    pub phase_ps: u64,
    next_edge_ps: u64,
    cycle: Cycle,
}

impl ClockDomain {
    pub fn cycle(&self) -> Cycle {
        self.cycle
    }
}

/// Orders the edges of independent clock domains. Domains whose edges coincide are reported
/// together so they can be evaluated in a single `clock_edge`.
#[derive(Debug, Default)]
pub struct ClockScheduler {
    domains: Vec<ClockDomain>,
    now_ps: u64,
}

impl ClockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_domain(
        &mut self,
        name: impl Into<String>,
        period_ps: u64,
        phase_ps: u64,
    ) -> anyhow::Result<usize> {
        ensure!(period_ps > 0, "clock period must be > 0");
        self.domains.push(ClockDomain {
            name: name.into(),
            period_ps,
            phase_ps,
            next_edge_ps: self.now_ps + phase_ps,
            cycle: 0,
        });
        Ok(self.domains.len() - 1)
    }

    pub fn now_ps(&self) -> u64 {
        self.now_ps
    }

    pub fn domain(&self, id: usize) -> &ClockDomain {
        &self.domains[id]
    }

    /// Advance to the earliest pending edge and return the domains clocked at that instant.
    pub fn next_edge(&mut self) -> Vec<usize> {
        let Some(next) = self.domains.iter().map(|d| d.next_edge_ps).min() else {
            return Vec::new();
        };
        self.now_ps = next;
        let mut edges = Vec::new();
        for (id, domain) in self.domains.iter_mut().enumerate() {
            if domain.next_edge_ps == next {
                domain.next_edge_ps += domain.period_ps;
                domain.cycle += 1;
                edges.push(id);
            }
        }
        edges
    }
}
