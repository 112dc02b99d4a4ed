use log::trace;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbPolicy {
    #[default]
    RoundRobin,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub policy: ArbPolicy,
    /// Lower indices win ties; otherwise higher indices do.
    pub lsb_high_priority: bool,
    /// Hold a grant while its request stays asserted.
    pub block: bool,
    /// Hold a grant until it is acknowledged.
    pub block_ack: bool,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            policy: ArbPolicy::RoundRobin,
            lsb_high_priority: true,
            block: true,
            block_ack: true,
        }
    }
}

/// Registered one-hot arbiter. `arbitrate` is called once per edge with that edge's requests and
/// acknowledges and returns the grant for the next cycle.
#[derive(Debug, Clone)]
pub struct Arbiter {
    config: ArbiterConfig,
    ports: usize,
    grant: Option<usize>,
    /// Last index granted, where the round-robin search restarts from.
    last: Option<usize>,
}

impl Arbiter {
    pub fn new(ports: usize, config: ArbiterConfig) -> Self {
        Self {
            config,
            ports,
            grant: None,
            last: None,
        }
    }

    pub fn ports(&self) -> usize {
        self.ports
    }

    pub fn grant(&self) -> Option<usize> {
        self.grant
    }

    pub fn grant_mask(&self) -> Vec<bool> {
        (0..self.ports).map(|i| self.grant == Some(i)).collect()
    }

    pub fn arbitrate(&mut self, request: &[bool], acknowledge: &[bool]) -> Option<usize> {
        debug_assert_eq!(self.ports, request.len());
        let conf = self.config;

        if let Some(g) = self.grant {
            let acked = acknowledge.get(g).copied().unwrap_or(false);
            if conf.block && conf.block_ack && !acked {
                return self.grant;
            }
            if conf.block && !conf.block_ack && request[g] {
                return self.grant;
            }
        }

        self.grant = match conf.policy {
            ArbPolicy::Priority => self.pick(request, |_| true),
            ArbPolicy::RoundRobin => {
                let after_last = |i: usize| match self.last {
                    None => true,
                    Some(last) if conf.lsb_high_priority => i > last,
                    Some(last) => i < last,
                };
                self.pick(request, after_last)
                    .or_else(|| self.pick(request, |_| true))
            }
        };
        if let Some(g) = self.grant {
            trace!("grant {} of {}", g, self.ports);
            self.last = Some(g);
        }
        self.grant
    }

    fn pick(&self, request: &[bool], eligible: impl Fn(usize) -> bool) -> Option<usize> {
        let mut candidates = (0..self.ports).filter(|&i| request[i] && eligible(i));
        if self.config.lsb_high_priority {
            candidates.next()
        } else {
            candidates.last()
        }
    }

    pub fn reset(&mut self) {
        self.grant = None;
        self.last = None;
    }
}
