use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{ensure, Context};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use toml::Value;

use crate::axis::arb_mux::ArbMuxConfig;
use crate::axis::broadcast::BroadcastConfig;
use crate::axis::fifo::FifoConfig;
use crate::axis::ram_switch::RamSwitchConfig;
use crate::axis::switch::SwitchConfig;

pub trait Config: DeserializeOwned + Default {
    /// Deserialize a top-level TOML section, falling back to defaults when it is absent.
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => value
                .clone()
                .try_into()
                .context("cannot deserialize config section"),
            None => {
                warn!("config section not found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub log_level: u64,
    /// Cycles of the fastest clock domain to simulate.
    pub cycles: u64,
    pub seed: u64,
    pub trace: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            cycles: 10000,
            seed: 0,
            trace: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    /// Frames per source.
    pub frames: usize,
    pub min_len: usize,
    pub max_len: usize,
    /// Probability a source idles instead of presenting its next beat.
    pub idle_prob: f64,
    /// Probability a sink is ready in a given cycle.
    pub ready_prob: f64,
    /// Probability a frame carries the bad-frame marker on its last beat.
    pub bad_frame_prob: f64,
}

impl Config for TrafficConfig {}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            frames: 64,
            min_len: 1,
            max_len: 8,
            idle_prob: 0.2,
            ready_prob: 0.8,
            bad_frame_prob: 0.0,
        }
    }
}

impl TrafficConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.min_len > 0 && self.min_len <= self.max_len,
            "frame lengths must satisfy 0 < min_len <= max_len"
        );
        for (name, p) in [
            ("idle_prob", self.idle_prob),
            ("ready_prob", self.ready_prob),
            ("bad_frame_prob", self.bad_frame_prob),
        ] {
            ensure!((0.0..=1.0).contains(&p), "{} must be within [0, 1], got {}", name, p);
        }
        ensure!(self.ready_prob > 0.0, "sinks that are never ready cannot drain");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    Fifo,
    AsyncFifo,
    ArbMux,
    Switch,
    RamSwitch,
    Broadcast,
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fifo" => Ok(Self::Fifo),
            "async_fifo" => Ok(Self::AsyncFifo),
            "arb_mux" => Ok(Self::ArbMux),
            "switch" => Ok(Self::Switch),
            "ram_switch" => Ok(Self::RamSwitch),
            "broadcast" => Ok(Self::Broadcast),
            _ => Err(format!(
                "unsupported topology '{}', expected one of: fifo, async_fifo, arb_mux, switch, \
                 ram_switch, broadcast",
                value
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClockConfig {
    pub period_ps: u64,
    pub phase_ps: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period_ps: 1000,
            phase_ps: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FabricConfig {
    pub topology: Topology,
    pub fifo: FifoConfig,
    pub arb_mux: ArbMuxConfig,
    pub switch: SwitchConfig,
    pub ram_switch: RamSwitchConfig,
    pub broadcast: BroadcastConfig,
    /// Write-side clock of the async FIFO topology.
    pub wr_clock: ClockConfig,
    /// Read-side clock of the async FIFO topology.
    pub rd_clock: ClockConfig,
}

impl Config for FabricConfig {}
