use std::sync::Arc;

use anyhow::ensure;
use serde::{Deserialize, Serialize};

use crate::base::beat::{Beat, BeatFormat};
use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{Master, Port, Slave};
use crate::builtin::register_slice::{RegType, RegisterSlice};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub format: BeatFormat,
    pub rate_num: u32,
    pub rate_denom: u32,
    /// Only pause between frames.
    pub rate_by_frame: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            format: BeatFormat::default(),
            rate_num: 1,
            rate_denom: 1,
            rate_by_frame: false,
        }
    }
}

fn check_rate(num: u32, denom: u32) -> anyhow::Result<()> {
    ensure!(
        num > 0 && num <= denom,
        "rate must satisfy 0 < num <= denom, got {}/{}",
        num,
        denom
    );
    Ok(())
}

#[derive(Debug)]
pub struct RateLimitState {
    num: u32,
    denom: u32,
    acc: u32,
    mid_frame: bool,
    input: RegisterSlice<Beat>,
    output: RegisterSlice<Beat>,
}

impl RateLimitState {
    fn paused(&self, by_frame: bool) -> bool {
        self.acc >= self.denom && !(by_frame && self.mid_frame)
    }
}

/// Passes at most `rate_num` beats per `rate_denom` cycles on average. The accumulator gains
/// `denom - num` per forwarded beat and drains by `num` per idle cycle; forwarding pauses while it
/// is at or above `denom`.
pub struct RateLimiter {
    base: ModuleBase<RateLimitState, RateLimitConfig>,
    pub s_axis: Port<Slave>,
    pub m_axis: Port<Master>,
}

impl RateLimiter {
    pub fn new(name: &str, config: Arc<RateLimitConfig>) -> anyhow::Result<Self> {
        config.format.validate()?;
        check_rate(config.rate_num, config.rate_denom)?;
        let state = RateLimitState {
            num: config.rate_num,
            denom: config.rate_denom,
            acc: 0,
            mid_frame: false,
            input: RegisterSlice::new(RegType::Skid),
            output: RegisterSlice::new(RegType::Skid),
        };
        Ok(RateLimiter {
            base: ModuleBase::new(name, config, state),
            s_axis: Port::new(),
            m_axis: Port::new(),
        })
    }

    /// Change the rate at runtime; the accumulator is kept.
    pub fn set_rate(&mut self, num: u32, denom: u32) -> anyhow::Result<()> {
        check_rate(num, denom)?;
        self.base.state.num = num;
        self.base.state.denom = denom;
        Ok(())
    }

    pub fn rate(&self) -> (u32, u32) {
        (self.base.state.num, self.base.state.denom)
    }
}

module!(RateLimiter, RateLimitState, RateLimitConfig, "axis_rate_limit",);

impl ModuleBehaviors for RateLimiter {
    fn drive(&mut self) {
        let state = &self.base.state;
        self.s_axis.set_ready(state.input.ready());
        self.m_axis.drive(state.output.output().cloned());
    }

    fn tick_one(&mut self) {
        let conf = Arc::clone(&self.base.config);
        let state = &mut self.base.state;

        let moved = if !state.paused(conf.rate_by_frame) && state.output.ready() {
            state.input.output().cloned()
        } else {
            None
        };
        match &moved {
            Some(beat) => {
                state.acc = state.acc.saturating_add(state.denom - state.num);
                state.mid_frame = !beat.last;
            }
            None => state.acc = state.acc.saturating_sub(state.num),
        }
        let forwarded = moved.is_some();
        state.output.tick(moved, self.m_axis.ready());
        let fired = self.s_axis.take_fired().map(|b| conf.format.conform(&b));
        state.input.tick(fired, forwarded);
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let conf = &self.base.config;
        let state = &mut self.base.state;
        state.num = conf.rate_num;
        state.denom = conf.rate_denom;
        state.acc = 0;
        state.mid_frame = false;
        state.input.reset();
        state.output.reset();
    }
}
