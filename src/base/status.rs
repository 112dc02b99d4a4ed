use std::ops::AddAssign;

use serde::Serialize;

/// Status events raised during one clock edge. Synchronous components raise at most one of each
/// per edge; the read side of an async FIFO may report several that crossed together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameStatus {
    pub overflow: u32,
    pub bad_frame: u32,
    pub good_frame: u32,
}

impl FrameStatus {
    pub fn is_idle(&self) -> bool {
        self.overflow == 0 && self.bad_frame == 0 && self.good_frame == 0
    }
}

/// Running totals of [FrameStatus] events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounters {
    pub overflow: u64,
    pub bad_frame: u64,
    pub good_frame: u64,
}

impl AddAssign<FrameStatus> for StatusCounters {
    fn add_assign(&mut self, status: FrameStatus) {
        self.overflow += status.overflow as u64;
        self.bad_frame += status.bad_frame as u64;
        self.good_frame += status.good_frame as u64;
    }
}

impl AddAssign for StatusCounters {
    fn add_assign(&mut self, other: StatusCounters) {
        self.overflow += other.overflow;
        self.bad_frame += other.bad_frame;
        self.good_frame += other.good_frame;
    }
}
