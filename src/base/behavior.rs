/// Per-edge evaluation of a clocked module. One edge runs `drive` on every module of the clock
/// domain, then `settle` until nothing changes, then `tick_one` on every module.
pub trait ModuleBehaviors {
    /// Publish registered outputs onto ports. Must only depend on registered state.
    fn drive(&mut self);

    /// Refine combinational outputs from what other modules drove this cycle.
    /// Returns true if any output changed.
    fn settle(&mut self) -> bool {
        false
    }

    /// Sample ports, compute the next state and commit it. Must not write ports.
    fn tick_one(&mut self);

    fn reset(&mut self);
}

pub trait Parameterizable {
    type ConfigType;

    fn conf(&self) -> &Self::ConfigType;
}
