pub mod queue;
pub mod register_slice;
