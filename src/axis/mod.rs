pub mod address_map;
pub mod arb_mux;
pub mod arbiter;
pub mod async_fifo;
pub mod broadcast;
pub mod crosspoint;
pub mod demux;
pub mod fifo;
pub mod mux;
pub mod ram_switch;
pub mod rate_limit;
pub mod register;
pub mod switch;
pub mod tap;

#[cfg(test)]
mod unit_tests;
