pub mod clock;
pub mod config;
pub mod driver;
pub mod log;
pub mod top;
pub mod trace;
