pub mod axis;
pub mod base;
pub mod builtin;
pub mod sim;
