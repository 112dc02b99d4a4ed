pub mod beat;
pub mod behavior;
pub mod module;
pub mod port;
pub mod status;
