pub mod monitor;
pub mod wifi;
