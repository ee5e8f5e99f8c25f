pub mod inflight;

pub use inflight::{InflightDraws, InflightGuard};
