mod config;
mod constants;
mod counts;
mod fault;
mod latency;
mod phase;
mod stats;
mod types;

pub use config::*;
pub use constants::*;
pub use counts::*;
pub use fault::*;
pub use latency::*;
pub use phase::*;
pub use stats::*;
pub use types::*;
