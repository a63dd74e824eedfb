pub mod advancement;
pub mod banks;
pub mod challenge;
pub mod config;
pub mod curriculum;
pub mod engine;
pub mod fraction;
pub mod problem;
pub mod proficiency;
pub mod progress;
pub mod session;
pub mod types;

pub use config::EngineConfig;
pub use engine::{EngineError, FluencyEngine};
#[allow(unused_imports)]
pub use types::*;
