pub mod audit;
pub mod config;
pub mod db;
pub mod fluency;
pub mod logging;
