pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod gate;
pub mod locator;
pub mod logger;
pub mod metrics;
pub mod parser;
pub mod refresh;
pub mod server;
pub mod storage;
pub mod types;
pub mod util;
