pub mod assembler;
pub mod azure;
pub mod cli;
pub mod config;
pub mod error;
pub mod params;
pub mod preflight;
pub mod state;
