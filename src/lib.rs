pub mod audit;
pub mod dag;
pub mod errors;
pub mod gates;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod primer_config;
pub mod tracker;
pub mod ui;
