//! Library side of `mtop`, the resource usage viewer for the metrics server

pub mod client;
pub mod commands;
pub mod config;
pub mod output;
