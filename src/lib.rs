//! scanguard
//!
//! Guarded invocation layer for the nmap network scanner: validates untrusted
//! target and option strings against closed allow-lists, runs the scanner as
//! a direct child with a deadline, and decodes its XML report.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod scanner;
pub mod server;
