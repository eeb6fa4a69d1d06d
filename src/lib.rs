//! # bfv-link Library
//!
//! Talk to a BlueFlyVario altimeter/variometer over a serial line.
//!
//! The library serializes device commands and parameter writes into the
//! vario's ASCII command grammar (including PMTK sentences for the GPS
//! module), and decodes the telemetry lines it prints back into typed,
//! change tracked state.

pub mod config;
pub mod error;
pub mod protocol;
pub mod serial;
pub mod telemetry;
