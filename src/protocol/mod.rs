//! # BlueFlyVario Command Protocol
//!
//! Outbound side of the BlueFlyVario ASCII protocol.
//!
//! This module handles:
//! - Command and parameter definitions (`$BFL 20*`, `$BST*`, ...)
//! - Typed value conversion and range validation
//! - Frame serialization, including PMTK sentences for the GPS module
//! - PMTK XOR checksum calculation

pub mod checksum;
pub mod definition;
pub mod encoder;
pub mod registry;
pub mod value;
