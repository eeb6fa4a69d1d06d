//! # Telemetry Module
//!
//! Inbound side of the BlueFlyVario protocol.
//!
//! This module handles:
//! - Decoding the line oriented output (`PRS`, `TMP`, `BAT`, `BFV`, `BST`, `SET`)
//! - Tracking which values changed since they were last read
//! - Applying settings dumps to the parameter store
//! - Decoding GPS log dumps (`$PMTKLOX`) into raw and CSV files

pub mod decoder;
pub mod locus;
