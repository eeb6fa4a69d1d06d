//! # Telemetry Line Decoder
//!
//! Decodes the space separated lines the BlueFlyVario prints in its default
//! output mode and keeps the last known device state.
//!
//! | Line | Meaning |
//! |------|---------|
//! | `PRS 18BCD` | Pressure in Pa (hex), converted to altitude against QNH |
//! | `TMP 215` | Temperature in 0.1 °C |
//! | `BAT 1004` | Battery in mV (hex) |
//! | `BFV 12 1` | Hardware version `12.1` |
//! | `BST BFK BFL ...` | Settings codes |
//! | `SET 0 100 20 ...` | Settings values; the first one is the reset flag |
//!
//! ## Change notification
//!
//! Every decoded field raises a changed flag. Reading the field through its
//! accessor clears the flag again, so a poller sees each update once:
//!
//! ```
//! use bfv_link::telemetry::decoder::TelemetryDecoder;
//! use bfv_link::telemetry::locus::LocusDecoder;
//!
//! let mut decoder = TelemetryDecoder::new(LocusDecoder::with_output_dir("logs"));
//! decoder.decode_line("TMP 100")?;
//!
//! assert!(decoder.is_temperature_changed());
//! assert_eq!(decoder.temperature(), 10.0);
//! assert!(!decoder.is_temperature_changed());
//! # Ok::<(), bfv_link::error::BfvError>(())
//! ```

use tracing::{debug, trace};

use super::locus::{LocusDecoder, LocusEvent};
use crate::error::{BfvError, Result};
use crate::protocol::registry::Registry;

/// Standard sea level pressure in Pa
pub const DEFAULT_QNH_PA: f64 = 101_325.0;

/// Barometric formula: `h = 44330 * (1 - (p / qnh)^0.190295)`
const ALTITUDE_SCALE_M: f64 = 44_330.0;
const ALTITUDE_EXPONENT: f64 = 0.190295;

/// Lines starting with this belong to the GPS module
const PMTK_LINE_PREFIX: &str = "$PMTK";

/// Last known state of the device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    /// Pressure reference for altitude, Pa
    pub qnh: f64,

    /// Altitude in meters, NaN until known
    pub altitude: f64,

    /// Temperature in °C, NaN until known
    pub temperature: f64,

    /// Battery in V, NaN until known
    pub battery: f64,

    /// Hardware version, empty until known
    pub hardware_version: String,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            qnh: DEFAULT_QNH_PA,
            altitude: f64::NAN,
            temperature: f64::NAN,
            battery: f64::NAN,
            hardware_version: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChangeFlags {
    altitude: bool,
    temperature: bool,
    battery: bool,
    hardware_version: bool,
    parameters: bool,
}

/// What a line changed
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// New altitude in meters
    Altitude(f64),
    /// Pressure line produced the same altitude as before
    AltitudeUnchanged,
    /// Hardware version string
    HardwareVersion(String),
    /// Temperature in °C
    Temperature(f64),
    /// Battery in V
    Battery(f64),
    /// Settings codes stored, with their count
    ParameterKeys(usize),
    /// Settings values received; `applied` is false when they could not be
    /// matched with the codes
    ParameterValues {
        /// Whether the parameter store was updated
        applied: bool,
    },
    /// GPS log sentence
    Locus(LocusEvent),
    /// Known status message without data
    Chatter,
    /// Unknown or too short line
    Ignored,
}

/// Stateful decoder for lines coming from the vario
#[derive(Debug)]
pub struct TelemetryDecoder {
    snapshot: DeviceSnapshot,
    changed: ChangeFlags,
    parameter_keys: Option<Vec<String>>,
    parameter_values: Option<Vec<i64>>,
    registry: Registry,
    locus: LocusDecoder,
}

impl TelemetryDecoder {
    /// Create a decoder with an unknown device state
    ///
    /// # Arguments
    ///
    /// * `locus` - Receives the `$PMTKLOX` GPS log sentences
    pub fn new(locus: LocusDecoder) -> Self {
        Self {
            snapshot: DeviceSnapshot::default(),
            changed: ChangeFlags::default(),
            parameter_keys: None,
            parameter_values: None,
            registry: Registry::new(),
            locus,
        }
    }

    /// Decode one line from the device
    ///
    /// # Arguments
    ///
    /// * `line` - One line, with or without its line end
    ///
    /// # Returns
    ///
    /// * `Result<Decoded>` - What the line changed
    ///
    /// # Errors
    ///
    /// Returns error if a number in a recognized line cannot be parsed, or if
    /// the GPS log decoder fails. The field concerned keeps its old value.
    pub fn decode_line(&mut self, line: &str) -> Result<Decoded> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.starts_with(PMTK_LINE_PREFIX) {
            return self.locus.decode_line(line).map(Decoded::Locus);
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            trace!("Ignoring short line: {:?}", line);
            return Ok(Decoded::Ignored);
        }

        match tokens[0] {
            "PRS" => self.decode_pressure(tokens[1]),
            "BFV" => Ok(self.decode_hardware_version(&tokens)),
            "TMP" => self.decode_temperature(tokens[1]),
            "BAT" => self.decode_battery(tokens[1]),
            "BST" => Ok(self.store_parameter_keys(&tokens[1..])),
            "SET" => self.store_parameter_values(&tokens[1..]),
            // MS5611: sensor calibration dump, Batt: battery in mV,
            // No: "No movement from ...", Audio: "Audio and Buzzer Toggle Off",
            // Bluetooth: "Bluetooth Connected", Shutdown...: power off
            "MS5611" | "Batt" | "No" | "Audio" | "Bluetooth" | "Shutdown..." => {
                Ok(Decoded::Chatter)
            }
            other => {
                trace!("Ignoring unknown line type {}", other);
                Ok(Decoded::Ignored)
            }
        }
    }

    fn decode_pressure(&mut self, token: &str) -> Result<Decoded> {
        let pressure = parse_hex(token)? as f64;
        let ratio = pressure / self.snapshot.qnh;
        let altitude = ALTITUDE_SCALE_M * (1.0 - ratio.powf(ALTITUDE_EXPONENT));

        // NaN never compares equal, so the first reading always counts
        if altitude == self.snapshot.altitude {
            return Ok(Decoded::AltitudeUnchanged);
        }

        self.snapshot.altitude = altitude;
        self.changed.altitude = true;
        Ok(Decoded::Altitude(altitude))
    }

    fn decode_hardware_version(&mut self, tokens: &[&str]) -> Decoded {
        let version = if tokens.len() > 2 {
            format!("{}.{}", tokens[1], tokens[2])
        } else {
            tokens[1].to_string()
        };

        debug!("Hardware version {}", version);
        self.snapshot.hardware_version = version.clone();
        self.changed.hardware_version = true;
        Decoded::HardwareVersion(version)
    }

    fn decode_temperature(&mut self, token: &str) -> Result<Decoded> {
        let tenths: f64 = token.parse().map_err(|e| BfvError::invalid_number(token, e))?;
        let temperature = tenths / 10.0;

        self.snapshot.temperature = temperature;
        self.changed.temperature = true;
        Ok(Decoded::Temperature(temperature))
    }

    fn decode_battery(&mut self, token: &str) -> Result<Decoded> {
        let battery = parse_hex(token)? as f64 / 1000.0;

        self.snapshot.battery = battery;
        self.changed.battery = true;
        Ok(Decoded::Battery(battery))
    }

    fn store_parameter_keys(&mut self, codes: &[&str]) -> Decoded {
        debug!("Received {} settings codes", codes.len());
        self.parameter_keys = Some(codes.iter().map(|c| c.to_string()).collect());
        Decoded::ParameterKeys(codes.len())
    }

    /// `values[0]` is the reset flag the firmware sets after `$RSX*`, skipped
    fn store_parameter_values(&mut self, values: &[&str]) -> Result<Decoded> {
        if self.parameter_keys.is_none() {
            debug!("Settings values before settings codes, request them with $BST*");
            return Ok(Decoded::ParameterValues { applied: false });
        }

        let parsed = values
            .iter()
            .skip(1)
            .map(|v| v.parse::<i64>().map_err(|e| BfvError::invalid_number(v, e)))
            .collect::<Result<Vec<_>>>()?;

        self.parameter_values = Some(parsed);
        Ok(Decoded::ParameterValues {
            applied: self.reconcile_parameters(),
        })
    }

    /// Apply the settings dump to the parameter store
    ///
    /// Codes and values are matched by position. Does nothing unless both are
    /// present with the same length.
    fn reconcile_parameters(&mut self) -> bool {
        let (Some(keys), Some(values)) = (&self.parameter_keys, &self.parameter_values) else {
            return false;
        };

        if keys.len() != values.len() {
            debug!(
                "Settings dump has {} codes but {} values, not applied",
                keys.len(),
                values.len()
            );
            return false;
        }

        for (code, &value) in keys.iter().zip(values) {
            match self.registry.parameter_by_code_mut(code) {
                Some(parameter) => {
                    if !parameter.set_from_parsed(value) {
                        debug!("Device sent invalid value {} for {}", value, code);
                    }
                }
                None => debug!("Unknown settings code {}", code),
            }
        }

        self.changed.parameters = true;
        true
    }

    /// Forget everything learned from the device
    ///
    /// Clears the settings buffers, the snapshot fields (except QNH) and every
    /// parameter value. Pending changed flags are kept.
    pub fn reset_all_values(&mut self) {
        self.parameter_keys = None;
        self.parameter_values = None;
        self.snapshot = DeviceSnapshot {
            qnh: self.snapshot.qnh,
            ..DeviceSnapshot::default()
        };
        self.registry.reset_parameter_values();
    }

    /// Set the pressure reference (Pa) used for altitude
    pub fn set_qnh(&mut self, qnh: f64) {
        self.snapshot.qnh = qnh;
    }

    /// Pressure reference (Pa)
    pub fn qnh(&self) -> f64 {
        self.snapshot.qnh
    }

    /// Altitude in meters; clears the altitude changed flag
    pub fn altitude(&mut self) -> f64 {
        self.changed.altitude = false;
        self.snapshot.altitude
    }

    /// Temperature in °C; clears the temperature changed flag
    pub fn temperature(&mut self) -> f64 {
        self.changed.temperature = false;
        self.snapshot.temperature
    }

    /// Battery in V; clears the battery changed flag
    pub fn battery(&mut self) -> f64 {
        self.changed.battery = false;
        self.snapshot.battery
    }

    /// Hardware version; clears the hardware version changed flag
    pub fn hardware_version(&mut self) -> &str {
        self.changed.hardware_version = false;
        &self.snapshot.hardware_version
    }

    /// Whether the altitude changed since the last [`altitude`](Self::altitude) call
    pub fn is_altitude_changed(&self) -> bool {
        self.changed.altitude
    }

    /// Whether the temperature changed since the last read
    pub fn is_temperature_changed(&self) -> bool {
        self.changed.temperature
    }

    /// Whether the battery changed since the last read
    pub fn is_battery_changed(&self) -> bool {
        self.changed.battery
    }

    /// Whether the hardware version changed since the last read
    pub fn is_hardware_version_changed(&self) -> bool {
        self.changed.hardware_version
    }

    /// Whether a settings dump was applied since the last call; clears the flag
    pub fn take_parameters_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed.parameters)
    }

    /// Copy of the device state; changed flags are not touched
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.clone()
    }

    /// Parameter store
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parameter store, for setting values before serializing them
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// GPS log decoder
    pub fn locus_mut(&mut self) -> &mut LocusDecoder {
        &mut self.locus
    }
}

/// Parse a hexadecimal token such as `18BCD`
fn parse_hex(token: &str) -> Result<i64> {
    i64::from_str_radix(token, 16).map_err(|e| BfvError::invalid_number(token, e))
}
