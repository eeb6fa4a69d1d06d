//! # Command Registry
//!
//! The fixed command and parameter tables of the BlueFlyVario firmware, and
//! the per-session store of user values attached to them.
//!
//! The tables are `static` and sorted by name; [`Registry`] pairs every
//! definition with its own [`CommandInstance`] and indexes parameters by wire
//! code so bulk `BST`/`SET` settings dumps can be applied.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::definition::{CommandInstance, CommandSpec, ParameterSpec};
use super::encoder::serialize;
use super::value::{ParameterType, UserValue};
use crate::error::{BfvError, Result};

use super::value::ParameterType::{Boolean, Double, Int, IntOffset};

/// Commands (actions without a persisted value), sorted by name
pub static COMMANDS: [(&str, CommandSpec); 14] = [
    ("eraseLocus", CommandSpec::new("PMTK184,1", "Erase Locus")),
    ("getSettings", CommandSpec::new("BST", "Get Settings")),
    ("getTemp", CommandSpec::new("TMP", "Get Temperature")),
    (
        "playSound",
        CommandSpec::new("BSD", "Play Sound").with_default_arguments("800 500 400 500"),
    ),
    ("queryLocus", CommandSpec::new("PMTK183", "Query Locus")),
    ("queryLocusData", CommandSpec::new("PMTK622,0", "Query Locus Data")),
    ("reset", CommandSpec::new("RST", "Simple Reset")),
    ("restoreDefaults", CommandSpec::new("RSX", "Reset and restore default settings")),
    (
        "setBluetoothName",
        CommandSpec::new("RNC SN,", "Set bluetooth name(max 16 characters)")
            .with_min_hardware_version(12)
            .with_default_arguments("BlueFly-"),
    ),
    ("simulateButton", CommandSpec::new("BTN", "Simulate Button Press")),
    ("sleep", CommandSpec::new("SLP", "Go To Sleep")),
    ("sleepNoWake", CommandSpec::new("SLX", "Sleep - No UART wake")),
    ("volumeDown", CommandSpec::new("BVD", "Volume Down (/2)")),
    ("volumeUp", CommandSpec::new("BVU", "Volume Up (x2)")),
];

/// Build a parameter table entry
const fn param(
    code: &'static str,
    description: &'static str,
    min_hardware_version: u16,
    value_type: ParameterType,
    range: (u16, u16),
    factor: f64,
    default_value: u16,
) -> ParameterSpec {
    ParameterSpec::new(
        CommandSpec::new(code, description).with_min_hardware_version(min_hardware_version),
        value_type,
        range.0,
        range.1,
        factor,
    )
    .with_default(default_value)
}

/// Parameters (typed, range-bounded settings), sorted by name
#[rustfmt::skip]
pub static PARAMETERS: [(&str, ParameterSpec); 33] = [
    ("buzzerThreshold", param("BZT", "Value in m/s below the liftThreshold when the buzzer will start.", 10, Double, (0, 1000), 100.0, 40)),
    ("gpsLogInterval", param("BGL", "GPS Log for XA1110", 12, Int, (0, 65535), 1.0, 10)),
    ("greenLED", param("BLD", "Make green LED flash with beep", 9, Boolean, (0, 1), 1.0, 1)),
    ("heightSeconds", param("BHT", "Idle timeout", 10, Int, (0, 65535), 1.0, 600)),
    ("heightSensitivityDm", param("BHV", "How far you have to move in dm to reset the idle timeout", 10, Int, (0, 65535), 1.0, 20)),
    // Hardware version 99 keeps it out of version-filtered listings
    ("isPrintPressure", param("BFP", "Controls if the output is printed. It is equivalent to outputMode=4 (or at least it was in some earlier version of the firmware)", 99, Boolean, (0, 1), 1.0, 1)),
    ("liftFreqBase", param("BFQ", "Audio frequency for lift beeps in Hz of 0 m/s.", 6, Int, (500, 2000), 1.0, 1000)),
    ("liftFreqIncrement", param("BFI", "Increase in audio frequency for lift beeps in Hz for each 1 m/s.", 6, Int, (0, 1000), 1.0, 100)),
    ("liftOffThreshold", param("BOL", "Value in m/s of lift when the audio beeping will stop.", 6, Double, (0, 1000), 100.0, 5)),
    ("liftThreshold", param("BFL", "Value in m/s of lift when the audio beeping will start.", 6, Double, (0, 1000), 100.0, 20)),
    ("outputFrequency", param("BOF", "Output frequency divisor -> 1-every 20ms ... 50-every 20ms*50=1000ms", 7, Int, (1, 50), 1.0, 1)),
    ("outputMode", param("BOM", "Output mode -> 0-BlueFlyVario(default), 1-LK8EX1, 2-LX, 3-FlyNet, 4-None, 5-BFVlib, 6-BFX, 7-OpenVario", 7, Int, (0, 7), 1.0, 0)),
    ("outputQNH", param("BQH", "QNH (in Pascals), used for hardware output alt for some output modes - (default 101325)", 7, IntOffset, (0, 65535), 80000.0, 21325)),
    ("positionNoise", param("BFK", "Kalman filter position noise.", 6, Double, (10, 10000), 1000.0, 100)),
    ("quietStart", param("BQS", "Quiet the startup beeps", 12, Boolean, (0, 1), 1.0, 0)),
    ("rateMultiplier", param("BRM", "Lift beep cadence -> 0.5 = beeping twice as fast as normal.", 6, Double, (10, 1000), 100.0, 100)),
    ("secondsBluetoothWait", param("BTH", "Time that the hardware will be allow establishment of a bluetooth connection for when turned on.", 6, Int, (0, 10000), 1.0, 180)),
    ("sinkFreqBase", param("BSQ", "Audio frequency for the sink tone in Hz of 0 m/s.", 6, Int, (250, 1000), 1.0, 400)),
    ("sinkFreqIncrement", param("BSI", "Decrease in audio frequency for sink tone in Hz for each -1 m/s.", 6, Int, (0, 1000), 1.0, 100)),
    ("sinkOffThreshold", param("BOS", "Value in -m/s of sink when the sink tone will stop.", 6, Double, (0, 1000), 100.0, 5)),
    ("sinkThreshold", param("BFS", "Value in -m/s of sink when the sink tone will start.", 6, Double, (0, 1000), 100.0, 20)),
    ("speedMultiplier", param("BSM", "Sensitivity of cadence to vertical speed -> 2.0 = cadence changes slower than normal.", 10, Double, (10, 1000), 100.0, 100)),
    ("startDelayMS", param("BDM", "Delay ms at start", 12, Int, (0, 65535), 1.0, 0)),
    ("toggleThreshold", param("BTT", "Value in m/s below or above which will auto turn the button audio toggle off", 11, Double, (0, 1000), 100.0, 100)),
    ("uart1BRG", param("BRB", "BRG setting for UART1, baud = 2000000/(BRG-1) (default of 207 = approx 9600 baud)", 8, Int, (0, 65535), 1.0, 207)),
    ("uart1Raw", param("BUR", "Make U1 data transferred raw instead of line by line", 9, Boolean, (0, 1), 1.0, 0)),
    ("uart2BRG", param("BR2", "BRG setting for UART2, baud = 2000000/(BRG-1) (default of 16 = approx 115.2k baud)", 9, Int, (0, 65535), 1.0, 16)),
    ("uartPassthrough", param("BPT", "Pass data received by U2 into U1", 9, Boolean, (0, 1), 1.0, 1)),
    ("useAudioBuzzer", param("BBZ", "Use the experimental audio buzzer", 10, Boolean, (0, 1), 1.0, 0)),
    ("useAudioWhenConnected", param("BAC", "Enable hardware audio when connected.", 6, Boolean, (0, 1), 1.0, 0)),
    ("useAudioWhenDisconnected", param("BAD", "Enable hardware audio when disconnected.", 6, Boolean, (0, 1), 1.0, 1)),
    ("usePitot", param("BUP", "Use the experimental MS4525DO pitot connected via I2C", 11, Boolean, (0, 1), 1.0, 0)),
    ("volume", param("BVL", "Volume of beeps ->  0.1 is only about 1/2 as loud as 1.0.", 6, Double, (1, 1000), 1000.0, 1000)),
];

/// A named command and its user arguments
#[derive(Debug, Clone)]
pub struct Command {
    name: &'static str,
    spec: &'static CommandSpec,
    instance: CommandInstance,
}

impl Command {
    fn new(name: &'static str, spec: &'static CommandSpec) -> Self {
        Self {
            name,
            spec,
            instance: CommandInstance::default(),
        }
    }

    /// Registry name, e.g. `"playSound"`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Immutable definition
    pub fn spec(&self) -> &'static CommandSpec {
        self.spec
    }

    /// Arguments set by the user, if any
    pub fn arguments(&self) -> Option<&str> {
        self.instance.user_arguments.as_deref()
    }

    /// Override the default arguments
    pub fn set_arguments(&mut self, arguments: impl Into<String>) {
        self.instance.user_arguments = Some(arguments.into());
    }

    /// Fall back to the default arguments
    pub fn clear_arguments(&mut self) {
        self.instance.user_arguments = None;
    }

    /// Serialize into a wire frame
    pub fn serialize(&self) -> Result<String> {
        serialize(self.spec, &self.instance)
    }

    /// Store `arguments` as the user arguments, then serialize
    pub fn serialize_with_arguments(&mut self, arguments: impl Into<String>) -> Result<String> {
        self.set_arguments(arguments);
        self.serialize()
    }
}

/// A named parameter and its current value
#[derive(Debug, Clone)]
pub struct Parameter {
    name: &'static str,
    spec: &'static ParameterSpec,
    instance: CommandInstance,
}

impl Parameter {
    fn new(name: &'static str, spec: &'static ParameterSpec) -> Self {
        Self {
            name,
            spec,
            instance: CommandInstance::default(),
        }
    }

    /// Registry name, e.g. `"liftThreshold"`
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Immutable definition
    pub fn spec(&self) -> &'static ParameterSpec {
        self.spec
    }

    /// Current value in stored units, `None` when unset
    pub fn value(&self) -> Option<u32> {
        self.instance.user_value
    }

    /// Whether a value is set
    pub fn has_value(&self) -> bool {
        self.instance.user_value.is_some()
    }

    /// Set the value from a user-facing number or flag
    ///
    /// The value is converted into stored units and must land inside
    /// `[min_value, max_value]`. On failure nothing changes.
    ///
    /// # Returns
    ///
    /// * `bool` - `true` if the value was stored
    ///
    /// # Examples
    ///
    /// ```
    /// use bfv_link::protocol::registry::Registry;
    ///
    /// let mut registry = Registry::new();
    /// let lift = registry.parameter_mut("liftThreshold").unwrap();
    ///
    /// assert!(lift.set_value(0.2));
    /// assert_eq!(lift.value(), Some(20));
    /// assert!(!lift.set_value(10.5)); // 1050 > 1000
    /// assert_eq!(lift.value(), Some(20));
    /// ```
    pub fn set_value<V: Into<UserValue>>(&mut self, value: V) -> bool {
        let spec = self.spec;
        let stored = spec.value_type.to_stored(value.into().as_f64(), spec.factor);

        if !spec.in_range(stored) {
            debug!(
                "Rejected {} = {} (outside {}..={})",
                self.name, stored, spec.min_value, spec.max_value
            );
            return false;
        }

        // Range check above guarantees 0..=65535, truncation matches the firmware
        self.instance.user_value = Some(stored as u32);
        true
    }

    /// Set the value from text typed by a user
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - value stored
    /// * `Ok(false)` - number outside the range, nothing changed
    ///
    /// # Errors
    ///
    /// Returns [`BfvError::InvalidNumber`] if `text` is not a decimal number.
    pub fn set_value_str(&mut self, text: &str) -> Result<bool> {
        let trimmed = text.trim();
        let number: f64 = trimmed
            .parse()
            .map_err(|e| BfvError::invalid_number(trimmed, e))?;
        Ok(self.set_value(number))
    }

    /// Set the value reported by the device
    ///
    /// Device values are already in stored units and are not range checked;
    /// only negative (or oversized) values are refused.
    pub fn set_from_parsed(&mut self, raw: i64) -> bool {
        match u32::try_from(raw) {
            Ok(value) => {
                self.instance.user_value = Some(value);
                true
            }
            Err(_) => false,
        }
    }

    /// Make the value unset
    pub fn reset_value(&mut self) {
        self.instance.user_value = None;
    }

    /// Current value in user units, `None` when unset
    pub fn value_as_string(&self) -> Option<String> {
        self.instance
            .user_value
            .map(|v| self.spec.value_type.format_stored(v, self.spec.factor))
    }

    /// Firmware default in user units, `None` if there is no default
    pub fn default_value_as_string(&self) -> Option<String> {
        self.spec
            .default_value
            .map(|v| self.spec.value_type.format_stored(u32::from(v), self.spec.factor))
    }

    /// Serialize into a wire frame (`$<code> <value>*` when set)
    pub fn serialize(&self) -> Result<String> {
        serialize(&self.spec.command, &self.instance)
    }
}

/// All commands and parameters with their session state
#[derive(Debug, Clone)]
pub struct Registry {
    commands: Vec<Command>,
    parameters: Vec<Parameter>,
    parameter_index_by_code: HashMap<&'static str, usize>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry with every value unset
    pub fn new() -> Self {
        let commands = COMMANDS
            .iter()
            .map(|(name, spec)| Command::new(*name, spec))
            .collect();

        let parameters: Vec<Parameter> = PARAMETERS
            .iter()
            .map(|(name, spec)| Parameter::new(*name, spec))
            .collect();

        let parameter_index_by_code = parameters
            .iter()
            .enumerate()
            .map(|(index, p)| (p.spec.command.code, index))
            .collect();

        Self {
            commands,
            parameters,
            parameter_index_by_code,
        }
    }

    /// Commands ordered by name
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Parameters ordered by name
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Look up a command by name
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands
            .binary_search_by_key(&name, |c| c.name)
            .ok()
            .map(|i| &self.commands[i])
    }

    /// Look up a command by name for modification
    pub fn command_mut(&mut self, name: &str) -> Option<&mut Command> {
        match self.commands.binary_search_by_key(&name, |c| c.name) {
            Ok(i) => Some(&mut self.commands[i]),
            Err(_) => None,
        }
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .binary_search_by_key(&name, |p| p.name)
            .ok()
            .map(|i| &self.parameters[i])
    }

    /// Look up a parameter by name for modification
    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        match self.parameters.binary_search_by_key(&name, |p| p.name) {
            Ok(i) => Some(&mut self.parameters[i]),
            Err(_) => None,
        }
    }

    /// Resolve a wire code (`"BFL"`) to its parameter name (`"liftThreshold"`)
    pub fn parameter_name_for_code(&self, code: &str) -> Option<&'static str> {
        self.parameter_index_by_code
            .get(code)
            .map(|&i| self.parameters[i].name)
    }

    /// Look up a parameter by wire code for modification
    pub fn parameter_by_code_mut(&mut self, code: &str) -> Option<&mut Parameter> {
        let index = *self.parameter_index_by_code.get(code)?;
        Some(&mut self.parameters[index])
    }

    /// Serialize the command or parameter registered under `name`
    ///
    /// # Errors
    ///
    /// Returns [`BfvError::UnknownCommand`] if the name is not registered.
    pub fn serialize(&self, name: &str) -> Result<String> {
        if let Some(command) = self.command(name) {
            return command.serialize();
        }
        if let Some(parameter) = self.parameter(name) {
            return parameter.serialize();
        }
        Err(BfvError::UnknownCommand(name.to_string()))
    }

    /// Make every parameter value unset
    pub fn reset_parameter_values(&mut self) {
        for parameter in &mut self.parameters {
            parameter.reset_value();
        }
    }

    /// Definitions of every command and parameter, for printing
    pub fn listing(&self) -> Listing {
        Listing {
            commands: self
                .commands
                .iter()
                .map(|c| ListingEntry { name: c.name, spec: c.spec })
                .collect(),
            parameters: self
                .parameters
                .iter()
                .map(|p| ListingEntry { name: p.name, spec: p.spec })
                .collect(),
        }
    }
}

/// Serializable view of the command and parameter tables
#[derive(Debug, Serialize)]
pub struct Listing {
    pub commands: Vec<ListingEntry<CommandSpec>>,
    pub parameters: Vec<ListingEntry<ParameterSpec>>,
}

/// One named definition in a [`Listing`]
#[derive(Debug, Serialize)]
pub struct ListingEntry<T: 'static> {
    pub name: &'static str,
    #[serde(flatten)]
    pub spec: &'static T,
}
