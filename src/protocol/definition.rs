//! # Command Definitions
//!
//! Immutable grammar of every device command plus the per-instance state
//! (user value, user arguments) that rides along with it.
//!
//! Definitions are built with `const fn` so the fixed tables in
//! [`registry`](super::registry) are checked at compile time: an empty code,
//! an inverted range or a default outside its range fails const evaluation.

use serde::Serialize;

use super::value::ParameterType;

/// Frame start marker
pub const FRAME_PREFIX: &str = "$";

/// Frame end marker for BlueFlyVario commands, checksum marker for PMTK
pub const FRAME_SUFFIX: &str = "*";

/// Commands starting with this are forwarded to the GPS module
pub const PMTK_PREFIX: &str = "PMTK";

/// PMTK sentences carry their own line terminator
pub const PMTK_LINE_END: &str = "\r\n";

/// Largest value any parameter can store (16-bit firmware settings)
pub const PARAMETER_VALUE_MAX: u16 = u16::MAX;

/// Identity and grammar of one device command
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommandSpec {
    /// Wire token, e.g. `"BFL"` or `"PMTK184,1"`
    pub code: &'static str,

    /// Human readable description
    pub description: &'static str,

    /// Argument text sent when the user supplies none
    pub default_arguments: Option<&'static str>,

    /// Oldest hardware version that understands this command (advisory)
    pub min_hardware_version: Option<u16>,
}

impl CommandSpec {
    /// Create a command without arguments
    ///
    /// # Panics
    ///
    /// Panics (at compile time in a `static`) if `code` or `description` is empty.
    pub const fn new(code: &'static str, description: &'static str) -> Self {
        assert!(!code.is_empty(), "command code must not be empty");
        assert!(!description.is_empty(), "command description must not be empty");

        Self {
            code,
            description,
            default_arguments: None,
            min_hardware_version: None,
        }
    }

    /// Accept free-form arguments, falling back to `arguments`
    pub const fn with_default_arguments(mut self, arguments: &'static str) -> Self {
        self.default_arguments = Some(arguments);
        self
    }

    /// Record the oldest hardware version supporting this command
    pub const fn with_min_hardware_version(mut self, version: u16) -> Self {
        self.min_hardware_version = Some(version);
        self
    }

    /// Whether serialization appends argument text
    pub fn accepts_arguments(&self) -> bool {
        self.default_arguments.is_some()
    }

    /// Whether this is a PMTK sentence for the GPS module
    pub fn is_pmtk(&self) -> bool {
        self.code.starts_with(PMTK_PREFIX)
    }
}

/// A command that carries a typed, range-bounded value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParameterSpec {
    /// Wire identity
    #[serde(flatten)]
    pub command: CommandSpec,

    /// How the stored integer maps to a user value
    pub value_type: ParameterType,

    /// Smallest stored value accepted
    pub min_value: u16,

    /// Largest stored value accepted
    pub max_value: u16,

    /// Scale (`Double`) or offset (`IntOffset`) constant
    pub factor: f64,

    /// Firmware default, in stored units
    pub default_value: Option<u16>,
}

impl ParameterSpec {
    /// Create a parameter definition
    ///
    /// # Panics
    ///
    /// Panics (at compile time in a `static`) if `min_value > max_value`.
    pub const fn new(
        command: CommandSpec,
        value_type: ParameterType,
        min_value: u16,
        max_value: u16,
        factor: f64,
    ) -> Self {
        assert!(min_value <= max_value, "parameter range is inverted");

        Self {
            command,
            value_type,
            min_value,
            max_value,
            factor,
            default_value: None,
        }
    }

    /// Set the firmware default
    ///
    /// # Panics
    ///
    /// Panics (at compile time in a `static`) if `value` is outside the range.
    pub const fn with_default(mut self, value: u16) -> Self {
        assert!(
            value >= self.min_value && value <= self.max_value,
            "default value outside parameter range"
        );
        self.default_value = Some(value);
        self
    }

    /// Whether a stored-domain value lies inside `[min_value, max_value]`
    ///
    /// NaN is never in range.
    pub fn in_range(&self, stored: f64) -> bool {
        f64::from(self.min_value) <= stored && stored <= f64::from(self.max_value)
    }
}

/// Mutable runtime state attached to one command definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandInstance {
    /// Value in stored units; `None` means unset, which is distinct from 0
    pub user_value: Option<u32>,

    /// Argument text overriding the definition's default
    pub user_arguments: Option<String>,
}

impl CommandInstance {
    /// Forget the user value and arguments
    pub fn reset(&mut self) {
        self.user_value = None;
        self.user_arguments = None;
    }
}
