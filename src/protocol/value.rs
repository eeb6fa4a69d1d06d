//! # Parameter Values
//!
//! Conversion between the values a user works with and the integers the
//! instrument stores.
//!
//! | Type | Stored -> displayed | User -> stored |
//! |------|---------------------|----------------|
//! | `Int` | `v` | `x` |
//! | `Double` | `v / factor` | `x * factor` |
//! | `IntOffset` | `v + factor` | `x - factor` |
//! | `Boolean` | `v != 0` | `0` or `1` |
//! | `IntList` | `v` | `x` |

use serde::Serialize;

/// Value type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParameterType {
    /// Plain integer
    Int,
    /// Fixed point: stored value is the real value multiplied by the factor
    Double,
    /// Offset: stored value is the real value minus the factor
    IntOffset,
    /// Zero is false, anything else is true
    Boolean,
    /// Reserved by the firmware, no current parameter uses it
    IntList,
}

impl ParameterType {
    /// Render a stored integer as the user-facing value
    pub fn format_stored(self, stored: u32, factor: f64) -> String {
        match self {
            ParameterType::Int | ParameterType::IntList => stored.to_string(),
            // Debug keeps the trailing ".0" for whole numbers
            ParameterType::Double => format!("{:?}", f64::from(stored) / factor),
            ParameterType::IntOffset => ((f64::from(stored) + factor) as i64).to_string(),
            ParameterType::Boolean => (stored != 0).to_string(),
        }
    }

    /// Convert a user-facing value into the stored domain
    ///
    /// The result is not rounded or range checked; callers check the range
    /// first and truncate afterwards.
    pub fn to_stored(self, value: f64, factor: f64) -> f64 {
        match self {
            ParameterType::Int | ParameterType::IntList => value,
            ParameterType::Double => value * factor,
            ParameterType::IntOffset => value - factor,
            ParameterType::Boolean => {
                if value == 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }
}

/// A value supplied by the user for a parameter write
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserValue {
    /// Whole number in user units
    Int(i64),
    /// Real number in user units
    Double(f64),
    /// Flag
    Bool(bool),
}

impl UserValue {
    /// Numeric view used by the conversion table
    pub fn as_f64(self) -> f64 {
        match self {
            UserValue::Int(v) => v as f64,
            UserValue::Double(v) => v,
            UserValue::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl From<i32> for UserValue {
    fn from(v: i32) -> Self {
        UserValue::Int(i64::from(v))
    }
}

impl From<i64> for UserValue {
    fn from(v: i64) -> Self {
        UserValue::Int(v)
    }
}

impl From<u16> for UserValue {
    fn from(v: u16) -> Self {
        UserValue::Int(i64::from(v))
    }
}

impl From<u32> for UserValue {
    fn from(v: u32) -> Self {
        UserValue::Int(i64::from(v))
    }
}

impl From<f64> for UserValue {
    fn from(v: f64) -> Self {
        UserValue::Double(v)
    }
}

impl From<bool> for UserValue {
    fn from(v: bool) -> Self {
        UserValue::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_int() {
        assert_eq!(ParameterType::Int.format_stored(1000, 1.0), "1000");
        assert_eq!(ParameterType::IntList.format_stored(7, 1.0), "7");
    }

    #[test]
    fn test_format_double() {
        assert_eq!(ParameterType::Double.format_stored(20, 100.0), "0.2");
        assert_eq!(ParameterType::Double.format_stored(1000, 1000.0), "1.0");
        assert_eq!(ParameterType::Double.format_stored(0, 100.0), "0.0");
    }

    #[test]
    fn test_format_int_offset() {
        assert_eq!(ParameterType::IntOffset.format_stored(21325, 80000.0), "101325");
        assert_eq!(ParameterType::IntOffset.format_stored(0, 80000.0), "80000");
    }

    #[test]
    fn test_format_boolean() {
        assert_eq!(ParameterType::Boolean.format_stored(0, 1.0), "false");
        assert_eq!(ParameterType::Boolean.format_stored(1, 1.0), "true");
        assert_eq!(ParameterType::Boolean.format_stored(5, 1.0), "true");
    }

    #[test]
    fn test_to_stored() {
        assert_eq!(ParameterType::Int.to_stored(42.0, 1.0), 42.0);
        assert_eq!(ParameterType::Double.to_stored(0.5, 100.0), 50.0);
        assert_eq!(ParameterType::IntOffset.to_stored(101325.0, 80000.0), 21325.0);
        assert_eq!(ParameterType::Boolean.to_stored(0.0, 1.0), 0.0);
        assert_eq!(ParameterType::Boolean.to_stored(-3.0, 1.0), 1.0);
    }

    #[test]
    fn test_double_round_trip_exact_values() {
        // Values that are exact in binary survive the store/display cycle
        for (x, factor) in [(0.5, 100.0), (0.25, 100.0), (1.0, 1000.0), (2.0, 100.0)] {
            let stored = ParameterType::Double.to_stored(x, factor) as u32;
            let shown: f64 = ParameterType::Double
                .format_stored(stored, factor)
                .parse()
                .unwrap();
            assert_eq!(shown, x);
        }
    }

    #[test]
    fn test_user_value_conversions() {
        assert_eq!(UserValue::from(8).as_f64(), 8.0);
        assert_eq!(UserValue::from(8.5).as_f64(), 8.5);
        assert_eq!(UserValue::from(true).as_f64(), 1.0);
        assert_eq!(UserValue::from(false).as_f64(), 0.0);
        assert_eq!(UserValue::from(65535u16), UserValue::Int(65535));
    }
}
