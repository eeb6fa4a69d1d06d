//! # Command Encoder
//!
//! Serializes a command definition and its instance state into a wire frame.

use super::checksum::{format_checksum, pmtk_checksum};
use super::definition::*;
use crate::error::{BfvError, Result};

/// Serialize a command into the frame sent to the instrument
///
/// Exactly one branch applies, in this priority order:
///
/// 1. PMTK code: `$<code>*<checksum>\r\n`
/// 2. Command with arguments: `$<code> <user or default arguments>*`
/// 3. Value set: `$<code> <stored value>*`
/// 4. Otherwise: `$<code>*`
///
/// # Arguments
///
/// * `spec` - Command definition
/// * `instance` - User value and arguments
///
/// # Returns
///
/// * `Result<String>` - Frame ready for the transport
///
/// # Errors
///
/// Returns [`BfvError::Checksum`] if the PMTK checksum cannot be computed;
/// no frame must be transmitted then.
///
/// # Examples
///
/// ```
/// use bfv_link::protocol::definition::{CommandInstance, CommandSpec};
/// use bfv_link::protocol::encoder::serialize;
///
/// let spec = CommandSpec::new("BST", "Get Settings");
/// let frame = serialize(&spec, &CommandInstance::default())?;
/// assert_eq!(frame, "$BST*");
/// # Ok::<(), bfv_link::error::BfvError>(())
/// ```
pub fn serialize(spec: &CommandSpec, instance: &CommandInstance) -> Result<String> {
    if spec.is_pmtk() {
        return encode_pmtk(spec.code);
    }

    let frame = if let Some(default_arguments) = spec.default_arguments {
        let arguments = instance.user_arguments.as_deref().unwrap_or(default_arguments);
        format!("{}{} {}{}", FRAME_PREFIX, spec.code, arguments, FRAME_SUFFIX)
    } else if let Some(value) = instance.user_value {
        // The stored integer goes on the wire, never the display value
        format!("{}{} {}{}", FRAME_PREFIX, spec.code, value, FRAME_SUFFIX)
    } else {
        format!("{}{}{}", FRAME_PREFIX, spec.code, FRAME_SUFFIX)
    };

    Ok(frame)
}

/// Encode a PMTK sentence with its checksum and line terminator
fn encode_pmtk(code: &str) -> Result<String> {
    let checksum = pmtk_checksum(code).ok_or_else(|| BfvError::Checksum {
        code: code.to_string(),
    })?;

    Ok(format!(
        "{}{}{}{}{}",
        FRAME_PREFIX,
        code,
        FRAME_SUFFIX,
        format_checksum(checksum),
        PMTK_LINE_END
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_value(value: u32) -> CommandInstance {
        CommandInstance {
            user_value: Some(value),
            user_arguments: None,
        }
    }

    #[test]
    fn test_plain_command() {
        let spec = CommandSpec::new("BVU", "Volume Up (x2)");
        assert_eq!(serialize(&spec, &CommandInstance::default()).unwrap(), "$BVU*");
    }

    #[test]
    fn test_pmtk_command() {
        let spec = CommandSpec::new("PMTK184,1", "Erase Locus");
        assert_eq!(serialize(&spec, &CommandInstance::default()).unwrap(), "$PMTK184,1*22\r\n");

        let spec = CommandSpec::new("PMTK183", "Query Locus");
        assert_eq!(serialize(&spec, &CommandInstance::default()).unwrap(), "$PMTK183*38\r\n");
    }

    #[test]
    fn test_pmtk_ignores_value_and_arguments() {
        let spec = CommandSpec::new("PMTK622,0", "Query Locus Data");
        let instance = CommandInstance {
            user_value: Some(5),
            user_arguments: Some("ignored".to_string()),
        };
        assert_eq!(serialize(&spec, &instance).unwrap(), "$PMTK622,0*28\r\n");
    }

    #[test]
    fn test_pmtk_checksum_failure() {
        let spec = CommandSpec::new("PMTK$183", "broken");
        let result = serialize(&spec, &CommandInstance::default());
        match result {
            Err(BfvError::Checksum { code }) => assert_eq!(code, "PMTK$183"),
            other => panic!("Expected Checksum error, got: {:?}", other),
        }
    }

    #[test]
    fn test_default_arguments() {
        let spec = CommandSpec::new("BSD", "Play Sound").with_default_arguments("800 500 400 500");
        assert_eq!(
            serialize(&spec, &CommandInstance::default()).unwrap(),
            "$BSD 800 500 400 500*"
        );
    }

    #[test]
    fn test_user_arguments_override_default() {
        let spec =
            CommandSpec::new("RNC SN,", "Set bluetooth name").with_default_arguments("BlueFly-");
        let instance = CommandInstance {
            user_value: None,
            user_arguments: Some("MyVario".to_string()),
        };
        assert_eq!(serialize(&spec, &instance).unwrap(), "$RNC SN, MyVario*");
    }

    #[test]
    fn test_arguments_take_priority_over_value() {
        let spec = CommandSpec::new("BSD", "Play Sound").with_default_arguments("800 500 400 500");
        assert_eq!(serialize(&spec, &with_value(3)).unwrap(), "$BSD 800 500 400 500*");
    }

    #[test]
    fn test_value_is_sent_in_stored_units() {
        let spec = CommandSpec::new("BFL", "Lift threshold");
        assert_eq!(serialize(&spec, &with_value(20)).unwrap(), "$BFL 20*");
        assert_eq!(serialize(&spec, &with_value(0)).unwrap(), "$BFL 0*");
    }
}
