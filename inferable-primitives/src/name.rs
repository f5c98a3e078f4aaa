//! Validation rules shared by service and function names.

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 64;

/// Validates a service name.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] if the name is empty, too long, or contains
/// characters other than ASCII alphanumerics, `_`, `-` and `.`.
pub fn validate_service_name(name: &str) -> Result<()> {
    validate_identifier("service", name)
}

/// Validates a function name.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] under the same rules as
/// [`validate_service_name`].
pub fn validate_function_name(name: &str) -> Result<()> {
    validate_identifier("function", name)
}

fn validate_identifier(kind: &'static str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidName {
            kind,
            name: name.into(),
            reason: "name cannot be empty".into(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName {
            kind,
            name: name.into(),
            reason: format!("name length must be <= {MAX_NAME_LEN}"),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidName {
            kind,
            name: name.into(),
            reason: "name must contain ASCII alphanumeric, dash, underscore, or dot".into(),
        });
    }

    Ok(())
}
