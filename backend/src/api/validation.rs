//! Request field validation shared by handlers.
//!
//! Every check returns `AppError::Validation` so handlers can reject a body
//! with `?` before touching the database.

use crate::error::{AppError, Result};

/// Trimmed value of a required string field.
pub(crate) fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

/// A field PATCH may omit but not blank out.
pub(crate) fn optional(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>> {
    match value {
        Some(v) => {
            let v = required(field, Some(v))?;
            max_len(field, v, max)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

/// Reject strings longer than `max` characters.
pub(crate) fn max_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

/// A loose email check: something before `@`, a dot inside the domain.
pub(crate) fn email(field: &str, value: &str) -> Result<()> {
    let valid = match value.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::Validation(format!(
            "{} must be a valid email address",
            field
        )));
    }
    Ok(())
}

/// Lowercase letters, digits and single inner hyphens.
pub(crate) fn slug(value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value.len() <= 100
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
        && !value.contains("--");
    if !valid {
        return Err(AppError::Validation(
            "slug must contain only lowercase letters, digits and hyphens".to_string(),
        ));
    }
    Ok(())
}

/// `#RRGGBB`
pub(crate) fn hex_color(value: &str) -> Result<()> {
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(AppError::Validation(
            "color must be a #RRGGBB hex value".to_string(),
        ));
    }
    Ok(())
}

/// Money and durations can't be negative.
pub(crate) fn non_negative<T: PartialOrd + Default>(field: &str, value: T) -> Result<()> {
    if value < T::default() {
        return Err(AppError::Validation(format!("{} must not be negative", field)));
    }
    Ok(())
}
