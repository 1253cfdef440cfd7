use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+").expect("valid email regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("valid phone regex"));
static PAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid PAN regex"));
static AADHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{12}$").expect("valid Aadhar regex"));

pub fn email(value: &str) -> Result<()> {
    if EMAIL_RE.is_match(value) {
        Ok(())
    } else {
        Err(Error::validation("Invalid email format"))
    }
}

pub fn phone(value: &str) -> Result<()> {
    if PHONE_RE.is_match(value) {
        Ok(())
    } else {
        Err(Error::validation(
            "Invalid phone number format (should be 10 digits)",
        ))
    }
}

pub fn pan(value: &str) -> Result<()> {
    if PAN_RE.is_match(value) {
        Ok(())
    } else {
        Err(Error::validation("Invalid PAN format (should be ABCDE1234F)"))
    }
}

pub fn aadhar(value: &str) -> Result<()> {
    if AADHAR_RE.is_match(value) {
        Ok(())
    } else {
        Err(Error::validation(
            "Invalid Aadhar format (should be 12 digits)",
        ))
    }
}

pub fn amount(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::validation("Invalid amount format"));
    }
    if value <= 0.0 {
        return Err(Error::validation("Amount must be positive"));
    }
    Ok(())
}

pub fn password(value: &str, confirm: &str, min_length: usize) -> Result<()> {
    if value != confirm {
        return Err(Error::validation("Passwords do not match"));
    }
    new_password(value, min_length)
}

pub fn new_password(value: &str, min_length: usize) -> Result<()> {
    if value.chars().count() < min_length {
        return Err(Error::validation(format!(
            "Password must be at least {min_length} characters long"
        )));
    }
    Ok(())
}

/// Fails with one message naming every blank field.
pub fn required(fields: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Please fill in all required fields ({})",
            missing.join(", ")
        )))
    }
}
