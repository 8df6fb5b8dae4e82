// src/models/mod.rs

pub mod exam_result;
pub mod identity;
pub mod participant;
pub mod question;
pub mod room;

/// Rejects empty and whitespace-only strings.
pub fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("must_not_be_blank"));
    }
    Ok(())
}
