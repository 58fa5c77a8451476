//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates a room id: 2-30 characters, lowercase alphanumerics and
/// hyphens, no leading or trailing hyphen.
///
/// Reserved-word exclusion happens at the service layer where the
/// configured set is available.
pub fn validate_room_id(id: &str) -> Result<(), ValidationError> {
    let len = id.chars().count();
    if !(2..=30).contains(&len) {
        let mut err = ValidationError::new("room_id_length");
        err.message = Some(format!("Room id must be 2-30 characters (got {len})").into());
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        let mut err = ValidationError::new("room_id_format");
        err.message =
            Some("Room id must contain only lowercase alphanumerics and hyphens".into());
        return Err(err);
    }

    if id.starts_with('-') || id.ends_with('-') {
        let mut err = ValidationError::new("room_id_hyphen");
        err.message = Some("Room id must not start or end with a hyphen".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a 6-digit numeric PIN.
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("PIN must be exactly 6 digits".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_id_valid() {
        assert!(validate_room_id("ab").is_ok());
        assert!(validate_room_id("friday-night").is_ok());
        assert!(validate_room_id("room42").is_ok());
    }

    #[test]
    fn test_validate_room_id_invalid() {
        assert!(validate_room_id("a").is_err()); // too short
        assert!(validate_room_id(&"x".repeat(31)).is_err()); // too long
        assert!(validate_room_id("Room").is_err()); // uppercase
        assert!(validate_room_id("room_1").is_err()); // underscore
        assert!(validate_room_id("-room").is_err()); // leading hyphen
        assert!(validate_room_id("room-").is_err()); // trailing hyphen
    }

    #[test]
    fn test_validate_pin() {
        assert!(validate_pin("123456").is_ok());
        assert!(validate_pin("12345").is_err());
        assert!(validate_pin("1234567").is_err());
        assert!(validate_pin("12345a").is_err());
    }
}
