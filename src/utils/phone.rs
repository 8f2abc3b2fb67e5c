use crate::error::{AppError, AppResult};
use regex::Regex;

/// Delivery contact numbers must be Vietnamese: either 0xxxxxxxxx or
/// +84xxxxxxxxx with nine digits after the prefix.
pub fn validate_vn_phone(phone: &str) -> AppResult<()> {
    let phone_regex = Regex::new(r"^(\+84|0)\d{9}$").unwrap();

    if !phone_regex.is_match(phone) {
        return Err(AppError::ValidationError(
            "Invalid phone number, expected 0xxxxxxxxx or +84xxxxxxxxx".to_string(),
        ));
    }

    Ok(())
}
