/// Credential Verifier
///
/// One-way password hashing with bcrypt. Verification never distinguishes
/// a wrong password from a corrupt stored digest: both are a mismatch.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};

/// bcrypt silently truncates longer input, so anything past this is refused.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Hash a password using bcrypt
///
/// # Errors
/// - `Validation(EmptyField)` if the password is empty or whitespace-only
/// - `Validation(TooLong)` if the password exceeds 72 bytes
/// - `Internal` if bcrypt itself fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash_password_with_cost(password, DEFAULT_COST)
}

pub(crate) fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AppError> {
    if password.trim().is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField(
            "password".to_string(),
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_BYTES,
        )));
    }

    hash(password, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its stored bcrypt digest.
///
/// bcrypt compares digests in constant time. A digest that cannot be
/// parsed is reported as a mismatch, never as an error. Input over 72
/// bytes can never have been hashed, so it never matches.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    if password.len() > MAX_PASSWORD_BYTES {
        return false;
    }
    match verify(password, password_hash) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password digest could not be verified");
            false
        }
    }
}
