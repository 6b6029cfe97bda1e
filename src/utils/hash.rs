// src/utils/hash.rs

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use crate::error::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .to_string();

    Ok(password_hash)
}

/// Checks a login attempt. Accounts created through Google have no stored
/// hash and never match.
pub fn verify_password(password: &str, password_hash: Option<&str>) -> Result<bool, AppError> {
    let Some(password_hash) = password_hash else {
        return Ok(false);
    };

    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Tr1cky-Passw0rd!").unwrap();
        assert!(verify_password("Tr1cky-Passw0rd!", Some(&hash)).unwrap());
        assert!(!verify_password("wrong", Some(&hash)).unwrap());
    }

    #[test]
    fn missing_hash_never_matches() {
        assert!(!verify_password("anything", None).unwrap());
    }
}
