use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};

use super::error::TenancyError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate and hash a password chosen at invitation acceptance (Argon2id, PHC string).
pub(crate) fn hash_password(password: &str) -> Result<String, TenancyError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(TenancyError::validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| TenancyError::validation(format!("password rejected: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{PasswordHash, PasswordVerifier};

    #[test]
    fn hashes_verify_against_the_original_password() {
        let hash = hash_password("correct horse").expect("hash succeeds");
        let parsed = PasswordHash::new(&hash).expect("phc string");
        assert!(Argon2::default()
            .verify_password(b"correct horse", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong horse", &parsed)
            .is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(matches!(
            hash_password("short"),
            Err(TenancyError::Validation(_))
        ));
    }
}
