use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    Valid,
    /// Matched a pre-hashing plaintext value; caller should re-hash.
    ValidLegacy,
    Invalid,
}

impl PasswordCheck {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

fn argon2() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored: &str) -> Result<PasswordCheck> {
    if !stored.starts_with("$argon2") {
        return Ok(if constant_time_eq(password.as_bytes(), stored.as_bytes()) {
            PasswordCheck::ValidLegacy
        } else {
            PasswordCheck::Invalid
        });
    }

    let parsed_hash =
        PasswordHash::new(stored).map_err(|e| anyhow!("Invalid password hash format: {e}"))?;
    if parsed_hash.salt.is_none() || parsed_hash.hash.is_none() {
        return Err(anyhow!("Stored password hash is missing its salt or output"));
    }

    match argon2().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(PasswordCheck::Valid),
        Err(argon2::password_hash::Error::Password) => Ok(PasswordCheck::Invalid),
        Err(e) => Err(anyhow!("Password verification failed: {e}")),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn generate_secure_password(length: usize) -> String {
    use rand::Rng;

    const CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";
    let mut rng = rand::rng();
    (0..length.max(12))
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(verify_password("correct horse", &hash).unwrap(), PasswordCheck::Valid);
        assert_eq!(verify_password("wrong", &hash).unwrap(), PasswordCheck::Invalid);
    }

    #[test]
    fn test_legacy_plaintext() {
        assert_eq!(verify_password("admin123", "admin123").unwrap(), PasswordCheck::ValidLegacy);
        assert_eq!(verify_password("admin12", "admin123").unwrap(), PasswordCheck::Invalid);
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("x", "$argon2id$garbage").is_err());
        assert!(verify_password("x", "$argon2id$v=19$m=x").is_err());

        let hash = hash_password("correct horse").unwrap();
        let truncated = &hash[..hash.rfind('$').unwrap()];
        assert!(verify_password("correct horse", truncated).is_err());
    }

    #[test]
    fn test_generated_password_length() {
        assert_eq!(generate_secure_password(4).len(), 12);
        assert_eq!(generate_secure_password(20).len(), 20);
    }
}
