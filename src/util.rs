use std::time::{SystemTime, UNIX_EPOCH};

use argon2::{
    Argon2,
    password_hash::{
        self, rand_core::OsRng,
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
};
use chrono::{DateTime, SecondsFormat, Utc};
use rand::{
    thread_rng, Rng,
    distributions::Uniform,
};


const JOIN_CODE_CHARS: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const JOIN_CODE_LENGTH: usize = 6;


pub fn generate_join_code() -> String {
    let pick = Uniform::new(0, JOIN_CODE_CHARS.len());

    thread_rng()
        .sample_iter(pick)
        .take(JOIN_CODE_LENGTH)
        .map(|i| JOIN_CODE_CHARS[i] as char)
        .collect()
}

/// Argon2id hash in PHC format, with a fresh salt for every call.
pub fn hash_password(pwd: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(pwd.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// A stored hash that can't be parsed never verifies.
pub fn verify_password(pwd: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(pwd.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!("Unreadable password hash: {}", err);
            false
        },
    }
}

pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn join_code_shape() {
        for _ in 0..32 {
            let code = generate_join_code();
            assert_eq!(code.len(), JOIN_CODE_LENGTH);
            assert!(code.bytes().all(|b| JOIN_CODE_CHARS.contains(&b)));
        }
    }

    #[test]
    fn password_verifies_against_its_hash() {
        let hash = hash_password("hunter22").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
    }

    #[test]
    fn every_hash_gets_its_own_salt() {
        let first = hash_password("hunter22").unwrap();
        let second = hash_password("hunter22").unwrap();

        assert_ne!(first, second);
        assert!(verify_password("hunter22", &first));
        assert!(verify_password("hunter22", &second));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("hunter22", "not-a-phc-string"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn time_formats() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 0);
        assert_eq!(unix_secs(time), 1_700_000_000);
        assert_eq!(rfc3339(time), "2023-11-14T22:13:20Z");
    }
}
