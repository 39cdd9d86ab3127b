//! Password hashing and strength validation.
//!
//! Hashes use the `pbkdf2_sha256$<iterations>$<salt>$<base64>` encoding, so
//! accounts migrated from an existing deployment keep working.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const ALGORITHM: &str = "pbkdf2_sha256";
const ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 22;
const HASH_LEN: usize = 32;
const MIN_LENGTH: usize = 8;

/// Frequently used passwords rejected outright.
const COMMON_PASSWORDS: &[&str] = &[
    "123456", "12345678", "123456789", "1234567890", "password", "password1", "password123",
    "qwerty", "qwerty123", "abc123", "111111", "123123", "admin", "admin123", "letmein",
    "welcome", "welcome1", "iloveyou", "monkey", "dragon", "football", "baseball", "sunshine",
    "princess", "master", "trustno1", "superman", "passw0rd", "starwars", "whatever",
    "changeme", "administrator", "certificate", "students",
];

/// Checked when no account matches, so unknown usernames cost a full hash.
static DUMMY_ENCODED: LazyLock<String> =
    LazyLock::new(|| hash_password("no account has this password"));

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect();
    encode(password, &salt, ITERATIONS)
}

fn derive(password: &str, salt: &str, iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
    out
}

fn encode(password: &str, salt: &str, iterations: u32) -> String {
    let hash = derive(password, salt, iterations);
    format!("{ALGORITHM}${iterations}${salt}${}", STANDARD.encode(hash))
}

/// Check a password against an encoded hash. Malformed encodings never match.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(stored)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if algorithm != ALGORITHM {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let Ok(stored) = STANDARD.decode(stored) else {
        return false;
    };

    let candidate = derive(password, salt, iterations);
    candidate.as_slice().ct_eq(stored.as_slice()).into()
}

/// [`hash_password`] on the blocking pool, keeping PBKDF2 off the async
/// worker threads.
pub async fn hash_in_background(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("password hashing task failed: {e}"))
}

/// [`verify_password`] on the blocking pool. With no stored hash a dummy
/// hash is checked and the result is always `false`.
pub async fn verify_in_background(password: String, encoded: Option<String>) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || match encoded {
        Some(encoded) => verify_password(&password, &encoded),
        None => {
            let _ = verify_password(&password, &DUMMY_ENCODED);
            false
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("password check task failed: {e}"))
}

/// Run every password validator, collecting all failures.
pub fn validate_password(password: &str, username: &str, email: &str) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_LENGTH} characters."
        ));
    }

    let lowered = password.to_lowercase();
    let email_local = email.split('@').next().unwrap_or_default();
    for (attribute, label) in [(username, "username"), (email_local, "email address")] {
        let attribute = attribute.trim().to_lowercase();
        if attribute.chars().count() < 3 || lowered.is_empty() {
            continue;
        }
        if lowered.contains(&attribute) || attribute.contains(&lowered) {
            problems.push(format!("The password is too similar to the {label}."));
        }
    }

    if COMMON_PASSWORDS.contains(&lowered.trim()) {
        problems.push("This password is too common.".to_string());
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}
