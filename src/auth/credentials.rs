// API key material: format, generation, verifier, quick digest
//
// Plaintext shape: `pk_{env}_{prefix}_{secret}` where env is live|test,
// prefix is 6 lower hex chars and secret is 32 lower hex chars. The
// plaintext exists only at generation and in the Authorization header;
// storage keeps an Argon2id verifier over the full plaintext.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::domain::{PenshortError, Result};

static KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pk_(live|test)_([0-9a-f]{6})_([0-9a-f]{32})$").unwrap());

/// Argon2id parameters: 64 MiB, t=3, p=4, 32-byte output
fn hasher() -> Argon2<'static> {
    let params = Params::new(64 * 1024, 3, 4, Some(32)).expect("valid argon2 params");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

/// Key environment tag carried in the plaintext
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnv {
    Live,
    Test,
}

impl KeyEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
        }
    }
}

/// Parsed components of a presented key
#[derive(Debug, Clone)]
pub struct ParsedKey {
    pub env: KeyEnv,
    pub prefix: String,
    pub secret: String,
}

/// Parse and shape-validate a presented plaintext key
pub fn parse_key(plaintext: &str) -> Result<ParsedKey> {
    let caps = KEY_RE
        .captures(plaintext)
        .ok_or_else(|| PenshortError::unauthorized("invalid API key format"))?;

    let env = match &caps[1] {
        "live" => KeyEnv::Live,
        _ => KeyEnv::Test,
    };

    Ok(ParsedKey {
        env,
        prefix: caps[2].to_string(),
        secret: caps[3].to_string(),
    })
}

/// Freshly generated key: the plaintext (shown once) plus storage fields
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub plaintext: String,
    pub prefix: String,
    pub key_hash: String,
}

/// Generate a key for the given environment and hash it for storage
pub fn generate_key(env: KeyEnv) -> Result<GeneratedKey> {
    let mut prefix_bytes = [0u8; 3];
    let mut secret_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut prefix_bytes);
    OsRng.fill_bytes(&mut secret_bytes);

    let prefix = hex::encode(prefix_bytes);
    let secret = hex::encode(secret_bytes);
    let plaintext = format!("pk_{}_{}_{}", env.as_str(), prefix, secret);
    let key_hash = hash_key(&plaintext)?;

    Ok(GeneratedKey {
        plaintext,
        prefix,
        key_hash,
    })
}

/// Produce the PHC-encoded Argon2id verifier for a plaintext
pub fn hash_key(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| PenshortError::internal(format!("hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Constant-time verification of a plaintext against a stored verifier.
/// The PHC string carries its own parameters; an unsupported version is a
/// dedicated error so operators can tell rehash-needed from wrong-key.
pub fn verify_key(plaintext: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| PenshortError::internal(format!("malformed stored hash: {}", e)))?;

    if parsed.algorithm != argon2::ARGON2ID_IDENT {
        return Err(PenshortError::IncompatibleHashVersion);
    }

    match hasher().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PenshortError::internal(format!("verification failed: {}", e))),
    }
}

/// First 16 bytes of SHA-256, hex. Cache-key derivation only; never an
/// authenticator.
pub fn quick_digest(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_key() {
        let parsed = parse_key("pk_live_a1b2c3_0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(parsed.env, KeyEnv::Live);
        assert_eq!(parsed.prefix, "a1b2c3");
        assert_eq!(parsed.secret.len(), 32);
    }

    #[test]
    fn test_parse_rejects_deviations() {
        for bad in [
            "",
            "pk_live_a1b2c3",
            "pk_prod_a1b2c3_0123456789abcdef0123456789abcdef",
            "pk_live_A1B2C3_0123456789abcdef0123456789abcdef",
            "pk_live_a1b2c3_0123456789abcdef0123456789abcde",
            "sk_live_a1b2c3_0123456789abcdef0123456789abcdef",
            "pk_live_a1b2c3_0123456789abcdef0123456789abcdef ",
        ] {
            assert!(parse_key(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_generate_round_trips() {
        let generated = generate_key(KeyEnv::Test).unwrap();
        let parsed = parse_key(&generated.plaintext).unwrap();
        assert_eq!(parsed.env, KeyEnv::Test);
        assert_eq!(parsed.prefix, generated.prefix);

        assert!(verify_key(&generated.plaintext, &generated.key_hash).unwrap());
        assert!(!verify_key(
            "pk_test_ffffff_00000000000000000000000000000000",
            &generated.key_hash
        )
        .unwrap());
    }

    #[test]
    fn test_verifier_is_salted() {
        let h1 = hash_key("pk_test_a1b2c3_0123456789abcdef0123456789abcdef").unwrap();
        let h2 = hash_key("pk_test_a1b2c3_0123456789abcdef0123456789abcdef").unwrap();
        assert_ne!(h1, h2);
        assert!(h1.starts_with("$argon2id$"));
    }

    #[test]
    fn test_incompatible_hash_version() {
        // bcrypt-shaped verifier must not silently fail verification
        let err = verify_key(
            "pk_test_a1b2c3_0123456789abcdef0123456789abcdef",
            "$2b$12$abcdefghijklmnopqrstuvabcdefghijklmnopqrstuvabcdefghi",
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_quick_digest_shape() {
        let d = quick_digest("pk_test_a1b2c3_0123456789abcdef0123456789abcdef");
        assert_eq!(d.len(), 32); // 16 bytes hex-encoded
        assert_eq!(d, quick_digest("pk_test_a1b2c3_0123456789abcdef0123456789abcdef"));
        assert_ne!(d, quick_digest("pk_test_a1b2c3_0123456789abcdef0123456789abcdee"));
    }
}
