// Credential round-trip laws and format boundaries

use penshort::auth::{generate_key, hash_key, parse_key, quick_digest, verify_key, KeyEnv};

#[test]
fn generated_keys_parse_and_verify() {
    let generated = generate_key(KeyEnv::Live).unwrap();

    let parsed = parse_key(&generated.plaintext).unwrap();
    assert_eq!(parsed.env, KeyEnv::Live);
    assert_eq!(parsed.prefix, generated.prefix);
    assert_eq!(parsed.prefix.len(), 6);
    assert_eq!(parsed.secret.len(), 32);

    // verify(plaintext, hash(plaintext)) = true
    assert!(verify_key(&generated.plaintext, &generated.key_hash).unwrap());
}

#[test]
fn verify_rejects_other_plaintexts() {
    let a = generate_key(KeyEnv::Test).unwrap();
    let b = generate_key(KeyEnv::Test).unwrap();

    // verify(x, hash(y)) = false for x != y
    assert!(!verify_key(&a.plaintext, &b.key_hash).unwrap());
    assert!(!verify_key(&b.plaintext, &a.key_hash).unwrap());
}

#[test]
fn format_deviations_reject_as_unauthorized() {
    let cases = [
        "pk_live_abc12_0123456789abcdef0123456789abcdef",  // short prefix
        "pk_live_abc1234_0123456789abcdef0123456789abcdef", // long prefix
        "pk_staging_abc123_0123456789abcdef0123456789abcdef", // bad env
        "pk_live_ABC123_0123456789abcdef0123456789abcdef", // uppercase prefix
        "pk_live_abc123_0123456789ABCDEF0123456789abcdef", // uppercase secret
        "pklive_abc123_0123456789abcdef0123456789abcdef",  // missing separator
        "pk_live_abc123_0123456789abcdef0123456789abcde",  // short secret
        "",
        "Bearer pk_live_abc123_0123456789abcdef0123456789abcdef",
    ];
    for bad in cases {
        assert!(parse_key(bad).is_err(), "accepted {:?}", bad);
    }
}

#[test]
fn verifier_encodes_its_parameters() {
    let hash = hash_key("pk_test_abc123_0123456789abcdef0123456789abcdef").unwrap();

    // PHC string is self-describing: algorithm, version, m/t/p, salt, hash
    assert!(hash.starts_with("$argon2id$v=19$"));
    assert!(hash.contains("m=65536"));
    assert!(hash.contains("t=3"));
    assert!(hash.contains("p=4"));
}

#[test]
fn quick_digest_is_stable_and_key_bound() {
    let key = "pk_test_abc123_0123456789abcdef0123456789abcdef";
    let digest = quick_digest(key);

    assert_eq!(digest.len(), 32);
    assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(digest, quick_digest(key));

    // A single flipped character moves the digest
    let other = "pk_test_abc123_0123456789abcdef0123456789abcdee";
    assert_ne!(digest, quick_digest(other));
}

#[test]
fn distinct_generations_never_collide() {
    let a = generate_key(KeyEnv::Test).unwrap();
    let b = generate_key(KeyEnv::Test).unwrap();
    assert_ne!(a.plaintext, b.plaintext);
    assert_ne!(a.key_hash, b.key_hash);
}
