//! Cache keys are stored under the lowercase hex md5 digest of the
//! key string.  The digest only serves as a storage identifier: the
//! 128-bit width makes accidental collisions a design-level
//! impossibility for any realistic entry count, and the fixed-width
//! hex form sorts lexicographically in numeric order, which is what
//! the tree's routing rules rely on.
/// Number of hex characters in a key digest.
pub(crate) const DIGEST_WIDTH: usize = 32;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Returns the lowercase hex digest that identifies `key`'s entry
/// file.
pub(crate) fn key_digest(key: &str) -> String {
    use extendhash::md5;

    let hash = md5::compute_hash(key.as_bytes());
    let mut hex = String::with_capacity(DIGEST_WIDTH);
    for byte in hash.iter() {
        hex.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        hex.push(HEX_DIGITS[(byte & 0xf) as usize] as char);
    }

    hex
}

/// Known md5 answers, from RFC 1321's test suite.
#[test]
fn test_known_digests() {
    assert_eq!(key_digest(""), "d41d8cd98f00b204e9800998ecf8427e");
    assert_eq!(key_digest("abc"), "900150983cd24fb0d6963f7d28e17f72");
    assert_eq!(
        key_digest("message digest"),
        "f96b697d7cb7938d525a2f31aaf161d0"
    );
}

/// Digests are always exactly `DIGEST_WIDTH` lowercase hex characters.
#[test]
fn test_digest_shape() {
    for key in &["", "a", "https://example/a", "\u{1f980} carcinisation"] {
        let digest = key_digest(key);
        assert_eq!(digest.len(), DIGEST_WIDTH);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

/// Distinct keys should get distinct digests.
#[test]
fn test_distinct_keys() {
    assert_ne!(key_digest("https://example/a"), key_digest("https://example/b"));
}
