//! HMAC-SHA256 webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Expected header prefix. GitHub sends `sha256=<hex digest>`.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Verifies that `signature_header` is a valid HMAC-SHA256 MAC of `body`
/// under `secret`.
///
/// Returns `false` (never an error) on any malformed input: wrong
/// prefix, non-lowercase-hex digest, wrong digest length, or an empty
/// secret. The digest comparison runs in constant time via
/// [`Mac::verify_slice`]; a variable-time comparison here would leak the
/// expected MAC byte by byte.
///
/// No side effects: neither the secret nor any digest value is logged.
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some(digest_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    // The header digest must be exactly 64 lowercase hex characters.
    // hex::decode would accept uppercase, so check the alphabet first.
    if digest_hex.len() != DIGEST_HEX_LEN
        || !digest_hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }

    let Ok(claimed) = hex::decode(digest_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        // HMAC accepts keys of any length; treat the impossible as a
        // verification failure rather than a panic.
        return false;
    };
    mac.update(body);
    mac.verify_slice(&claimed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Computes the `sha256=<hex>` header value for a body and secret.
    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("any key length works");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    const SECRET: &str = "s3cr3t";
    const BODY: &[u8] = br#"{"action":"opened"}"#;

    #[test]
    fn valid_signature_verifies() {
        let header = sign(BODY, SECRET);
        assert!(verify_signature(BODY, &header, SECRET));
    }

    #[test]
    fn flipped_body_bit_fails() {
        let header = sign(BODY, SECRET);
        let mut tampered = BODY.to_vec();
        tampered[0] ^= 0x01;
        assert!(!verify_signature(&tampered, &header, SECRET));
    }

    #[test]
    fn flipped_secret_bit_fails() {
        let header = sign(BODY, SECRET);
        assert!(!verify_signature(BODY, &header, "t3cr3t"));
    }

    #[test]
    fn altered_digest_byte_fails() {
        let header = sign(BODY, SECRET);
        let mut bytes = header.into_bytes();
        let last = bytes.last_mut().expect("nonempty");
        *last = if *last == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(bytes).expect("ascii");
        assert!(!verify_signature(BODY, &tampered, SECRET));
    }

    #[test]
    fn wrong_prefix_fails() {
        let digest = sign(BODY, SECRET);
        let digest = digest.strip_prefix("sha256=").expect("prefix");
        assert!(!verify_signature(BODY, &format!("sha1={digest}"), SECRET));
        assert!(!verify_signature(BODY, digest, SECRET));
    }

    #[test]
    fn uppercase_hex_fails() {
        let header = sign(BODY, SECRET).to_uppercase();
        let header = format!("sha256={}", header.strip_prefix("SHA256=").expect("prefix"));
        assert!(!verify_signature(BODY, &header, SECRET));
    }

    #[test]
    fn truncated_digest_fails() {
        let header = sign(BODY, SECRET);
        assert!(!verify_signature(BODY, &header[..header.len() - 2], SECRET));
    }

    #[test]
    fn empty_inputs_fail() {
        let header = sign(BODY, SECRET);
        assert!(!verify_signature(BODY, &header, ""));
        assert!(!verify_signature(BODY, "", SECRET));
        assert!(!verify_signature(BODY, "sha256=", SECRET));
    }

    #[test]
    fn empty_body_verifies_against_its_own_mac() {
        let header = sign(b"", SECRET);
        assert!(verify_signature(b"", &header, SECRET));
        assert!(!verify_signature(BODY, &header, SECRET));
    }
}
