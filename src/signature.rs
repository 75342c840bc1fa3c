//! HMAC signature verification over a canonical (payload, timestamp) framing.
//!
//! See spec §4.1. No replay/freshness checks here by design; that is left
//! to the downstream anomaly detector.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify `signature_hex` against HMAC-SHA-256(secret, payload || be8(timestamp)).
///
/// Returns `false` on any mismatch, including malformed hex input. There is
/// no distinct error path (spec §4.1: "returns false on mismatch or
/// malformed hex; treated as mismatch").
pub fn verify(payload: &[u8], timestamp_ns: i64, signature_hex: &str, secret: &[u8]) -> bool {
    let expected = compute_tag(payload, timestamp_ns, secret);
    let Ok(given) = hex::decode(signature_hex) else {
        return false;
    };
    constant_time_eq(&expected, &given)
}

/// Compute the raw HMAC-SHA-256 tag for `payload || be8(timestamp)`.
///
/// `timestamp_ns` is reinterpreted as an unsigned 64-bit integer before
/// being encoded big-endian, matching the client's framing. Negative
/// timestamps wrap via two's-complement-to-unsigned reinterpretation.
fn compute_tag(payload: &[u8], timestamp_ns: i64, secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.update(&(timestamp_ns as u64).to_be_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Sign `payload || be8(timestamp)` and hex-encode the tag. Used by tests
/// and by any in-process client harness that needs to construct a valid
/// signature for a fixture event.
pub fn sign(payload: &[u8], timestamp_ns: i64, secret: &[u8]) -> String {
    hex::encode(compute_tag(payload, timestamp_ns, secret))
}

/// Constant-time equality that does not short-circuit on length mismatch:
/// a length mismatch returns `false`, but the comparison still runs over
/// the common prefix, and the length difference is OR'd into the result
/// rather than branching on it early (spec §9 "Constant-time signature
/// compare").
fn constant_time_eq(expected: &[u8], given: &[u8]) -> bool {
    let common = expected.len().min(given.len());
    let prefix_eq: bool = expected[..common].ct_eq(&given[..common]).into();
    let len_eq = expected.len() == given.len();
    prefix_eq & len_eq
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"k";

    #[test]
    fn verify_round_trips_for_valid_signature() {
        let payload = b"A";
        let ts = 1_000_000_000i64;
        let sig = sign(payload, ts, SECRET);
        assert!(verify(payload, ts, &sig, SECRET));
    }

    #[test]
    fn verify_rejects_tampered_signature() {
        let payload = b"A";
        let ts = 1_000_000_000i64;
        let bogus = "de".repeat(32);
        assert!(!verify(payload, ts, &bogus, SECRET));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        let payload = b"A";
        let ts = 1_000_000_000i64;
        assert!(!verify(payload, ts, "not-hex", SECRET));
    }

    #[test]
    fn verify_handles_empty_payload() {
        let payload = b"";
        let ts = 42i64;
        let sig = sign(payload, ts, SECRET);
        assert!(verify(payload, ts, &sig, SECRET));
    }

    #[test]
    fn verify_accepts_negative_timestamp() {
        let payload = b"ping";
        let ts = -1_000_000_000i64;
        let sig = sign(payload, ts, SECRET);
        assert!(verify(payload, ts, &sig, SECRET));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let payload = b"A";
        let ts = 1_000_000_000i64;
        let sig = sign(payload, ts, SECRET);
        assert!(!verify(payload, ts, &sig, b"wrong-key"));
    }

    #[test]
    fn verify_rejects_shorter_signature_without_panicking() {
        let payload = b"A";
        let ts = 1_000_000_000i64;
        let sig = sign(payload, ts, SECRET);
        let truncated = &sig[..sig.len() - 2];
        assert!(!verify(payload, ts, truncated, SECRET));
    }

    #[test]
    fn different_timestamps_change_the_tag() {
        let payload = b"A";
        let sig1 = sign(payload, 1, SECRET);
        let sig2 = sign(payload, 2, SECRET);
        assert_ne!(sig1, sig2);
    }
}
