use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "mashgate-timestamp";
pub const SIGNATURE_HEADER: &str = "mashgate-signature";

/// Maximum tolerated clock skew between the gateway and us, in milliseconds.
pub const MAX_SKEW_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("malformed timestamp")]
    BadTimestamp,
    #[error("timestamp outside tolerance")]
    SkewExceeded,
    #[error("malformed signature")]
    BadSignature,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify the HMAC-SHA256 over `timestamp + "." + raw_body`. The signature
/// header carries `v1=<hex>`; the timestamp header is milliseconds since the
/// epoch. Comparison happens inside the MAC verifier, in constant time.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now_ms: i64,
) -> Result<(), SignatureError> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    if (now_ms - ts).abs() > MAX_SKEW_MS {
        return Err(SignatureError::SkewExceeded);
    }

    let hex_sig = signature
        .strip_prefix("v1=")
        .ok_or(SignatureError::BadSignature)?;
    let expected = hex::decode(hex_sig).map_err(|_| SignatureError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::BadSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Test/client helper: produce the `v1=<hex>` value for a payload.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    format!("v1={}", hex::encode(mac.finalize().into_bytes()))
}
