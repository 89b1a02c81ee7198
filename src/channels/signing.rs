//! HMAC-SHA256 webhook signatures.
//!
//! The signed message is `"{timestamp}.{body}"` where `timestamp` is the
//! exact value sent in the timestamp header. The header value is `sha256=`
//! followed by the lowercase hex digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ChannelError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str, timestamp: &str, body: &str) -> Result<HmacSha256, ChannelError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ChannelError::InvalidSigningKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(mac)
}

/// Compute the signature header value for a delivery
pub fn sign_payload(secret: &str, timestamp: &str, body: &str) -> Result<String, ChannelError> {
    let mac = mac_for(secret, timestamp, body)?;
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a received signature header in constant time
pub fn verify_signature(secret: &str, timestamp: &str, body: &str, header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    match mac_for(secret, timestamp, body) {
        Ok(mac) => mac.verify_slice(&expected).is_ok(),
        Err(_) => false,
    }
}
