use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Calculate the base64-encoded HMAC-SHA256 signature over `data`.
///
/// This matches the signature scheme the payment provider uses for webhook bodies, so the same
/// function serves both verification and test fixtures.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    base64::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hmac_is_stable_and_key_dependent() {
        let sig = calculate_hmac("webhook-secret", b"{\"status\":\"DONE\"}");
        assert_eq!(sig, calculate_hmac("webhook-secret", b"{\"status\":\"DONE\"}"));
        assert_ne!(sig, calculate_hmac("other-secret", b"{\"status\":\"DONE\"}"));
        assert_ne!(sig, calculate_hmac("webhook-secret", b"{\"status\":\"FAILED\"}"));
    }
}
