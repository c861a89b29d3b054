use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::RngCore;

/// Random URL-safe correlation token of exactly `len` characters.
///
/// `len` random bytes are base64url-encoded and the encoding is truncated, so
/// the characters are not uniformly distributed. Only used for non-secret
/// request identifiers (`zx`, the cross-page channel name).
pub fn random_token(len: usize) -> String {
    let mut random = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut random);
    let mut encoded = URL_SAFE.encode(random);
    encoded.truncate(len);
    encoded
}
