use rand::{rngs::OsRng, RngCore};

const RESET_TOKEN_BYTES: usize = 32;

/// 32 bytes from the OS CSPRNG, hex-encoded (64 chars, URL-safe as is).
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn reset_link(base_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        base_url.trim_end_matches('/'),
        token
    )
}

/// Equality that takes the same time for every pair of equal-length inputs.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
