//! Bearer-token handling shared by the server and the operator CLI.

use secrecy::SecretString;
use sha2::{Digest, Sha256};

/// Extracts the raw token from an `Authorization` header value.
/// Both `Bearer <token>` and `Token <token>` are accepted.
pub fn parse_authorization_header(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    let known_scheme =
        scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");

    (known_scheme && !token.is_empty()).then_some(token)
}

pub fn hash_token(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const TOKEN_LEN: usize = 64;

/// Generates a fresh alphanumeric token of [`TOKEN_LEN`] characters.
pub fn generate_token() -> SecretString {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let raw: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect();
    raw.into()
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::{generate_token, hash_token, parse_authorization_header, TOKEN_LEN};

    #[test]
    fn parses_bearer_and_token_schemes() {
        assert_eq!(parse_authorization_header("Bearer abc123"), Some("abc123"));
        assert_eq!(parse_authorization_header("token  abc123 "), Some("abc123"));
        assert_eq!(parse_authorization_header("Basic abc123"), None);
        assert_eq!(parse_authorization_header("Bearer "), None);
        assert_eq!(parse_authorization_header("abc123"), None);
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        let digest = hash_token("secret");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("secret"));
        assert_ne!(digest, hash_token("secret2"));
    }

    #[test]
    fn generated_tokens_are_unique() {
        let first = generate_token();
        let second = generate_token();
        assert_eq!(first.expose_secret().len(), TOKEN_LEN);
        assert!(first.expose_secret().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first.expose_secret(), second.expose_secret());
    }
}
