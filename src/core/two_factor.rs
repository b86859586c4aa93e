//! Time-based one-time passwords
//!
//! SHA1, 6 digits, 30 second step, one step of clock skew either way. These
//! are the parameters authenticator apps assume when only a secret is shared.

use base32::Alphabet;
use rand::Rng;
use totp_rs::{Algorithm, TOTP};

use crate::types::WalletError;

const SECRET_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const SECRET_LENGTH: usize = 32;

/// Generate a fresh RFC4648 base32 secret
pub fn generate_secret() -> String {
    let mut rng = rand::rng();
    (0..SECRET_LENGTH)
        .map(|_| SECRET_CHARSET[rng.random_range(0..SECRET_CHARSET.len())] as char)
        .collect()
}

fn totp(secret: &str) -> Result<TOTP, WalletError> {
    let bytes = base32::decode(Alphabet::RFC4648 { padding: false }, secret.trim())
        .ok_or_else(|| WalletError::invalid_field("secret", "not valid base32"))?;
    TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes)
        .map_err(|e| WalletError::invalid_field("secret", &e.to_string()))
}

/// Check `code` against `secret` at `unix_time`
///
/// # Errors
///
/// Returns `InvalidField` if the secret is malformed. A wrong code is
/// `Ok(false)`.
pub fn verify(secret: &str, code: &str, unix_time: u64) -> Result<bool, WalletError> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Ok(false);
    }
    Ok(totp(secret)?.check(code, unix_time))
}

/// Code valid at `unix_time`
pub fn code_at(secret: &str, unix_time: u64) -> Result<String, WalletError> {
    Ok(totp(secret)?.generate(unix_time))
}

/// `otpauth://` URI for enrolling the secret in an authenticator app
pub fn provisioning_uri(issuer: &str, account: &str, secret: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";
    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.bytes().all(|b| SECRET_CHARSET.contains(&b)));
        assert!(totp(&secret).is_ok());
    }

    #[rstest]
    #[case::same_step(0)]
    #[case::one_step_behind(30)]
    #[case::one_step_ahead(-30)]
    fn test_code_accepted_within_skew(#[case] offset: i64) {
        let code = code_at(SECRET, NOW.saturating_add_signed(offset)).unwrap();
        assert!(verify(SECRET, &code, NOW).unwrap());
    }

    #[test]
    fn test_code_rejected_outside_skew() {
        let code = code_at(SECRET, NOW - 90).unwrap();
        assert!(!verify(SECRET, &code, NOW).unwrap());
    }

    #[rstest]
    #[case::empty("")]
    #[case::letters("abcdef")]
    #[case::short("12345")]
    fn test_malformed_code_is_false(#[case] code: &str) {
        assert!(!verify(SECRET, code, NOW).unwrap());
    }

    #[test]
    fn test_bad_secret_is_error() {
        assert!(verify("not base32!", "123456", NOW).is_err());
    }
}
