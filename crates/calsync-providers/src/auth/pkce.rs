//! PKCE material (RFC 7636).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use sha2::{Digest, Sha256};

/// Length of the code verifier in random bytes, before encoding.
const CODE_VERIFIER_BYTES: usize = 64;
/// Length of the state in random bytes, before encoding.
const STATE_BYTES: usize = 32;

/// A code verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

impl PkceChallenge {
    /// Generates a fresh random verifier.
    pub fn generate() -> Self {
        Self::from_verifier(random_token(CODE_VERIFIER_BYTES))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = compute_challenge(&verifier);
        Self { verifier, challenge }
    }

    /// Always `S256`.
    pub fn method(&self) -> &'static str {
        "S256"
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Computes `base64url(SHA-256(verifier))` without padding.
pub fn compute_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generates a random state string for CSRF protection.
pub fn generate_state() -> String {
    random_token(STATE_BYTES)
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_length() {
        // 64 bytes encode to 86 characters without padding
        let pkce = PkceChallenge::generate();
        assert_eq!(pkce.verifier.len(), 86);
        assert!(!pkce.verifier.contains('='));
    }

    #[test]
    fn state_length() {
        assert_eq!(generate_state().len(), 43);
    }

    #[test]
    fn rfc7636_appendix_b_vector() {
        let challenge = compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn challenge_matches_verifier_for_random_input() {
        for _ in 0..16 {
            let pkce = PkceChallenge::generate();
            let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
            assert_eq!(pkce.challenge, expected);
        }
    }

    #[test]
    fn values_are_random() {
        assert_ne!(PkceChallenge::generate().verifier, PkceChallenge::generate().verifier);
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn debug_hides_verifier() {
        let pkce = PkceChallenge::from_verifier("secret-verifier".to_string());
        assert!(!format!("{:?}", pkce).contains("secret-verifier"));
    }
}
