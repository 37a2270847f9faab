use rand::Rng;
use std::sync::Arc;

/// Alphabet for server-generated creation tokens. Uppercase alphanumerics
/// keep tokens path-safe and easy to read out loud at a table.
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Pluggable generator for the server-assigned creation-key value.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Generate a random token of the given length from [`TOKEN_ALPHABET`].
pub fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_ALPHABET.len());
            TOKEN_ALPHABET[idx] as char
        })
        .collect()
}

/// Default generator used by `post` when the caller supplies none.
pub fn default_generator(len: usize) -> IdGenerator {
    Arc::new(move || random_token(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_requested_length() {
        assert_eq!(random_token(6).len(), 6);
        assert_eq!(random_token(1).len(), 1);
    }

    #[test]
    fn token_is_path_safe_ascii() {
        let token = random_token(64);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn consecutive_tokens_differ() {
        // 36^16 combinations; a collision here means the rng is broken.
        assert_ne!(random_token(16), random_token(16));
    }
}
