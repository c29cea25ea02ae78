//! Review-app name generation.
//!
//! A review app is named `a<token>-<parent>`, where `<token>` is six random
//! lowercase alphanumerics. Heroku app names must start with a letter and are
//! capped at 30 characters, so the fixed `a` prefix goes first and long names
//! are cut from the right.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const NAME_PREFIX: char = 'a';
pub const TOKEN_LEN: usize = 6;
pub const MAX_APP_NAME_LEN: usize = 30;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Owns the random source used for review-app tokens.
///
/// Seed once per process with [`NameGenerator::from_entropy`], or with a fixed
/// seed to get a reproducible sequence.
pub struct NameGenerator {
    rng: StdRng,
}

impl NameGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn token(&mut self) -> String {
        (0..TOKEN_LEN)
            .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    pub fn review_app_name(&mut self, parent_app_name: &str) -> String {
        let token = self.token();
        compose_name(&token, parent_app_name)
    }
}

/// Build `a<token>-<parent>` and truncate it to the platform limit.
pub fn compose_name(token: &str, parent_app_name: &str) -> String {
    let mut name = format!("{NAME_PREFIX}{token}-{parent_app_name}");
    if name.len() > MAX_APP_NAME_LEN {
        let mut cut = MAX_APP_NAME_LEN;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    name
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_shape() {
        let mut gen = NameGenerator::seeded(7);
        let tok = gen.token();
        assert_eq!(tok.len(), TOKEN_LEN);
        assert!(tok
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = NameGenerator::seeded(42);
        let mut b = NameGenerator::seeded(42);
        for _ in 0..5 {
            assert_eq!(a.review_app_name("shop-web"), b.review_app_name("shop-web"));
        }
    }

    #[test]
    fn tokens_differ_across_calls() {
        let mut gen = NameGenerator::from_entropy();
        let tokens: HashSet<_> = (0..50).map(|_| gen.token()).collect();
        assert!(tokens.len() > 45, "expected distinct tokens");
    }

    #[test]
    fn name_keeps_parent_suffix_when_short() {
        let name = compose_name("abc123", "app-a");
        assert_eq!(name, "aabc123-app-a");
        assert!(name.ends_with("-app-a"));
    }

    #[test]
    fn length_and_prefix_hold_for_all_parent_lengths() {
        let mut gen = NameGenerator::seeded(1);
        for len in 0..64 {
            let parent = "p".repeat(len);
            let name = gen.review_app_name(&parent);
            assert!(name.len() <= MAX_APP_NAME_LEN, "too long: {name}");
            assert!(name.starts_with(NAME_PREFIX));
            if 1 + TOKEN_LEN + 1 + len <= MAX_APP_NAME_LEN {
                assert!(name.ends_with(&format!("-{parent}")));
            } else {
                assert_eq!(name.len(), MAX_APP_NAME_LEN);
            }
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let name = compose_name("abc123", &"é".repeat(20));
        assert!(name.len() <= MAX_APP_NAME_LEN);
        assert!(name.starts_with("aabc123-"));
    }
}
