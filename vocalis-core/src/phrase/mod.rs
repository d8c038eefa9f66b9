//! Challenge phrase generation.
//!
//! A phrase is one of five token-pattern templates mixing two random
//! 2-digit numeric anchors with word slots drawn from semantic category
//! pools. The word source is pluggable: a remote templated-word service
//! when configured, fixed local pools otherwise. Output shape (two
//! numeric tokens, three word tokens, five tokens total) is identical
//! regardless of source, so downstream scoring never cares which one
//! produced the phrase.
//!
//! The RNG is injectable so tests can pin deterministic phrases.

pub mod wordlist;

#[cfg(feature = "remote-words")]
pub mod remote;

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::warn;

pub use wordlist::BuiltinWords;

/// Semantic slot categories for phrase templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCategory {
    Descriptive,
    Object,
    Action,
    Relational,
}

/// Supplier of a single word for a category slot.
///
/// Implementations that reach over the network may fail; the generator
/// falls back to [`BuiltinWords`] for the remainder of the phrase.
pub trait WordSource: Send + Sync {
    fn word(&self, category: WordCategory, rng: &mut dyn RngCore) -> anyhow::Result<String>;
}

/// One slot in a phrase template.
#[derive(Debug, Clone, Copy)]
enum Slot {
    FirstNumber,
    SecondNumber,
    Word(WordCategory),
}

use Slot::{FirstNumber, SecondNumber, Word};
use WordCategory::{Action, Descriptive, Object, Relational};

/// The five templates. Every template carries both numeric anchors and
/// three word slots.
const PATTERNS: [[Slot; 5]; 5] = [
    [FirstNumber, Word(Descriptive), Word(Object), Word(Action), SecondNumber],
    [Word(Action), FirstNumber, Word(Descriptive), Word(Object), SecondNumber],
    [FirstNumber, Word(Object), Word(Action), Word(Descriptive), SecondNumber],
    [Word(Descriptive), FirstNumber, Word(Object), Word(Action), SecondNumber],
    [FirstNumber, Word(Descriptive), Word(Object), Word(Relational), SecondNumber],
];

/// Random pronounceable phrase generator.
pub struct PhraseGenerator {
    /// Preferred source (e.g. the remote word service). `None` means
    /// builtin-only.
    primary: Option<Arc<dyn WordSource>>,
    fallback: BuiltinWords,
    rng: Mutex<StdRng>,
}

impl PhraseGenerator {
    /// Builtin-only generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            primary: None,
            fallback: BuiltinWords,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            primary: None,
            fallback: BuiltinWords,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Use `source` as the preferred word supplier.
    pub fn with_source(mut self, source: Arc<dyn WordSource>) -> Self {
        self.primary = Some(source);
        self
    }

    /// Produce one challenge phrase.
    pub fn generate(&self) -> String {
        let mut rng = self.rng.lock();

        let pattern = &PATTERNS[rng.gen_range(0..PATTERNS.len())];
        let num1: u8 = rng.gen_range(10..=99);
        let num2: u8 = rng.gen_range(10..=99);

        // Once the primary source fails we stop asking it for this phrase;
        // mixing sources mid-phrase would produce inconsistent vocabulary.
        let mut primary_ok = self.primary.is_some();
        let mut tokens = Vec::with_capacity(pattern.len());

        for slot in pattern {
            match slot {
                FirstNumber => tokens.push(num1.to_string()),
                SecondNumber => tokens.push(num2.to_string()),
                Word(category) => {
                    let primary = self.primary.as_ref().filter(|_| primary_ok);
                    let word = match primary.map(|s| s.word(*category, &mut *rng)) {
                        Some(Ok(w)) => w,
                        Some(Err(e)) => {
                            warn!("word service failed, using builtin pools: {e}");
                            primary_ok = false;
                            self.fallback
                                .word(*category, &mut *rng)
                                .unwrap_or_else(|_| "word".into())
                        }
                        None => self
                            .fallback
                            .word(*category, &mut *rng)
                            .unwrap_or_else(|_| "word".into()),
                    };
                    tokens.push(word.to_lowercase());
                }
            }
        }

        tokens.join(" ")
    }
}

impl Default for PhraseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_shape(phrase: &str) -> (usize, usize, usize) {
        let tokens: Vec<&str> = phrase.split_whitespace().collect();
        let numeric = tokens
            .iter()
            .filter(|t| t.chars().all(|c| c.is_ascii_digit()))
            .count();
        (tokens.len(), numeric, tokens.len() - numeric)
    }

    #[test]
    fn seeded_generator_is_deterministic() {
        let a = PhraseGenerator::seeded(42).generate();
        let b = PhraseGenerator::seeded(42).generate();
        assert_eq!(a, b);
    }

    #[test]
    fn phrases_have_expected_token_shape() {
        let gen = PhraseGenerator::seeded(7);
        for _ in 0..100 {
            let phrase = gen.generate();
            let (total, numeric, words) = token_shape(&phrase);
            assert!((4..=6).contains(&total), "token count {total} in {phrase:?}");
            assert_eq!(numeric, 2, "numeric anchors in {phrase:?}");
            assert_eq!(words, 3, "word slots in {phrase:?}");
        }
    }

    #[test]
    fn numeric_anchors_are_two_digits() {
        let gen = PhraseGenerator::seeded(99);
        for _ in 0..100 {
            let phrase = gen.generate();
            for token in phrase.split_whitespace() {
                if token.chars().all(|c| c.is_ascii_digit()) {
                    let n: u32 = token.parse().unwrap();
                    assert!((10..=99).contains(&n), "anchor {n} in {phrase:?}");
                }
            }
        }
    }

    #[test]
    fn failing_primary_source_falls_back_to_builtin() {
        struct AlwaysFails;
        impl WordSource for AlwaysFails {
            fn word(&self, _: WordCategory, _: &mut dyn RngCore) -> anyhow::Result<String> {
                anyhow::bail!("service unavailable")
            }
        }

        let gen = PhraseGenerator::seeded(3).with_source(Arc::new(AlwaysFails));
        let phrase = gen.generate();
        let (total, numeric, words) = token_shape(&phrase);
        assert_eq!((total, numeric, words), (5, 2, 3), "shape of {phrase:?}");
    }

    #[test]
    fn all_patterns_appear_over_many_draws() {
        // With 500 draws the chance of missing one of five uniform
        // patterns is negligible. Distinguish patterns by where the
        // numeric anchors sit.
        let gen = PhraseGenerator::seeded(1234);
        let mut shapes = std::collections::HashSet::new();
        for _ in 0..500 {
            let phrase = gen.generate();
            let positions: Vec<usize> = phrase
                .split_whitespace()
                .enumerate()
                .filter(|(_, t)| t.chars().all(|c| c.is_ascii_digit()))
                .map(|(i, _)| i)
                .collect();
            shapes.insert(positions);
        }
        // Patterns 0, 2 and 4 share anchor positions [0, 4]; patterns 1
        // and 3 share [1, 4]. Both shapes must show up.
        assert_eq!(shapes.len(), 2, "anchor position shapes: {shapes:?}");
    }
}
