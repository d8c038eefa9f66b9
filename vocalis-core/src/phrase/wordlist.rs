//! Fixed local word pools used when no remote word service is available.
//!
//! Pools are deliberately short, common, phonetically distinct words — the
//! speaker has to read the phrase aloud once, so pronounceability beats
//! vocabulary size.

use rand::RngCore;

use super::{WordCategory, WordSource};

pub(crate) const DESCRIPTIVE: &[&str] = &[
    "red", "blue", "green", "fast", "slow", "big", "small", "happy", "bright", "clear",
    "dark", "light", "high", "low", "new", "old", "good", "hot", "cold", "warm",
];

pub(crate) const OBJECTS: &[&str] = &[
    "sky", "book", "tree", "water", "light", "house", "car", "dog", "cat", "bird",
    "fish", "star", "moon", "sun", "cloud", "wind", "rain", "snow", "fire", "flower",
];

pub(crate) const ACTIONS: &[&str] = &[
    "read", "find", "open", "close", "make", "take", "see", "go", "come", "run",
    "walk", "talk", "look", "work", "play", "write", "draw", "sing", "think", "learn",
];

pub(crate) const RELATIONAL: &[&str] = &[
    "to", "from", "with", "at", "in", "on", "by", "for", "of", "and",
];

/// Word source backed by the fixed pools above. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinWords;

impl BuiltinWords {
    fn pool(category: WordCategory) -> &'static [&'static str] {
        match category {
            WordCategory::Descriptive => DESCRIPTIVE,
            WordCategory::Object => OBJECTS,
            WordCategory::Action => ACTIONS,
            WordCategory::Relational => RELATIONAL,
        }
    }
}

impl WordSource for BuiltinWords {
    fn word(&self, category: WordCategory, rng: &mut dyn RngCore) -> anyhow::Result<String> {
        let pool = Self::pool(category);
        let idx = (rng.next_u32() as usize) % pool.len();
        Ok(pool[idx].to_string())
    }
}
