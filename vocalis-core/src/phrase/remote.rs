//! HTTP-backed word source for the templated-word service.
//!
//! The service owns its own randomness; the generator's RNG is only used
//! for pattern and anchor selection when this source is active.

use rand::RngCore;
use serde::Deserialize;

use super::{WordCategory, WordSource};

#[derive(Debug, Deserialize)]
struct WordResponse {
    word: String,
}

/// Blocking JSON client for a `GET {base}/word?category=<c>` endpoint.
pub struct RemoteWordSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RemoteWordSource {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(3))
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn category_param(category: WordCategory) -> &'static str {
        match category {
            WordCategory::Descriptive => "descriptive",
            WordCategory::Object => "object",
            WordCategory::Action => "action",
            WordCategory::Relational => "relational",
        }
    }
}

impl WordSource for RemoteWordSource {
    fn word(&self, category: WordCategory, _rng: &mut dyn RngCore) -> anyhow::Result<String> {
        let url = format!("{}/word", self.base_url.trim_end_matches('/'));
        let resp: WordResponse = self
            .client
            .get(url)
            .query(&[("category", Self::category_param(category))])
            .send()?
            .error_for_status()?
            .json()?;

        let word = resp.word.trim().to_string();
        anyhow::ensure!(
            !word.is_empty() && !word.contains(char::is_whitespace),
            "word service returned an unusable token: {word:?}"
        );
        Ok(word)
    }
}
