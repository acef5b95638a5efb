//! News manager: scrape-based headlines with optional model curation.
//!
//! Headlines come from a small set of standing queries (or a caller
//! topic) against the search client. Curation forwards the raw headlines
//! to the generation backend to select and rewrite the best ones, and
//! degrades gracefully to the raw list on any backend failure. Digests
//! are cached per topic for a short window and never persisted.

use crate::config::NewsConfig;
use crate::error::Result;
use crate::llm::LanguageBackend;
use crate::search::{self, SearchClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Standing queries for the default briefing.
const BRIEFING_QUERIES: &[&str] = &["top news", "technology news", "science breakthrough"];

/// One headline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub title: String,
    pub source: String,
    pub summary: String,
}

/// A fetched set of headlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsDigest {
    pub topic: Option<String>,
    pub headlines: Vec<Headline>,
    /// Whether the headlines went through model curation.
    pub curated: bool,
}

/// Fetches and optionally curates news headlines.
pub struct NewsManager {
    search: SearchClient,
    llm: Option<Arc<dyn LanguageBackend>>,
    config: NewsConfig,
    cache: Mutex<HashMap<String, (Instant, NewsDigest)>>,
}

impl NewsManager {
    /// Create a news manager. `llm` is optional: without it curation is
    /// silently skipped.
    pub fn new(
        search: SearchClient,
        llm: Option<Arc<dyn LanguageBackend>>,
        config: &NewsConfig,
    ) -> Self {
        Self {
            search,
            llm,
            config: config.clone(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a digest for `topic` (or the standing briefing), serving
    /// from the cache inside the validity window.
    ///
    /// # Errors
    ///
    /// Returns a transient error when every headline query fails.
    pub async fn fetch(&self, topic: Option<&str>, curate: bool) -> Result<NewsDigest> {
        let cache_key = format!(
            "{}:{}",
            topic.unwrap_or("briefing"),
            if curate { "curated" } else { "raw" }
        );
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        {
            let cache = self.lock_cache();
            if let Some((fetched, digest)) = cache.get(&cache_key) {
                if fetched.elapsed() < ttl {
                    return Ok(digest.clone());
                }
            }
        }

        let raw = self.fetch_raw(topic).await?;
        let digest = if curate {
            match self.curate(&raw).await {
                Some(curated) => NewsDigest {
                    topic: topic.map(str::to_owned),
                    headlines: curated,
                    curated: true,
                },
                // Curation failure degrades to the raw headlines.
                None => NewsDigest {
                    topic: topic.map(str::to_owned),
                    headlines: raw,
                    curated: false,
                },
            }
        } else {
            NewsDigest {
                topic: topic.map(str::to_owned),
                headlines: raw,
                curated: false,
            }
        };

        self.lock_cache()
            .insert(cache_key, (Instant::now(), digest.clone()));
        Ok(digest)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, NewsDigest)>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_raw(&self, topic: Option<&str>) -> Result<Vec<Headline>> {
        let queries: Vec<String> = match topic {
            Some(t) => vec![format!("{t} news")],
            None => BRIEFING_QUERIES.iter().map(|q| (*q).to_owned()).collect(),
        };

        let mut headlines = Vec::new();
        let mut seen_titles = std::collections::HashSet::new();
        let mut last_error = None;

        for query in &queries {
            match self.search.search(query).await {
                Ok(results) => {
                    for r in results {
                        if !seen_titles.insert(r.title.clone()) {
                            continue;
                        }
                        headlines.push(Headline {
                            source: search::source_of(&r.url),
                            title: r.title,
                            summary: r.snippet,
                        });
                    }
                }
                Err(e) => {
                    warn!("news query {query:?} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        if headlines.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        headlines.truncate(self.config.max_headlines);
        Ok(headlines)
    }

    /// Ask the generation backend to select and rewrite the best
    /// headlines. Returns `None` on any failure.
    async fn curate(&self, raw: &[Headline]) -> Option<Vec<Headline>> {
        let llm = self.llm.as_ref()?;
        if raw.is_empty() {
            return None;
        }

        let listing: Vec<serde_json::Value> = raw
            .iter()
            .enumerate()
            .map(|(i, h)| {
                serde_json::json!({ "id": i, "title": h.title, "source": h.source })
            })
            .collect();
        let prompt = format!(
            "You are an expert news editor. Here is a list of raw news articles:\n{}\n\n\
             Select the {} most important and diverse stories and rewrite their titles \
             to be punchy and short (under 10 words). Return ONLY a JSON array of \
             objects: [{{\"id\": <original_id>, \"title\": \"<new_title>\"}}]. \
             No markdown, no extra text.",
            serde_json::to_string_pretty(&listing).ok()?,
            self.config.max_headlines.min(6),
        );

        let content = match llm.complete("", &prompt).await {
            Ok(c) => c,
            Err(e) => {
                warn!("news curation failed, using raw headlines: {e}");
                return None;
            }
        };

        let selected: Vec<serde_json::Value> =
            serde_json::from_str(strip_code_fences(&content)).ok()?;
        let mut curated = Vec::new();
        for item in selected {
            let id = item["id"].as_u64()? as usize;
            let original = raw.get(id)?;
            curated.push(Headline {
                title: item["title"].as_str().unwrap_or(&original.title).to_owned(),
                source: original.source.clone(),
                summary: original.summary.clone(),
            });
        }
        if curated.is_empty() {
            None
        } else {
            Some(curated)
        }
    }
}

/// Remove ```json fences models sometimes wrap arrays in.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end_matches("```").trim()
}
