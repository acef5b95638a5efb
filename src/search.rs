//! Scrape-based web search.
//!
//! Uses the HTML-only DuckDuckGo endpoint, which requires no JavaScript
//! and no API key, and parses results with CSS selectors. Answers are
//! condensed into short snippets suitable for speech.

use crate::config::SearchConfig;
use crate::error::{AssistantError, Result};
use crate::managers::with_one_retry;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Client for the HTML search endpoint.
pub struct SearchClient {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl SearchClient {
    /// Create a search client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_results: config.max_results.max(1),
        })
    }

    /// Run a query, with one bounded retry on transient failure.
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout or transport failure, or a
    /// parse error when the result page cannot be read.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        with_one_retry(|| self.request(query)).await
    }

    async fn request(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query)])
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout(format!("search: {e}"))
                } else {
                    AssistantError::Http(format!("search: {e}"))
                }
            })?
            .error_for_status()
            .map_err(|e| AssistantError::Http(format!("search: {e}")))?;

        let html = response
            .text()
            .await
            .map_err(|e| AssistantError::Http(format!("search body read: {e}")))?;

        Ok(parse_results(&html, self.max_results))
    }
}

/// Parse the result page into hits. Separate function for testability
/// with canned HTML.
pub(crate) fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    // Selectors are literals; construction cannot fail.
    let Ok(result_sel) = Selector::parse(".result:not(.result--ad)") else {
        return Vec::new();
    };
    let Ok(title_sel) = Selector::parse(".result__a") else {
        return Vec::new();
    };
    let Ok(snippet_sel) = Selector::parse(".result__snippet") else {
        return Vec::new();
    };

    let mut results = Vec::new();
    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let title = title_el.text().collect::<String>().trim().to_owned();
        if title.is_empty() {
            continue;
        }
        let Some(href) = title_el.value().attr("href") else {
            continue;
        };
        let Some(url) = extract_url(href) else {
            continue;
        };
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_owned())
            .unwrap_or_default();

        results.push(SearchResult {
            title,
            snippet,
            url,
        });
        if results.len() >= max_results {
            break;
        }
    }
    results
}

/// Unwrap DuckDuckGo's redirect links (`//duckduckgo.com/l/?uddg=...`)
/// to the destination URL.
fn extract_url(href: &str) -> Option<String> {
    let full = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_owned()
    };
    let parsed = Url::parse(&full).ok()?;
    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full)
    }
}

/// Stitch the top snippets into a short spoken answer.
pub fn spoken_answer(results: &[SearchResult]) -> Option<String> {
    let bodies: Vec<&str> = results
        .iter()
        .filter(|r| !r.snippet.is_empty())
        .take(2)
        .map(|r| r.snippet.as_str())
        .collect();
    if bodies.is_empty() {
        return None;
    }
    Some(bodies.join(". "))
}

/// Host name of a result URL, for attribution.
pub fn source_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_owned()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <div class="result">
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Frust&rut=abc">Rust Language</a>
            <a class="result__snippet">A language empowering everyone.</a>
        </div>
        <div class="result result--ad">
            <a class="result__a" href="https://ads.example.com">Sponsored</a>
        </div>
        <div class="result">
            <a class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
            <a class="result__snippet">Learn Rust from first principles.</a>
        </div>
    "#;

    #[test]
    fn parse_skips_ads_and_unwraps_redirects() {
        let results = parse_results(SAMPLE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Rust Language");
        assert_eq!(results[0].url, "https://example.com/rust");
        assert_eq!(results[1].url, "https://doc.rust-lang.org/book/");
    }

    #[test]
    fn parse_respects_max_results() {
        assert_eq!(parse_results(SAMPLE, 1).len(), 1);
    }

    #[test]
    fn spoken_answer_stitches_snippets() {
        let results = parse_results(SAMPLE, 10);
        let answer = spoken_answer(&results).unwrap();
        assert!(answer.contains("empowering"));
        assert!(answer.contains("first principles"));
        assert!(spoken_answer(&[]).is_none());
    }

    #[test]
    fn source_strips_www() {
        assert_eq!(source_of("https://www.bbc.co.uk/news/1"), "bbc.co.uk");
        assert_eq!(source_of("not a url"), "");
    }
}
