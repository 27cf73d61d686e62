//! HTTP page client using wreq for TLS fingerprint emulation.

use crate::config::Config;
use crate::page::llm::LlmExtractor;
use crate::page::selectors::{errors, BODY};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::RngExt;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Upper bound on page text handed to structured extraction.
const MAX_STRUCTURED_CHARS: usize = 30_000;

/// Trait for fetching page fragments - enables mocking for tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches `url` and returns the text of every element matching `selector`.
    async fn fragment(&self, url: &str, selector: &str) -> Result<String>;

    /// Fetches `url` and returns a JSON payload extracted per `instruction`.
    async fn structured(&self, url: &str, instruction: &str) -> Result<String>;

    /// Whether `structured` can succeed at all.
    fn supports_structured(&self) -> bool {
        false
    }
}

/// Product page client with browser impersonation and anti-bot measures.
pub struct WebPage {
    client: Client,
    delay_ms: u64,
    delay_jitter_ms: u64,
    extractor: Option<LlmExtractor>,
}

impl WebPage {
    /// Creates a new page client with the given configuration.
    pub async fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10));

        // Configure proxy if specified
        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url).context("Failed to configure proxy")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        let extractor = match &config.llm_api_key {
            Some(key) => {
                let extractor = LlmExtractor::new(key.clone(), config.llm_model.clone())?;
                debug!("Structured extraction enabled ({})", extractor.model());
                Some(extractor)
            }
            None => None,
        };

        Ok(Self {
            client,
            delay_ms: config.delay_ms,
            delay_jitter_ms: config.delay_jitter_ms,
            extractor,
        })
    }

    /// Replaces the structured extractor.
    pub fn with_extractor(mut self, extractor: Option<LlmExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Performs a GET request with all anti-bot measures.
    async fn get(&self, url: &str) -> Result<String> {
        // Add human-like delay with jitter
        self.delay().await;

        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Sec-Ch-Ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"")
            .header("Sec-Ch-Ua-Mobile", "?0")
            .header("Sec-Ch-Ua-Platform", "\"macOS\"")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 503 {
            warn!("Rate limited (503). Consider using a proxy or increasing delay.");
            anyhow::bail!("Rate limited. Try increasing --delay or using a proxy.");
        }

        if !status.is_success() {
            anyhow::bail!("Request failed with status: {}", status);
        }

        response.text().await.context("Failed to read response body")
    }

    /// Adds a random delay to mimic human behavior.
    async fn delay(&self) {
        if self.delay_ms == 0 {
            return;
        }

        let jitter = if self.delay_jitter_ms > 0 {
            rand::rng().random_range(0..=self.delay_jitter_ms)
        } else {
            0
        };

        let total_delay = self.delay_ms + jitter;
        debug!("Delaying {}ms", total_delay);
        tokio::time::sleep(Duration::from_millis(total_delay)).await;
    }
}

#[async_trait]
impl PageSource for WebPage {
    async fn fragment(&self, url: &str, selector: &str) -> Result<String> {
        info!("Fetching '{}' from {}", selector, url);
        let html = self.get(url).await?;
        fragment_from_html(&html, selector)
    }

    async fn structured(&self, url: &str, instruction: &str) -> Result<String> {
        let Some(extractor) = &self.extractor else {
            anyhow::bail!("No structured extractor configured (set GEMINI_API_KEY)");
        };

        info!("Running structured extraction on {}", url);
        let html = self.get(url).await?;
        let text = text_from_html(&html)?;
        if text.is_empty() {
            anyhow::bail!("Page has no text content");
        }

        extractor.extract(instruction, &text).await
    }

    fn supports_structured(&self) -> bool {
        self.extractor.is_some()
    }
}

// `Html` is not Send, so parsing stays in sync helpers and never spans an await.

fn fragment_from_html(html: &str, selector: &str) -> Result<String> {
    let document = Html::parse_document(html);
    check_for_errors(&document)?;
    select_text(&document, selector)
}

fn text_from_html(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    check_for_errors(&document)?;
    Ok(page_text(&document, MAX_STRUCTURED_CHARS))
}

/// Checks for CAPTCHA or error pages.
fn check_for_errors(document: &Html) -> Result<()> {
    if document.select(&errors::CAPTCHA).next().is_some() {
        anyhow::bail!(
            "CAPTCHA detected. The site is blocking requests. \
            Try using a proxy or waiting before retrying."
        );
    }

    if document.select(&errors::DOG_PAGE).next().is_some() {
        anyhow::bail!(
            "Error page detected (503). \
            The service may be temporarily unavailable."
        );
    }

    Ok(())
}

/// Joins the text of all elements matching `css`, whitespace-normalized.
pub fn select_text(document: &Html, css: &str) -> Result<String> {
    let selector = Selector::parse(css)
        .map_err(|e| anyhow::anyhow!("Invalid selector '{}': {:?}", css, e))?;

    let parts: Vec<String> = document
        .select(&selector)
        .map(|e| e.text().collect::<Vec<_>>().join(" "))
        .collect();

    if parts.is_empty() {
        anyhow::bail!("No element matched selector '{}'", css);
    }

    Ok(parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Visible body text, skipping script and style content, capped at `max_chars`.
pub fn page_text(document: &Html, max_chars: usize) -> String {
    let Some(body) = document.select(&BODY).next() else {
        return String::new();
    };

    let mut parts = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element())
            .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"));
        if hidden {
            continue;
        }

        let text = text.trim();
        if !text.is_empty() {
            parts.push(text);
        }
    }

    parts.join(" ").chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_test_config() -> Config {
        let mut config = Config::new();
        config.delay_ms = 0; // No delay for tests
        config.delay_jitter_ms = 0;
        config
    }

    const PRODUCT_HTML: &str = r##"
        <html><body>
            <span class="a-size-large product-title-word-break"> Lenovo V15 Laptop </span>
            <span class="a-price-whole">1,299.</span>
            <span class="a-price-whole">1,299.</span>
            <div id="acrPopover"><span class="a-declarative"><a href="#"><span>4.3 out of 5 stars</span></a></span></div>
            <span id="acrCustomerReviewText">2,501 ratings</span>
            <script>var price = "999";</script>
        </body></html>
    "##;

    #[test]
    fn test_select_text_joins_matches() {
        let document = Html::parse_document(PRODUCT_HTML);
        let text = select_text(&document, "span.a-price-whole").unwrap();
        assert_eq!(text, "1,299. 1,299.");
    }

    #[test]
    fn test_select_text_no_match() {
        let document = Html::parse_document(PRODUCT_HTML);
        let err = select_text(&document, "#missing").unwrap_err();
        assert!(err.to_string().contains("No element matched"));
    }

    #[test]
    fn test_select_text_invalid_selector() {
        let document = Html::parse_document(PRODUCT_HTML);
        let err = select_text(&document, "span[").unwrap_err();
        assert!(err.to_string().contains("Invalid selector"));
    }

    #[test]
    fn test_page_text_skips_scripts() {
        let document = Html::parse_document(PRODUCT_HTML);
        let text = page_text(&document, 10_000);
        assert!(text.contains("Lenovo V15 Laptop"));
        assert!(text.contains("2,501 ratings"));
        assert!(!text.contains("var price"));
    }

    #[test]
    fn test_page_text_truncates() {
        let document = Html::parse_document(PRODUCT_HTML);
        assert_eq!(page_text(&document, 6).chars().count(), 6);
    }

    #[test]
    fn test_check_for_errors_captcha() {
        let html =
            r#"<html><body><form action="/errors/validateCaptcha">CAPTCHA</form></body></html>"#;
        let result = check_for_errors(&Html::parse_document(html));
        assert!(result.unwrap_err().to_string().contains("CAPTCHA"));
    }

    #[tokio::test]
    async fn test_fragment_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dp/B0D3JLHQ8K"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_HTML))
            .mount(&mock_server)
            .await;

        let page = WebPage::new(&make_test_config()).await.unwrap();
        let url = format!("{}/dp/B0D3JLHQ8K", mock_server.uri());

        let name = page.fragment(&url, "span.product-title-word-break").await.unwrap();
        assert_eq!(name, "Lenovo V15 Laptop");

        let count = page.fragment(&url, "#acrCustomerReviewText").await.unwrap();
        assert_eq!(count, "2,501 ratings");
    }

    #[tokio::test]
    async fn test_fragment_rate_limited_503() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let page = WebPage::new(&make_test_config()).await.unwrap();
        let result = page.fragment(&mock_server.uri(), "span").await;
        assert!(result.unwrap_err().to_string().contains("Rate limited"));
    }

    #[tokio::test]
    async fn test_fragment_http_error_404() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let page = WebPage::new(&make_test_config()).await.unwrap();
        let result = page.fragment(&mock_server.uri(), "span").await;
        assert!(result.unwrap_err().to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_structured_without_extractor() {
        let page = WebPage::new(&make_test_config()).await.unwrap();
        assert!(!page.supports_structured());

        let result = page.structured("http://localhost/p", "Extract the name").await;
        assert!(result.unwrap_err().to_string().contains("No structured extractor"));
    }

    #[tokio::test]
    async fn test_structured_with_extractor() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/dp/B0D3JLHQ8K"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PRODUCT_HTML))
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "[{\"name\": \"Lenovo V15 Laptop\"}]" }] }
                }]
            })))
            .mount(&mock_server)
            .await;

        let extractor = LlmExtractor::with_base_url(
            "test-key".to_string(),
            "gemini-2.0-flash".to_string(),
            mock_server.uri(),
        )
        .unwrap();
        let page = WebPage::new(&make_test_config()).await.unwrap().with_extractor(Some(extractor));
        assert!(page.supports_structured());

        let url = format!("{}/dp/B0D3JLHQ8K", mock_server.uri());
        let payload = page.structured(&url, "Extract the product name").await.unwrap();
        assert!(payload.contains("Lenovo V15 Laptop"));
    }

    #[tokio::test]
    async fn test_delay_from_config() {
        let mut config = make_test_config();
        config.delay_ms = 1000;
        config.delay_jitter_ms = 500;
        let page = WebPage::new(&config).await.unwrap();
        assert_eq!(page.delay_ms, 1000);
        assert_eq!(page.delay_jitter_ms, 500);
    }
}
