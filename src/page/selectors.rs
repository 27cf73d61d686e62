//! CSS selectors for product pages.
//!
//! Field selectors are plain strings because they are user-configurable;
//! the defaults target Amazon product detail pages.
//!
//! **Update process**: When a field keeps coming back unavailable, capture the
//! page HTML, update the default here, and add a test fixture.

use scraper::Selector;
use std::sync::LazyLock;

/// Default field selectors for Amazon product pages.
pub mod defaults {
    /// Whole price part.
    pub const PRICE: &str = "span.a-price-whole";

    /// Product title.
    pub const NAME: &str = "span.a-size-large.product-title-word-break";

    /// Savings percentage badge.
    pub const DISCOUNT: &str = "span.a-size-large.a-color-price.savingPriceOverride.aok-align-center.reinventPriceSavingsPercentageMargin.savingsPercentage";

    /// Star rating text.
    pub const RATING: &str = "#acrPopover > span.a-declarative > a > span";

    /// Number of ratings.
    pub const RATING_COUNT: &str = "#acrCustomerReviewText";
}

/// Selectors for detecting error/captcha pages.
pub mod errors {
    use super::*;

    /// CAPTCHA form.
    pub static CAPTCHA: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "form[action*='validateCaptcha'], \
             img[src*='captcha']",
        )
        .unwrap()
    });

    /// Dog page (Amazon's error page).
    pub static DOG_PAGE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "img[alt*='dog'], \
             .a-box-inner a[href='/ref=cs_503_link']",
        )
        .unwrap()
    });
}

/// Main page body, used to feed structured extraction.
pub static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_default_selectors_compile() {
        for css in [
            defaults::PRICE,
            defaults::NAME,
            defaults::DISCOUNT,
            defaults::RATING,
            defaults::RATING_COUNT,
        ] {
            assert!(Selector::parse(css).is_ok(), "selector failed to parse: {}", css);
        }
        let _ = &*errors::CAPTCHA;
        let _ = &*errors::DOG_PAGE;
        let _ = &*BODY;
    }

    #[test]
    fn test_rating_selector_matching() {
        let html = Html::parse_document(
            r##"<div id="acrPopover"><span class="a-declarative"><a href="#">
                <span>4.3 out of 5 stars</span></a></span></div>"##,
        );
        let selector = Selector::parse(defaults::RATING).unwrap();
        let text: String = html.select(&selector).flat_map(|e| e.text()).collect();
        assert_eq!(text.trim(), "4.3 out of 5 stars");
    }
}
