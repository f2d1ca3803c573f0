//! Catalogue adapter driven by CSS selectors.
//!
//! Most supplier catalogues render a search page as a grid of product
//! cards. A [`SelectorSpec`] describes where the search page lives and
//! where each field sits inside a card, so a new catalogue is a config
//! entry rather than new code.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::adapter::SourceAdapter;
use crate::error::{SearchError, SourceError};
use crate::http::HttpSession;
use crate::types::{Availability, Query, RawProduct, SourceId};

/// Placeholder in [`SelectorSpec::search_url`] replaced by the encoded query.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Where to read one field inside a product card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSpec {
    /// CSS selector relative to the card; the card itself when absent.
    pub selector: Option<String>,
    /// Attributes tried in order; the element text when empty.
    pub attrs: Vec<String>,
}

/// Extraction rules for one catalogue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSpec {
    /// Search page URL containing `{query}`.
    pub search_url: String,
    /// Base for resolving relative links and images.
    pub base_url: String,
    /// Selector matching each product card.
    pub card: String,
    /// Product name.
    pub name: FieldSpec,
    /// Used when `name` is missing or empty (e.g. an image `alt`).
    pub name_fallback: Option<FieldSpec>,
    /// Product page link. Cards without one are skipped.
    pub link: FieldSpec,
    /// Price text or numeric attribute.
    pub price: Option<FieldSpec>,
    /// Image URL.
    pub image: Option<FieldSpec>,
    /// Availability label or schema.org URL.
    pub availability: Option<FieldSpec>,
    /// Used when the card has no availability field.
    pub default_availability: Option<String>,
    /// Text holding the pack size.
    pub pack: Option<FieldSpec>,
    /// Regex whose first capture group is the pack size.
    pub pack_pattern: Option<String>,
    /// Whether the listed price is per pack and should be divided by the
    /// pack size.
    pub unit_price: bool,
}

struct Field {
    selector: Option<Selector>,
    attrs: Vec<String>,
}

impl Field {
    fn compile(spec: &FieldSpec, what: &str) -> Result<Self, SearchError> {
        let selector = spec
            .selector
            .as_deref()
            .map(|s| parse_selector(s, what))
            .transpose()?;
        Ok(Self {
            selector,
            attrs: spec.attrs.clone(),
        })
    }

    fn extract(&self, card: ElementRef<'_>) -> Option<String> {
        let element = match &self.selector {
            Some(selector) => card.select(selector).next()?,
            None => card,
        };
        let value = if self.attrs.is_empty() {
            collapse_whitespace(&element.text().collect::<String>())
        } else {
            self.attrs
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .map(str::trim)
                .find(|v| !v.is_empty())?
                .to_string()
        };
        (!value.is_empty()).then_some(value)
    }
}

fn parse_selector(selector: &str, what: &str) -> Result<Selector, SearchError> {
    Selector::parse(selector)
        .map_err(|e| SearchError::Config(format!("invalid {what} selector {selector:?}: {e:?}")))
}

/// Adapter scraping a catalogue's HTML search page.
pub struct SelectorAdapter {
    source: SourceId,
    search_url: String,
    base_url: Url,
    card: Selector,
    name: Field,
    name_fallback: Option<Field>,
    link: Field,
    price: Option<Field>,
    image: Option<Field>,
    availability: Option<Field>,
    default_availability: String,
    pack: Option<(Field, Regex)>,
    unit_price: bool,
}

impl SelectorAdapter {
    /// Compile `spec` for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] for a missing query placeholder, an
    /// invalid base URL, selector, or pack pattern.
    pub fn new(source: SourceId, spec: &SelectorSpec) -> Result<Self, SearchError> {
        if !spec.search_url.contains(QUERY_PLACEHOLDER) {
            return Err(SearchError::Config(format!(
                "source {source}: search_url must contain {QUERY_PLACEHOLDER}"
            )));
        }
        let base_url = Url::parse(&spec.base_url)
            .map_err(|e| SearchError::Config(format!("source {source}: invalid base_url: {e}")))?;

        let pack = match &spec.pack {
            Some(field) => {
                let pattern = spec.pack_pattern.as_deref().unwrap_or(r"(\d+)");
                let regex = Regex::new(pattern).map_err(|e| {
                    SearchError::Config(format!("source {source}: invalid pack_pattern: {e}"))
                })?;
                Some((Field::compile(field, "pack")?, regex))
            }
            None => None,
        };

        Ok(Self {
            search_url: spec.search_url.clone(),
            base_url,
            card: parse_selector(&spec.card, "card")?,
            name: Field::compile(&spec.name, "name")?,
            name_fallback: spec
                .name_fallback
                .as_ref()
                .map(|f| Field::compile(f, "name_fallback"))
                .transpose()?,
            link: Field::compile(&spec.link, "link")?,
            price: spec
                .price
                .as_ref()
                .map(|f| Field::compile(f, "price"))
                .transpose()?,
            image: spec
                .image
                .as_ref()
                .map(|f| Field::compile(f, "image"))
                .transpose()?,
            availability: spec
                .availability
                .as_ref()
                .map(|f| Field::compile(f, "availability"))
                .transpose()?,
            default_availability: spec.default_availability.clone().unwrap_or_default(),
            pack,
            unit_price: spec.unit_price,
            source,
        })
    }

    /// Search page URL for `query`.
    pub fn search_url(&self, query: &Query) -> String {
        let normalized = query.normalized().as_bytes();
        let encoded: String = url::form_urlencoded::byte_serialize(normalized).collect();
        self.search_url.replace(QUERY_PLACEHOLDER, &encoded)
    }

    /// Extract listings from a search page.
    ///
    /// A page without cards is an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Parse`] if cards are present but none of them
    /// yields a name and a link.
    pub fn parse_page(&self, html: &str) -> Result<Vec<RawProduct>, SourceError> {
        let document = Html::parse_document(html);
        let cards: Vec<ElementRef<'_>> = document.select(&self.card).collect();
        let products: Vec<RawProduct> = cards
            .iter()
            .filter_map(|card| self.parse_card(*card))
            .collect();
        tracing::trace!(
            source = %self.source,
            cards = cards.len(),
            count = products.len(),
            "page parsed"
        );
        if products.is_empty() && !cards.is_empty() {
            return Err(SourceError::Parse(format!(
                "{} cards matched but none has a name and a link",
                cards.len()
            )));
        }
        Ok(products)
    }

    fn parse_card(&self, card: ElementRef<'_>) -> Option<RawProduct> {
        let name = self
            .name
            .extract(card)
            .or_else(|| self.name_fallback.as_ref().and_then(|f| f.extract(card)))?;
        let link = self.resolve(&self.link.extract(card)?)?;

        let mut product = RawProduct::new(self.source.clone(), name, link);

        if let Some((field, pattern)) = &self.pack {
            let pack = field
                .extract(card)
                .and_then(|text| pack_size(pattern, &text))
                .filter(|n| *n > 0);
            if let Some(pack) = pack {
                product.quantity = pack;
                product.step = pack;
            }
        }

        if let Some(price) = self.price.as_ref().and_then(|f| f.extract(card)) {
            if let Some(value) = parse_price(&price) {
                if self.unit_price && product.step > 1 {
                    let unit = value / f64::from(product.step);
                    product.price = Some(unit);
                    product.price_display = format!("{unit:.2} ₽/шт.");
                } else {
                    product.price = Some(value);
                    product.price_display = price;
                }
            }
        }

        product.img_url = self
            .image
            .as_ref()
            .and_then(|f| f.extract(card))
            .and_then(|src| self.resolve(&src));

        product.availability_text = self
            .availability
            .as_ref()
            .and_then(|f| f.extract(card))
            .map(|label| availability_label(&label))
            .unwrap_or_else(|| self.default_availability.clone());

        Some(product)
    }

    fn resolve(&self, href: &str) -> Option<String> {
        self.base_url.join(href).ok().map(String::from)
    }
}

#[async_trait]
impl SourceAdapter<HttpSession> for SelectorAdapter {
    fn source(&self) -> &SourceId {
        &self.source
    }

    async fn fetch(
        &self,
        session: &mut HttpSession,
        query: &Query,
    ) -> Result<Vec<RawProduct>, SourceError> {
        let url = self.search_url(query);
        tracing::trace!(source = %self.source, url = %url, "fetching search page");
        let html = session.get_text(&url).await?;
        self.parse_page(&html)
    }
}

/// Decimal and integer price patterns, compiled once.
fn price_patterns() -> Option<&'static (Regex, Regex)> {
    static PRICE_PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    PRICE_PATTERNS.get_or_init(compile_price_patterns).as_ref()
}

fn compile_price_patterns() -> Option<(Regex, Regex)> {
    let decimal = Regex::new(r"\d+[.,]\d+").ok()?;
    let integer = Regex::new(r"\d+").ok()?;
    Some((decimal, integer))
}

/// First decimal (`123,45` / `123.45`) in `text`, else its first integer.
/// Whitespace is dropped first, so thousands separators are ignored.
pub fn parse_price(text: &str) -> Option<f64> {
    let (decimal, integer) = price_patterns()?;
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let number = decimal.find(&compact).or_else(|| integer.find(&compact))?;
    number.as_str().replace(',', ".").parse().ok()
}

fn pack_size(pattern: &Regex, text: &str) -> Option<u32> {
    let digits = pattern.captures(text)?.get(1)?;
    digits.as_str().parse().ok()
}

/// Human label for an availability value; schema.org URLs become Russian
/// labels, anything else is kept as published.
fn availability_label(raw: &str) -> String {
    if !raw.starts_with("http") {
        return raw.to_string();
    }
    match Availability::parse(raw) {
        Availability::InStock => "В наличии".into(),
        Availability::OutOfStock => "Нет в наличии".into(),
        Availability::Backorder => "Под заказ".into(),
        Availability::Unknown => raw.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
