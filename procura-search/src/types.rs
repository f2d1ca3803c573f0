//! Core types: queries, source identifiers, and product records.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::SearchError;

/// Stable short key identifying one supplier catalogue (e.g. `"gudvin"`).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create a source id from any string-like key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A validated free-text search query.
///
/// The normalised form is lowercased with whitespace collapsed to single
/// spaces; it is the key used by the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    raw: String,
    normalized: String,
}

impl Query {
    /// Validate and normalise a query.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidQuery`] if `text` is empty or
    /// whitespace-only.
    pub fn parse(text: &str) -> Result<Self, SearchError> {
        let normalized = text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        if normalized.is_empty() {
            return Err(SearchError::InvalidQuery("query is empty".into()));
        }
        Ok(Self {
            raw: text.trim().to_string(),
            normalized,
        })
    }

    /// The query as the user typed it, trimmed.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased, whitespace-collapsed form.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Whitespace tokens of the normalised form.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.normalized.split(' ')
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

/// Canonical stock state of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Availability {
    /// Can be shipped now.
    InStock,
    /// Listed but not available.
    OutOfStock,
    /// Available on order / pre-order.
    Backorder,
    /// The catalogue did not say, or said something unrecognised.
    Unknown,
}

impl Availability {
    /// Map a catalogue's free-text (or schema.org URL) availability label
    /// onto a canonical state.
    ///
    /// Negative phrases are matched before positive ones since
    /// "нет в наличии" contains "в наличии".
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return Self::Unknown;
        }
        if lower.ends_with("/outofstock")
            || lower.contains("нет в наличии")
            || lower.contains("отсутствует")
            || lower.contains("out of stock")
        {
            Self::OutOfStock
        } else if lower.ends_with("/preorder")
            || lower.ends_with("/backorder")
            || lower.contains("под заказ")
            || lower.contains("preorder")
            || lower.contains("backorder")
        {
            Self::Backorder
        } else if lower.ends_with("/instock")
            || lower.contains("в наличии")
            || lower.contains("in stock")
        {
            Self::InStock
        } else {
            Self::Unknown
        }
    }

    /// Kebab-case label used in serialised output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "in-stock",
            Self::OutOfStock => "out-of-stock",
            Self::Backorder => "backorder",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_unit() -> u32 {
    1
}

/// One listing returned by one source for one fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    /// Optional catalogue-side identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name as shown by the catalogue.
    pub name: String,
    /// Numeric price; `None` means "price on request".
    #[serde(default)]
    pub price: Option<f64>,
    /// Price as formatted by the catalogue.
    #[serde(default)]
    pub price_display: String,
    /// Which source produced this listing.
    pub source: SourceId,
    /// Listing URL; the deduplication key within one source.
    pub link: String,
    /// Image reference.
    #[serde(default)]
    pub img_url: Option<String>,
    /// Purchase quantity unit (items per pack).
    #[serde(default = "default_unit")]
    pub quantity: u32,
    /// Minimum order step.
    #[serde(default = "default_unit")]
    pub step: u32,
    /// Availability label as published by the catalogue.
    #[serde(default)]
    pub availability_text: String,
    /// Secondary retrieval text; defaults to the lowercased name.
    #[serde(default)]
    pub search_text: Option<String>,
}

impl RawProduct {
    /// Create a listing with default unit, step, and no optional fields.
    pub fn new(source: SourceId, name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            price: None,
            price_display: String::new(),
            source,
            link: link.into(),
            img_url: None,
            quantity: 1,
            step: 1,
            availability_text: String::new(),
            search_text: None,
        }
    }

    /// Set the numeric price and its display string.
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        if self.price_display.is_empty() {
            self.price_display = format!("{price:.2}");
        }
        self
    }

    /// Set the availability label.
    pub fn with_availability(mut self, text: impl Into<String>) -> Self {
        self.availability_text = text.into();
        self
    }

    /// Canonical availability state.
    pub fn availability(&self) -> Availability {
        Availability::parse(&self.availability_text)
    }

    /// Lowercased secondary retrieval text.
    pub fn search_text(&self) -> String {
        self.search_text
            .as_deref()
            .unwrap_or(&self.name)
            .to_lowercase()
    }
}

/// A listing with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProduct {
    /// The underlying listing.
    #[serde(flatten)]
    pub product: RawProduct,
    /// Composite similarity score, `>= 0`.
    pub similarity: f64,
}

impl RankedProduct {
    /// Deterministic result order: similarity descending, then source,
    /// name, and link ascending.
    pub fn rank_order(a: &Self, b: &Self) -> Ordering {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product.source.cmp(&b.product.source))
            .then_with(|| a.product.name.cmp(&b.product.name))
            .then_with(|| a.product.link.cmp(&b.product.link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_normalises_case_and_whitespace() {
        let q = Query::parse("  Стакан   БУМАЖНЫЙ 200 ").expect("valid");
        assert_eq!(q.normalized(), "стакан бумажный 200");
        assert_eq!(q.raw(), "Стакан   БУМАЖНЫЙ 200");
        assert_eq!(
            q.tokens().collect::<Vec<_>>(),
            ["стакан", "бумажный", "200"]
        );
    }

    #[test]
    fn empty_query_rejected() {
        assert!(matches!(
            Query::parse(""),
            Err(SearchError::InvalidQuery(_))
        ));
        assert!(matches!(
            Query::parse(" \t\n "),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn availability_from_russian_labels() {
        assert_eq!(Availability::parse("В наличии"), Availability::InStock);
        assert_eq!(
            Availability::parse("Нет в наличии"),
            Availability::OutOfStock
        );
        assert_eq!(Availability::parse("Под заказ"), Availability::Backorder);
        assert_eq!(Availability::parse("Неизвестно"), Availability::Unknown);
        assert_eq!(Availability::parse(""), Availability::Unknown);
    }

    #[test]
    fn availability_from_schema_org() {
        assert_eq!(
            Availability::parse("http://schema.org/InStock"),
            Availability::InStock
        );
        assert_eq!(
            Availability::parse("https://schema.org/OutOfStock"),
            Availability::OutOfStock
        );
        assert_eq!(
            Availability::parse("http://schema.org/PreOrder"),
            Availability::Backorder
        );
    }

    #[test]
    fn availability_serialises_kebab_case() {
        let json = serde_json::to_string(&Availability::OutOfStock).expect("serialize");
        assert_eq!(json, "\"out-of-stock\"");
    }

    #[test]
    fn raw_product_defaults_from_json() {
        let json = r#"{"name":"Крышка","source":"hozka","link":"https://hozka.ru/p/1"}"#;
        let product: RawProduct = serde_json::from_str(json).expect("deserialize");
        assert_eq!(product.quantity, 1);
        assert_eq!(product.step, 1);
        assert!(product.price.is_none());
        assert_eq!(product.source, SourceId::new("hozka"));
        assert_eq!(product.search_text(), "крышка");
    }

    #[test]
    fn rank_order_breaks_ties_by_source_then_name() {
        let make = |source: &str, name: &str, similarity: f64| RankedProduct {
            product: RawProduct::new(
                SourceId::new(source),
                name,
                format!("https://{source}/{name}"),
            ),
            similarity,
        };
        let mut items = vec![
            make("b", "alpha", 90.0),
            make("a", "zeta", 90.0),
            make("a", "beta", 90.0),
            make("c", "top", 120.0),
        ];
        items.sort_by(RankedProduct::rank_order);
        let order: Vec<_> = items.iter().map(|p| p.product.name.as_str()).collect();
        assert_eq!(order, ["top", "beta", "zeta", "alpha"]);
    }

    #[test]
    fn ranked_product_flattens_when_serialised() {
        let ranked = RankedProduct {
            product: RawProduct::new(SourceId::new("gudvin"), "Стакан", "https://g/1")
                .with_price(3.5),
            similarity: 100.0,
        };
        let value = serde_json::to_value(&ranked).expect("serialize");
        assert_eq!(value["name"], "Стакан");
        assert_eq!(value["similarity"], 100.0);
        assert_eq!(value["price_display"], "3.50");
    }
}
