//! Result presentation: per-source grouping and caller-side filters.
//!
//! [`GroupedResults`] is what the service returns and what the cache
//! stores. Every source that was searched has a group, even an empty
//! one, so a caller can tell "searched, found nothing" from "not
//! searched".

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{Availability, RankedProduct, SourceId};

/// A ranked listing as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    /// Catalogue-side identifier, if any.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Numeric price; `None` means "price on request".
    pub price: Option<f64>,
    /// Price as formatted by the catalogue.
    pub price_display: String,
    /// Listing URL.
    pub link: String,
    /// Image reference.
    pub img_url: Option<String>,
    /// Items per pack.
    pub quantity: u32,
    /// Minimum order step.
    pub step: u32,
    /// Canonical stock state.
    pub availability: Availability,
    /// Stock label as published.
    pub availability_text: String,
    /// Similarity to the query that produced it.
    pub similarity: f64,
}

impl From<RankedProduct> for ProductView {
    fn from(ranked: RankedProduct) -> Self {
        let availability = ranked.product.availability();
        let p = ranked.product;
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            price_display: p.price_display,
            link: p.link,
            img_url: p.img_url,
            quantity: p.quantity,
            step: p.step,
            availability,
            availability_text: p.availability_text,
            similarity: ranked.similarity,
        }
    }
}

/// One source's listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceGroup {
    /// Always equal to `products.len()`.
    pub count: usize,
    /// Listings in ranking order.
    pub products: Vec<ProductView>,
}

impl SourceGroup {
    /// Build a group, deriving `count`.
    pub fn new(products: Vec<ProductView>) -> Self {
        Self {
            count: products.len(),
            products,
        }
    }

    /// Whether the group has no listings.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    fn retain(&self, keep: impl Fn(&ProductView) -> bool) -> Self {
        Self::new(self.products.iter().filter(|&p| keep(p)).cloned().collect())
    }
}

/// Ranked listings grouped by source, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupedResults {
    groups: BTreeMap<SourceId, SourceGroup>,
}

impl GroupedResults {
    /// Group `ranked` by source.
    ///
    /// Every id in `sources` gets a group, possibly empty. Within a group,
    /// listings keep the order of `ranked`.
    pub fn group(ranked: Vec<RankedProduct>, sources: &[SourceId]) -> Self {
        let mut buckets: BTreeMap<SourceId, Vec<ProductView>> = sources
            .iter()
            .map(|source| (source.clone(), Vec::new()))
            .collect();
        for product in ranked {
            buckets
                .entry(product.product.source.clone())
                .or_default()
                .push(product.into());
        }
        Self {
            groups: buckets
                .into_iter()
                .map(|(source, products)| (source, SourceGroup::new(products)))
                .collect(),
        }
    }

    /// The group for `source`.
    pub fn get(&self, source: &SourceId) -> Option<&SourceGroup> {
        self.groups.get(source)
    }

    /// Iterate over `(source, group)` pairs in source order.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceId, &SourceGroup)> {
        self.groups.iter()
    }

    /// Sources with a group.
    pub fn sources(&self) -> Vec<SourceId> {
        self.groups.keys().cloned().collect()
    }

    /// Total listings across all groups.
    pub fn total(&self) -> usize {
        self.groups.values().map(|g| g.count).sum()
    }

    /// Sources whose group is empty.
    pub fn empty_sources(&self) -> Vec<SourceId> {
        self.groups
            .iter()
            .filter(|(_, group)| group.is_empty())
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// A copy where each non-empty group of `update` replaces the
    /// corresponding empty group here. Non-empty groups here are never
    /// overwritten, and empty groups in `update` change nothing.
    pub fn merge_non_empty(&self, update: &GroupedResults) -> Self {
        let mut merged = self.clone();
        for (source, group) in &update.groups {
            if group.is_empty() {
                continue;
            }
            let slot = merged.groups.entry(source.clone()).or_default();
            if slot.is_empty() {
                *slot = group.clone();
            }
        }
        merged
    }

    /// A copy keeping only listings whose case-folded name contains every
    /// one of `tokens`. Every group survives, possibly empty.
    pub fn filter_by_tokens(&self, tokens: &[String]) -> Self {
        self.map_groups(|group| {
            group.retain(|product| {
                let name = product.name.to_lowercase();
                tokens.iter().all(|token| name.contains(token.as_str()))
            })
        })
    }

    fn map_groups(&self, f: impl Fn(&SourceGroup) -> SourceGroup) -> Self {
        Self {
            groups: self
                .groups
                .iter()
                .map(|(source, group)| (source.clone(), f(group)))
                .collect(),
        }
    }
}

/// Listing order within each group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Ranking order.
    #[default]
    Relevance,
    /// Cheapest first; unpriced listings last.
    PriceAsc,
    /// Most expensive first; unpriced listings last.
    PriceDesc,
}

/// Caller-side view options applied to a result after retrieval.
///
/// Never stored in the cache: the same cached result serves every filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultFilter {
    /// Keep only listings that are in stock.
    pub available_only: bool,
    /// Inclusive lower price bound; excludes unpriced listings.
    pub min_price: Option<f64>,
    /// Inclusive upper price bound; excludes unpriced listings.
    pub max_price: Option<f64>,
    /// Listing order within each group.
    pub sort: SortOrder,
}

impl ResultFilter {
    /// Whether applying this filter would change nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the filter to every group.
    pub fn apply(&self, results: &GroupedResults) -> GroupedResults {
        results.map_groups(|group| {
            let mut kept = group.retain(|product| self.keeps(product));
            match self.sort {
                SortOrder::Relevance => {}
                SortOrder::PriceAsc => kept
                    .products
                    .sort_by(|a, b| compare_prices(a.price, b.price, false)),
                SortOrder::PriceDesc => kept
                    .products
                    .sort_by(|a, b| compare_prices(a.price, b.price, true)),
            }
            kept
        })
    }

    fn keeps(&self, product: &ProductView) -> bool {
        if self.available_only && product.availability != Availability::InStock {
            return false;
        }
        if self.min_price.is_none() && self.max_price.is_none() {
            return true;
        }
        let Some(price) = product.price else {
            return false;
        };
        self.min_price.is_none_or(|min| price >= min)
            && self.max_price.is_none_or(|max| price <= max)
    }
}

/// Price order with unpriced listings always last. Stable sorts keep
/// ranking order among equal prices.
fn compare_prices(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
