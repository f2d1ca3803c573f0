//! Per-source deduplication of listings.

use std::collections::HashSet;

use crate::types::RawProduct;

use super::url_normalize::normalize_url;

/// Drop listings whose normalised link was already seen, keeping the
/// first occurrence and the original order.
///
/// Only call this on a single source's list: the same link from two
/// different sources is two different offers.
pub fn dedup_by_link(products: Vec<RawProduct>) -> Vec<RawProduct> {
    let mut seen = HashSet::with_capacity(products.len());
    products
        .into_iter()
        .filter(|product| seen.insert(normalize_url(&product.link)))
        .collect()
}
