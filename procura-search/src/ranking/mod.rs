//! Relevance ranking of fetched listings against the user's query.
//!
//! Ranking runs in two passes:
//! 1. **Retrieval**: keep candidates whose name or search text contains
//!    any of the query's tokens, lemmas, stems, or their synonyms.
//! 2. **Scoring**: compute a composite similarity (see [`scoring`]),
//!    drop candidates below the threshold, and sort.

pub mod fuzz;
pub mod lexicon;
pub mod morphology;
pub mod scoring;
pub mod text;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::types::{Query, RankedProduct, RawProduct};

pub use lexicon::{
    DictionaryLemmatizer, Lemmatizer, Lexicon, LexiconConfig, SnowballStemmer, Stemmer,
};
pub use morphology::SuffixGuesser;
pub use scoring::{compute_similarity, Prepared};

/// Filters and orders candidate listings for a query.
#[derive(Debug, Clone)]
pub struct Ranker {
    lexicon: Arc<Lexicon>,
    threshold: f64,
}

impl Ranker {
    /// Create a ranker over `lexicon` that drops scores below `threshold`.
    pub fn new(lexicon: Arc<Lexicon>, threshold: f64) -> Self {
        Self { lexicon, threshold }
    }

    /// Minimum similarity kept in results.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The vocabulary this ranker uses.
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Substring conditions a candidate must meet at least one of.
    pub fn retrieval_terms(&self, query: &Query) -> BTreeSet<String> {
        text::retrieval_terms(query.normalized(), &self.lexicon)
    }

    /// Similarity of a single name to `query`.
    pub fn similarity(&self, query: &Query, name: &str) -> f64 {
        compute_similarity(query.normalized(), name, &self.lexicon)
    }

    /// Retrieve, score, threshold, and sort `candidates`.
    ///
    /// The output is deterministic for a given input set: ties on
    /// similarity are broken by source, name, and link.
    pub fn rank(&self, query: &Query, candidates: Vec<RawProduct>) -> Vec<RankedProduct> {
        let terms = self.retrieval_terms(query);
        let prepared_query = Prepared::new(query.normalized(), &self.lexicon);
        let total = candidates.len();

        let mut ranked: Vec<RankedProduct> = candidates
            .into_iter()
            .filter(|product| passes_retrieval(&terms, product))
            .map(|product| {
                let candidate = Prepared::new(&product.name, &self.lexicon);
                let similarity = scoring::score(&prepared_query, &candidate, &self.lexicon);
                RankedProduct {
                    product,
                    similarity,
                }
            })
            .filter(|ranked| ranked.similarity >= self.threshold)
            .collect();

        ranked.sort_by(RankedProduct::rank_order);

        tracing::debug!(
            query = %query,
            candidates = total,
            kept = ranked.len(),
            "ranked candidates"
        );
        ranked
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(Arc::new(Lexicon::default()), 60.0)
    }
}

fn passes_retrieval(terms: &BTreeSet<String>, product: &RawProduct) -> bool {
    let name = product.name.to_lowercase();
    let search_text = product.search_text();
    terms
        .iter()
        .any(|term| name.contains(term.as_str()) || search_text.contains(term.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceId;

    fn product(source: &str, name: &str) -> RawProduct {
        RawProduct::new(
            SourceId::new(source),
            name,
            format!("https://{source}.ru/{}", name.len()),
        )
    }

    #[test]
    fn rank_keeps_relevant_and_drops_unrelated() {
        let ranker = Ranker::default();
        let query = Query::parse("стакан").expect("query");
        let ranked = ranker.rank(
            &query,
            vec![
                product("gudvin", "Стакан бумажный 200мл"),
                product("gudvin", "Вилка столовая"),
                product("hozka", "Крышка пластиковая"),
            ],
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product.name, "Стакан бумажный 200мл");
        assert!(ranked[0].similarity >= 60.0);
    }

    #[test]
    fn retrieval_also_checks_search_text() {
        let ranker = Ranker::new(Arc::new(Lexicon::default()), 0.0);
        let query = Query::parse("топпер").expect("query");
        let mut hidden = product("artplast", "Изделие 12");
        hidden.search_text = Some("Топпер для торта".into());
        let ranked = ranker.rank(&query, vec![hidden, product("artplast", "Вилка")]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].product.name, "Изделие 12");
    }

    #[test]
    fn rank_is_sorted_and_deterministic() {
        let ranker = Ranker::default();
        let query = Query::parse("стакан бумажный").expect("query");
        let candidates = vec![
            product("promispb", "Стакан бумажный 350мл"),
            product("gudvin", "Стакан бумажный"),
            product("hozka", "Стакан бумажный 350мл"),
            product("gudvin", "Бумажный стакан для кофе"),
        ];
        let first = ranker.rank(&query, candidates.clone());
        let mut reversed = candidates;
        reversed.reverse();
        let second = ranker.rank(&query, reversed);
        assert_eq!(first, second);
        assert!(first
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(first[0].product.name, "Стакан бумажный");
    }

    #[test]
    fn inflected_queries_match_dictionary_forms() {
        let ranker = Ranker::default();
        let cases = [
            ("салфеток", "Салфетка бумажная"),
            ("тарелок", "Тарелка одноразовая"),
            ("перчаток", "Перчатки нитриловые"),
            ("вилками", "Вилка столовая"),
        ];
        for (query, name) in cases {
            let query = Query::parse(query).expect("query");
            let ranked = ranker.rank(&query, vec![product("gudvin", name)]);
            assert_eq!(ranked.len(), 1, "{query} dropped {name}");
            // 100 + 10 (contains) + 20 (prefix) + 15 (first token).
            let similarity = ranked[0].similarity;
            assert!((similarity - 145.0).abs() < 1e-9, "{query}: {similarity}");
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let query = Query::parse("стакан").expect("query");
        let candidate = product("gudvin", "Стакан бумажный 200мл");
        let score = Ranker::default().similarity(&query, &candidate.name);
        let ranker = Ranker::new(Arc::new(Lexicon::default()), score);
        assert_eq!(ranker.rank(&query, vec![candidate]).len(), 1);
    }

    #[test]
    fn empty_candidate_list() {
        let query = Query::parse("стакан").expect("query");
        assert!(Ranker::default().rank(&query, Vec::new()).is_empty());
    }
}
