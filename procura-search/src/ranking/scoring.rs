//! Composite similarity between a query and a product name.
//!
//! Both sides are canonicalised through the synonym table and normalised
//! to lemmas before comparison. The score is:
//!
//! ```text
//! score = (token_set_ratio(q, p) + bonuses) * multiplier
//! ```
//!
//! Bonuses:
//! - +50 when `q == p`
//! - +10 when either contains the other
//! - +20 when `p` starts with `q` followed by a space, or equals it
//! - +15 when the first tokens match
//! - +N for every boost term present in both token lists
//!
//! `multiplier` is the weakest link among the query's required (non-stop)
//! tokens: each one is scored against its best match in `p`, and the
//! minimum over all of them, divided by 100, scales the total. A query
//! word with no counterpart in the name therefore sinks the whole score.

use super::fuzz::{ratio, token_set_ratio};
use super::lexicon::Lexicon;
use super::text::{canonicalize, normalize, tokenize};

const EXACT_BONUS: f64 = 50.0;
const CONTAINS_BONUS: f64 = 10.0;
const PREFIX_BONUS: f64 = 20.0;
const FIRST_TOKEN_BONUS: f64 = 15.0;

/// Tokens longer than this count as a full match when one prefixes the other.
const ABBREVIATION_MIN_CHARS: usize = 3;

/// A string reduced to the form the scorer compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    normalized: String,
    tokens: Vec<String>,
}

impl Prepared {
    /// Canonicalise and normalise `text`.
    pub fn new(text: &str, lexicon: &Lexicon) -> Self {
        let normalized = normalize(&canonicalize(text, lexicon), lexicon);
        let tokens = tokenize(&normalized);
        Self { normalized, tokens }
    }

    /// Normalised text.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Tokens of the normalised text.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Score a prepared candidate against a prepared query.
pub fn score(query: &Prepared, candidate: &Prepared, lexicon: &Lexicon) -> f64 {
    let q = query.normalized.as_str();
    let p = candidate.normalized.as_str();

    let mut base = token_set_ratio(q, p);

    if q == p {
        base += EXACT_BONUS;
    }
    if p.contains(q) || q.contains(p) {
        base += CONTAINS_BONUS;
    }
    if q == p || p.strip_prefix(q).is_some_and(|rest| rest.starts_with(' ')) {
        base += PREFIX_BONUS;
    }
    if let (Some(qt), Some(pt)) = (query.tokens.first(), candidate.tokens.first()) {
        if qt == pt {
            base += FIRST_TOKEN_BONUS;
        }
    }
    for (term, bonus) in lexicon.boost_terms() {
        if query.tokens.iter().any(|t| t == term) && candidate.tokens.iter().any(|t| t == term) {
            base += bonus;
        }
    }

    base * required_token_multiplier(&query.tokens, &candidate.tokens, lexicon)
}

/// Weakest per-token match of the query's required tokens, in `0.0..=1.0`.
fn required_token_multiplier(query: &[String], candidate: &[String], lexicon: &Lexicon) -> f64 {
    let required: Vec<&String> = query.iter().filter(|t| !lexicon.is_stop_word(t)).collect();
    if required.is_empty() {
        return 1.0;
    }
    if candidate.is_empty() {
        return 0.0;
    }

    required
        .iter()
        .map(|rt| {
            candidate
                .iter()
                .map(|pt| token_match(rt, pt))
                .fold(0.0_f64, f64::max)
                / 100.0
        })
        .fold(f64::INFINITY, f64::min)
}

/// Similarity of two single tokens, treating abbreviations as exact.
fn token_match(a: &str, b: &str) -> f64 {
    let long_enough = a.chars().count() > ABBREVIATION_MIN_CHARS
        && b.chars().count() > ABBREVIATION_MIN_CHARS;
    if long_enough && (a.starts_with(b) || b.starts_with(a)) {
        100.0
    } else {
        ratio(a, b)
    }
}

/// Score `name` against `query` in one call.
pub fn compute_similarity(query: &str, name: &str, lexicon: &Lexicon) -> f64 {
    score(
        &Prepared::new(query, lexicon),
        &Prepared::new(name, lexicon),
        lexicon,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::lexicon::{DictionaryLemmatizer, SnowballStemmer};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn subset_name_gets_full_base_and_prefix_bonuses() {
        let lexicon = Lexicon::default();
        // "стакан" canonicalises to "чашка" on both sides:
        // 100 + 10 (contains) + 20 (prefix) + 15 (first token), multiplier 1.
        let score = compute_similarity("стакан", "Стакан бумажный 200мл", &lexicon);
        assert!(approx(score, 145.0));
    }

    #[test]
    fn exact_match_collects_every_bonus() {
        let lexicon = Lexicon::default();
        let score = compute_similarity("Вилка столовая", "вилка   СТОЛОВАЯ", &lexicon);
        assert!(approx(score, 100.0 + 50.0 + 10.0 + 20.0 + 15.0));
    }

    #[test]
    fn missing_query_word_sinks_the_score() {
        let lexicon = Lexicon::default();
        let score = compute_similarity("стакан крышка", "Крышка пластиковая", &lexicon);
        assert!(score < 60.0, "score {score}");
    }

    #[test]
    fn abbreviations_count_as_full_token_match() {
        assert!(approx(token_match("пласт", "пластиковый"), 100.0));
        assert!(token_match("пла", "пластиковый") < 100.0);
    }

    #[test]
    fn stop_words_are_not_required() {
        let lexicon = Lexicon::default();
        let with_stop = compute_similarity("пакет для мусора", "Пакет мусора 120л", &lexicon);
        assert!(with_stop > 0.0);
        let query = Prepared::new("для и на", &lexicon);
        let candidate = Prepared::new("вилка", &lexicon);
        assert!(approx(
            required_token_multiplier(query.tokens(), candidate.tokens(), &lexicon),
            1.0
        ));
    }

    #[test]
    fn empty_candidate_scores_zero() {
        let lexicon = Lexicon::default();
        assert!(approx(compute_similarity("стакан", "", &lexicon), 0.0));
    }

    #[test]
    fn boost_terms_apply_when_both_sides_contain_them() {
        let lexicon = Lexicon::new(
            BTreeMap::new(),
            Vec::new(),
            BTreeMap::from([("стакан".to_string(), 20.0)]),
            Arc::new(DictionaryLemmatizer::builtin()),
            Arc::new(SnowballStemmer::russian()),
        );
        // No synonym table, so "стакан" survives canonicalisation.
        let boosted = compute_similarity("стаканы", "Стакан бумажный", &lexicon);
        assert!(approx(boosted, 100.0 + 10.0 + 20.0 + 15.0 + 20.0));
    }

    #[test]
    fn scoring_is_deterministic() {
        let lexicon = Lexicon::default();
        let a = compute_similarity("контейнер суп", "Контейнер для супа 500мл", &lexicon);
        let b = compute_similarity("контейнер суп", "Контейнер для супа 500мл", &lexicon);
        assert!(approx(a, b));
    }
}
