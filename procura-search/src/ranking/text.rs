//! Text preparation shared by retrieval and scoring.

use std::collections::BTreeSet;

use super::lexicon::Lexicon;

/// Case-fold `text` and split it into runs of word characters
/// (letters, digits, underscore).
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replace every token that is a synonym-table key by its canonical phrase.
pub fn canonicalize(text: &str, lexicon: &Lexicon) -> String {
    tokenize(text)
        .into_iter()
        .map(|token| match lexicon.canonical(&token) {
            Some(canonical) => canonical.to_string(),
            None => token,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace every token by its most likely normal form, keeping order.
pub fn normalize(text: &str, lexicon: &Lexicon) -> String {
    tokenize(text)
        .iter()
        .map(|token| lexicon.lemmatizer().primary(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every normal form of every token.
pub fn lemmatize_tokens(tokens: &[String], lexicon: &Lexicon) -> BTreeSet<String> {
    tokens
        .iter()
        .flat_map(|token| lexicon.lemmatizer().normal_forms(token))
        .collect()
}

/// Stem of every token.
pub fn stem_tokens(tokens: &[String], lexicon: &Lexicon) -> BTreeSet<String> {
    tokens
        .iter()
        .map(|token| lexicon.stemmer().stem(token))
        .collect()
}

/// `tokens` plus, for each synonym-table key among them, its phrases and
/// their normal forms.
pub fn expand_synonyms<'a, I>(tokens: I, lexicon: &Lexicon) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut expanded = BTreeSet::new();
    for token in tokens {
        expanded.insert(token.clone());
        if let Some(phrases) = lexicon.synonyms(&token.to_lowercase()) {
            for phrase in phrases {
                expanded.insert(phrase.clone());
                expanded.extend(lexicon.lemmatizer().normal_forms(phrase));
            }
        }
    }
    expanded
}

/// Retrieval conditions for `query`: raw tokens, lemmas, stems of both,
/// and the synonym expansion of each of the three sets.
pub fn retrieval_terms(query: &str, lexicon: &Lexicon) -> BTreeSet<String> {
    let tokens = tokenize(query);
    let lemmas: Vec<String> = lemmatize_tokens(&tokens, lexicon).into_iter().collect();
    let mut stems = stem_tokens(&tokens, lexicon);
    stems.extend(stem_tokens(&lemmas, lexicon));

    let mut terms = expand_synonyms(&tokens, lexicon);
    terms.extend(expand_synonyms(&lemmas, lexicon));
    terms.extend(expand_synonyms(&stems, lexicon));
    terms
}
