//! Language tables used by the ranker.
//!
//! A [`Lexicon`] bundles the synonym table, stop words, boost terms, and
//! the lemmatiser/stemmer pair. It is built once at startup (from the
//! built-in tables or from a [`LexiconConfig`]) and shared read-only by
//! every ranking call.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::morphology::{fold_word, read_opencorpora, SuffixGuesser};
use crate::error::SearchError;

/// Maps a word form to its dictionary normal forms.
pub trait Lemmatizer: Send + Sync {
    /// All normal forms of `token`, most likely first. Never empty: an
    /// unknown word is its own normal form.
    fn normal_forms(&self, token: &str) -> Vec<String>;

    /// The most likely normal form of `token`.
    fn primary(&self, token: &str) -> String {
        self.normal_forms(token)
            .into_iter()
            .next()
            .unwrap_or_else(|| token.to_string())
    }
}

/// Reduces a word to its stem.
pub trait Stemmer: Send + Sync {
    /// Stem of `token`.
    fn stem(&self, token: &str) -> String;
}

/// Lemmatiser backed by a word-form table.
///
/// Words missing from the table are predicted by a [`SuffixGuesser`];
/// a word the guesser cannot place is its own normal form.
#[derive(Debug, Clone, Default)]
pub struct DictionaryLemmatizer {
    forms: HashMap<String, Vec<String>>,
    guesser: SuffixGuesser,
}

impl DictionaryLemmatizer {
    /// Build from `(word form, normal forms)` pairs, without a guesser.
    /// Keys are case-folded.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        Self::default().with_entries(entries)
    }

    /// Built-in table for packaging and catering supply vocabulary, with
    /// the built-in ending guesser.
    pub fn builtin() -> Self {
        Self::new(builtin_entries()).with_guesser(SuffixGuesser::builtin())
    }

    /// Full dictionary from an OpenCorpora plain-text export. The guesser
    /// is learned from the dictionary itself.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if `reader` fails or holds no word
    /// forms.
    pub fn from_opencorpora<R: BufRead>(reader: R) -> Result<Self, SearchError> {
        let forms = read_opencorpora(reader)
            .map_err(|e| SearchError::Config(format!("failed to read morphology: {e}")))?;
        if forms.is_empty() {
            return Err(SearchError::Config(
                "morphology dictionary has no word forms".into(),
            ));
        }
        let pairs = forms
            .iter()
            .flat_map(|(form, lemmas)| lemmas.iter().map(move |l| (form.as_str(), l.as_str())));
        let guesser = SuffixGuesser::learn(pairs);
        Ok(Self { forms, guesser })
    }

    /// [`from_opencorpora`](Self::from_opencorpora) over the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file cannot be opened or read.
    pub fn open_opencorpora(path: &Path) -> Result<Self, SearchError> {
        let file = File::open(path).map_err(|e| {
            SearchError::Config(format!("cannot open morphology {}: {e}", path.display()))
        })?;
        let lemmatizer = Self::from_opencorpora(BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            forms = lemmatizer.len(),
            endings = lemmatizer.guesser.len(),
            "morphology dictionary loaded"
        );
        Ok(lemmatizer)
    }

    /// Add `(word form, normal forms)` pairs, replacing known forms.
    pub fn with_entries<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        for (form, lemmas) in entries {
            let lemmas: Vec<String> = lemmas.into_iter().map(|l| fold_word(l.as_ref())).collect();
            if !lemmas.is_empty() {
                self.forms.insert(fold_word(form.as_ref()), lemmas);
            }
        }
        self
    }

    /// Replace the guesser used for unknown words.
    pub fn with_guesser(mut self, guesser: SuffixGuesser) -> Self {
        self.guesser = guesser;
        self
    }

    /// Number of known word forms.
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl Lemmatizer for DictionaryLemmatizer {
    fn normal_forms(&self, token: &str) -> Vec<String> {
        let folded = fold_word(token);
        if let Some(lemmas) = self.forms.get(&folded) {
            return lemmas.clone();
        }
        let guessed = self.guesser.guess(&folded);
        if guessed.is_empty() {
            vec![token.to_string()]
        } else {
            guessed
        }
    }
}

/// Snowball stemmer for a fixed language.
pub struct SnowballStemmer {
    inner: rust_stemmers::Stemmer,
}

impl SnowballStemmer {
    /// Russian Snowball stemmer.
    pub fn russian() -> Self {
        Self {
            inner: rust_stemmers::Stemmer::create(rust_stemmers::Algorithm::Russian),
        }
    }
}

impl Stemmer for SnowballStemmer {
    fn stem(&self, token: &str) -> String {
        self.inner.stem(token).into_owned()
    }
}

impl fmt::Debug for SnowballStemmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SnowballStemmer")
    }
}

/// Word tables as they appear in configuration.
///
/// Any table left out falls back to the built-in one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconConfig {
    /// Token → synonym phrases; the first phrase is the canonical form.
    pub synonyms: Option<BTreeMap<String, Vec<String>>>,
    /// Tokens that never count as required.
    pub stop_words: Option<Vec<String>>,
    /// Token → additive bonus when present in both query and candidate.
    pub boost_terms: Option<BTreeMap<String, f64>>,
    /// Extra word form → normal forms entries, layered over the built-in table.
    pub lemmas: BTreeMap<String, Vec<String>>,
    /// OpenCorpora plain-text dictionary (`dict.opcorpora.txt`) used
    /// instead of the built-in word forms.
    pub morphology: Option<PathBuf>,
}

/// Immutable ranking vocabulary.
pub struct Lexicon {
    synonyms: BTreeMap<String, Vec<String>>,
    stop_words: BTreeSet<String>,
    boost_terms: BTreeMap<String, f64>,
    lemmatizer: Arc<dyn Lemmatizer>,
    stemmer: Arc<dyn Stemmer>,
}

impl Lexicon {
    /// Assemble a lexicon from explicit parts. Keys are case-folded.
    pub fn new(
        synonyms: BTreeMap<String, Vec<String>>,
        stop_words: impl IntoIterator<Item = String>,
        boost_terms: BTreeMap<String, f64>,
        lemmatizer: Arc<dyn Lemmatizer>,
        stemmer: Arc<dyn Stemmer>,
    ) -> Self {
        Self {
            synonyms: synonyms
                .into_iter()
                .filter(|(_, phrases)| !phrases.is_empty())
                .map(|(k, v)| {
                    let phrases = v.into_iter().map(|p| p.to_lowercase()).collect();
                    (k.to_lowercase(), phrases)
                })
                .collect(),
            stop_words: stop_words.into_iter().map(|w| w.to_lowercase()).collect(),
            boost_terms: boost_terms
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            lemmatizer,
            stemmer,
        }
    }

    /// Build from configuration, falling back to built-in tables.
    ///
    /// With `morphology` set, the OpenCorpora dictionary at that path
    /// replaces the built-in word forms and ending guesser. The built-in
    /// forms and then the configured `lemmas` are layered on top.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the morphology dictionary cannot
    /// be loaded.
    pub fn from_config(config: &LexiconConfig) -> Result<Self, SearchError> {
        let lemmatizer = match &config.morphology {
            Some(path) => {
                let dictionary = DictionaryLemmatizer::open_opencorpora(path)?;
                dictionary.with_entries(builtin_entries())
            }
            None => DictionaryLemmatizer::builtin(),
        };
        let lemmatizer = lemmatizer.with_entries(config.lemmas.iter());
        Ok(Self::from_tables(config, lemmatizer))
    }

    fn from_tables(config: &LexiconConfig, lemmatizer: DictionaryLemmatizer) -> Self {
        let synonyms = config.synonyms.clone().unwrap_or_else(default_synonyms);
        let stop_words = config
            .stop_words
            .clone()
            .unwrap_or_else(|| DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect());
        let boost_terms = config
            .boost_terms
            .clone()
            .unwrap_or_else(default_boost_terms);

        Self::new(
            synonyms,
            stop_words,
            boost_terms,
            Arc::new(lemmatizer),
            Arc::new(SnowballStemmer::russian()),
        )
    }

    /// Synonym phrases for `token`, if it is a table key.
    pub fn synonyms(&self, token: &str) -> Option<&[String]> {
        self.synonyms.get(token).map(Vec::as_slice)
    }

    /// Canonical replacement for `token`: the first synonym of a table key.
    pub fn canonical(&self, token: &str) -> Option<&str> {
        self.synonyms
            .get(token)
            .and_then(|phrases| phrases.first())
            .map(String::as_str)
    }

    /// Whether `token` is a stop word.
    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    /// Configured boost terms.
    pub fn boost_terms(&self) -> impl Iterator<Item = (&str, f64)> {
        self.boost_terms.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// The lemmatiser.
    pub fn lemmatizer(&self) -> &dyn Lemmatizer {
        self.lemmatizer.as_ref()
    }

    /// The stemmer.
    pub fn stemmer(&self) -> &dyn Stemmer {
        self.stemmer.as_ref()
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::from_tables(
            &LexiconConfig::default(),
            DictionaryLemmatizer::builtin(),
        )
    }
}

impl fmt::Debug for Lexicon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexicon")
            .field("synonyms", &self.synonyms.len())
            .field("stop_words", &self.stop_words)
            .field("boost_terms", &self.boost_terms)
            .finish_non_exhaustive()
    }
}

/// Default stop words (Russian prepositions and conjunctions).
pub const DEFAULT_STOP_WORDS: &[&str] = &["для", "и", "на", "в", "с", "по", "без", "от"];

/// Default synonym table. The first phrase of each entry is its canonical form.
const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "пергамент",
        &["бумага для выпечки", "бумага для выпекания", "бумага"],
    ),
    (
        "бумага",
        &[
            "пергамент",
            "бумага для выпечки",
            "бумага для выпекания",
            "бумага для принтера",
        ],
    ),
    ("крышка", &["накрытие", "топпер"]),
    ("мешалка", &["размешиватель"]),
    ("контейнер для супа", &["супница"]),
    ("купольная", &["купол"]),
    ("двухслойные", &["двухслойные", "2 слойные", "2-слойные"]),
    (
        "стакан",
        &["чашка", "пластиковый стакан", "стеклянный стакан"],
    ),
];

fn default_synonyms() -> BTreeMap<String, Vec<String>> {
    DEFAULT_SYNONYMS
        .iter()
        .map(|(key, phrases)| {
            (
                key.to_string(),
                phrases.iter().map(|p| p.to_string()).collect(),
            )
        })
        .collect()
}

fn default_boost_terms() -> BTreeMap<String, f64> {
    BTreeMap::from([("стакан".to_string(), 20.0)])
}

/// Built-in word forms for the supply catalogue vocabulary.
const DEFAULT_LEMMAS: &[(&str, &[&str])] = &[
    ("стаканы", &["стакан"]),
    ("стакана", &["стакан"]),
    ("стаканов", &["стакан"]),
    ("стаканам", &["стакан"]),
    ("стаканчик", &["стаканчик"]),
    ("стаканчики", &["стаканчик"]),
    ("крышки", &["крышка"]),
    ("крышку", &["крышка"]),
    ("крышек", &["крышка"]),
    ("крышкой", &["крышка"]),
    ("пакеты", &["пакет"]),
    ("пакета", &["пакет"]),
    ("пакетов", &["пакет"]),
    ("контейнеры", &["контейнер"]),
    ("контейнера", &["контейнер"]),
    ("контейнеров", &["контейнер"]),
    ("коробки", &["коробка"]),
    ("коробок", &["коробка"]),
    ("вилки", &["вилка"]),
    ("ложки", &["ложка"]),
    ("ножи", &["нож"]),
    ("мешок", &["мешок"]),
    ("мешки", &["мешок"]),
    ("мешков", &["мешок"]),
    ("уголок", &["уголок"]),
    ("уголки", &["уголок"]),
    ("лоток", &["лоток"]),
    ("лотки", &["лоток"]),
    ("лотков", &["лоток"]),
    ("порошок", &["порошок"]),
    ("брусок", &["брусок"]),
    ("совок", &["совок"]),
    ("платок", &["платок"]),
    ("салфетки", &["салфетка"]),
    ("перчатки", &["перчатка"]),
    ("трубочки", &["трубочка"]),
    ("тарелки", &["тарелка"]),
    ("тарталетки", &["тарталетка"]),
    ("наклейки", &["наклейка"]),
    ("ленты", &["лента"]),
    ("средства", &["средство"]),
    ("бахилы", &["бахила"]),
    ("шапочки", &["шапочка"]),
    ("щетки", &["щетка"]),
    ("губки", &["губка"]),
    ("кольца", &["кольцо"]),
    ("зубочистки", &["зубочистка"]),
    ("полотенца", &["полотенце"]),
    ("бумаги", &["бумага"]),
    ("бумагу", &["бумага"]),
    ("бумажные", &["бумажный"]),
    ("бумажная", &["бумажный"]),
    ("бумажное", &["бумажный"]),
    ("пластиковые", &["пластиковый"]),
    ("пластиковая", &["пластиковый"]),
    ("пластиковое", &["пластиковый"]),
    ("одноразовые", &["одноразовый"]),
    ("одноразовая", &["одноразовый"]),
    ("одноразовое", &["одноразовый"]),
    ("фасовочные", &["фасовочный"]),
    ("фасовочный", &["фасовочный"]),
    ("мусорные", &["мусорный"]),
    ("мусорный", &["мусорный"]),
    ("двухслойные", &["двухслойный"]),
    ("купольная", &["купольный"]),
    ("кондитерский", &["кондитерский"]),
    ("стали", &["сталь", "стать"]),
];

fn builtin_entries() -> impl Iterator<Item = (&'static str, &'static [&'static str])> {
    DEFAULT_LEMMAS.iter().copied()
}
