//! Word-form dictionaries and normal-form prediction for unknown words.
//!
//! A dictionary maps each inflected form to its normal forms. Words it
//! does not know are handled by a [`SuffixGuesser`], which predicts the
//! normal form from the word's ending:
//!
//! ```text
//! салфеток  ─ ending "ок"   ─ strip 2, append "ка"  → салфетка
//! вилками   ─ ending "ками" ─ strip 4, append "ка"  → вилка
//! нитриловые ─ ending "ые"  ─ strip 2, append "ый"  → нитриловый
//! ```
//!
//! The full Russian dictionary is read from the OpenCorpora plain-text
//! export (`dict.opcorpora.txt`). A guesser learned from that dictionary
//! replaces the built-in ending table.

use std::collections::HashMap;
use std::io::BufRead;

/// Longest word ending the guesser keys on.
const MAX_SUFFIX_CHARS: usize = 5;

/// Shortest stem a prediction may leave.
const MIN_STEM_CHARS: usize = 3;

/// Normal forms returned for one predicted word.
const MAX_PREDICTIONS: usize = 3;

/// Built-in endings for the catalogue vocabulary. Each ending lists the
/// normal-form endings that replace it, most likely first.
const BUILTIN_ENDINGS: &[(&str, &[&str])] = &[
    // Feminine nouns in -ка: вилка, салфетка, упаковка.
    ("ками", &["ка"]),
    ("ках", &["ка"]),
    ("кам", &["ка"]),
    ("кой", &["ка", "кий"]),
    ("ку", &["ка"]),
    ("ки", &["ка"]),
    ("еек", &["ейка"]),
    ("ок", &["ка", "ок"]),
    ("ек", &["ка", "ек"]),
    // Masculine nouns on a consonant: стакан, пакет, контейнер.
    ("ами", &["", "а"]),
    ("ах", &["", "а"]),
    ("ов", &[""]),
    ("ом", &[""]),
    ("ы", &["", "а"]),
    // Adjectives: бумажный, одноразовый, кондитерский.
    ("ая", &["ый"]),
    ("ое", &["ый"]),
    ("ые", &["ый"]),
    ("ых", &["ый"]),
    ("ым", &["ый"]),
    ("ыми", &["ый"]),
    ("ую", &["ый"]),
    ("ого", &["ый"]),
    ("ому", &["ый"]),
    ("ной", &["ный"]),
    ("вой", &["вый"]),
    ("кая", &["кий"]),
    ("кие", &["кий"]),
    ("ких", &["кий"]),
    ("ким", &["кий"]),
    ("кими", &["кий"]),
    ("кую", &["кий"]),
    ("кое", &["кий"]),
    ("кого", &["кий"]),
    ("яя", &["ий"]),
];

/// How a word form turns into a normal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Rewrite {
    /// Characters removed from the end of the word form.
    strip: usize,
    /// Appended to what is left.
    append: String,
}

/// Predicts normal forms from word endings.
#[derive(Debug, Clone, Default)]
pub struct SuffixGuesser {
    /// Ending → rewrites, most frequent first.
    rules: HashMap<String, Vec<(Rewrite, u32)>>,
}

impl SuffixGuesser {
    /// Guesser over the built-in ending table.
    pub fn builtin() -> Self {
        let rules = BUILTIN_ENDINGS
            .iter()
            .map(|(ending, lemma_endings)| {
                let strip = ending.chars().count();
                let weight = lemma_endings.len() as u32;
                let rewrites = lemma_endings
                    .iter()
                    .zip(0u32..)
                    .map(|(append, rank)| {
                        let rewrite = Rewrite {
                            strip,
                            append: (*append).to_string(),
                        };
                        (rewrite, weight - rank)
                    })
                    .collect();
                (ending.to_string(), rewrites)
            })
            .collect();
        Self { rules }
    }

    /// Learn endings from `(word form, normal form)` pairs.
    ///
    /// Every pair votes for its rewrite under each of the form's endings
    /// that cover the changed part, up to five characters long.
    pub fn learn<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut votes: HashMap<String, HashMap<Rewrite, u32>> = HashMap::new();
        for (form, lemma) in pairs {
            let form: Vec<char> = form.chars().collect();
            let lemma: Vec<char> = lemma.chars().collect();
            let common = form.iter().zip(&lemma).take_while(|(a, b)| a == b).count();
            let rewrite = Rewrite {
                strip: form.len() - common,
                append: lemma[common..].iter().collect(),
            };
            let longest = MAX_SUFFIX_CHARS.min(form.len().saturating_sub(1));
            for k in rewrite.strip.max(1)..=longest {
                let ending: String = form[form.len() - k..].iter().collect();
                *votes
                    .entry(ending)
                    .or_default()
                    .entry(rewrite.clone())
                    .or_insert(0) += 1;
            }
        }

        let rules = votes
            .into_iter()
            .map(|(ending, rewrites)| {
                let mut rewrites: Vec<(Rewrite, u32)> = rewrites.into_iter().collect();
                rewrites.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                (ending, rewrites)
            })
            .collect();
        Self { rules }
    }

    /// Predicted normal forms of `word`, most likely first.
    ///
    /// Empty when `word` is not a lowercase Cyrillic word longer than
    /// three letters, or when none of its endings is known. The longest
    /// known ending wins.
    pub fn guess(&self, word: &str) -> Vec<String> {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() <= MIN_STEM_CHARS || !chars.iter().copied().all(is_cyrillic) {
            return Vec::new();
        }

        let longest = MAX_SUFFIX_CHARS.min(chars.len() - 1);
        for k in (1..=longest).rev() {
            let ending: String = chars[chars.len() - k..].iter().collect();
            let Some(rewrites) = self.rules.get(&ending) else {
                continue;
            };
            let mut forms: Vec<String> = Vec::new();
            for (rewrite, _) in rewrites {
                let stem = chars.len() - rewrite.strip;
                if stem < MIN_STEM_CHARS {
                    continue;
                }
                let form: String = chars[..stem]
                    .iter()
                    .copied()
                    .chain(rewrite.append.chars())
                    .collect();
                if !forms.contains(&form) {
                    forms.push(form);
                }
                if forms.len() == MAX_PREDICTIONS {
                    break;
                }
            }
            if !forms.is_empty() {
                return forms;
            }
        }
        Vec::new()
    }

    /// Number of known endings.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no ending is known.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Lowercase `word` and spell `ё` as `е`, the way dictionary keys are stored.
pub fn fold_word(word: &str) -> String {
    word.to_lowercase().replace('ё', "е")
}

fn is_cyrillic(c: char) -> bool {
    ('а'..='я').contains(&c) || c == 'ё'
}

/// Read the word forms of an OpenCorpora plain-text dictionary.
///
/// The export is a sequence of blank-line separated lexemes, each headed
/// by its numeric id. Every other line is `FORM<TAB>grammemes`, and the
/// first form of a lexeme is its normal form. Returns each folded form
/// with its normal forms in the order their lexemes appear.
///
/// # Errors
///
/// Returns the underlying I/O error if `reader` fails.
pub fn read_opencorpora<R: BufRead>(reader: R) -> std::io::Result<HashMap<String, Vec<String>>> {
    let mut forms: HashMap<String, Vec<String>> = HashMap::new();
    let mut current_lemma: Option<String> = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.chars().all(|c| c.is_ascii_digit()) {
            current_lemma = None;
            continue;
        }
        let word = fold_word(line.split('\t').next().unwrap_or_default().trim());
        if word.is_empty() {
            continue;
        }
        let lemma = current_lemma.get_or_insert_with(|| word.clone()).clone();
        let lemmas = forms.entry(word).or_default();
        if !lemmas.contains(&lemma) {
            lemmas.push(lemma);
        }
    }
    Ok(forms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICTIONARY: &str = "\
1
МЕШОК\tNOUN,inan,masc sing,nomn
МЕШКА\tNOUN,inan,masc sing,gent
МЕШКИ\tNOUN,inan,masc plur,nomn
МЕШКОВ\tNOUN,inan,masc plur,gent

2
ЛОТОК\tNOUN,inan,masc sing,nomn
ЛОТКА\tNOUN,inan,masc sing,gent
ЛОТКИ\tNOUN,inan,masc plur,nomn
ЛОТКОВ\tNOUN,inan,masc plur,gent

3
СТАЛЬ\tNOUN,inan,femn sing,nomn
СТАЛИ\tNOUN,inan,femn sing,gent

4
СТАТЬ\tINFN,perf,intr
СТАЛИ\tVERB,perf,intr plur,past,indc

5
ЁЛКА\tNOUN,inan,femn sing,nomn
ЁЛКИ\tNOUN,inan,femn sing,gent
";

    #[test]
    fn builtin_guesses_inflected_nouns() {
        let guesser = SuffixGuesser::builtin();
        assert_eq!(guesser.guess("салфеток"), ["салфетка", "салфеток"]);
        assert_eq!(guesser.guess("тарелок"), ["тарелка", "тарелок"]);
        assert_eq!(guesser.guess("вилками"), ["вилка"]);
        assert_eq!(guesser.guess("наклеек"), ["наклейка"]);
        assert_eq!(guesser.guess("стаканами"), ["стакан", "стакана"]);
    }

    #[test]
    fn builtin_guesses_adjectives() {
        let guesser = SuffixGuesser::builtin();
        assert_eq!(guesser.guess("нитриловые"), ["нитриловый"]);
        assert_eq!(guesser.guess("прозрачной"), ["прозрачный"]);
        assert_eq!(guesser.guess("кондитерская"), ["кондитерский"]);
    }

    #[test]
    fn nominative_and_foreign_words_are_not_guessed() {
        let guesser = SuffixGuesser::builtin();
        assert!(guesser.guess("салфетка").is_empty());
        assert!(guesser.guess("стакан").is_empty());
        assert!(guesser.guess("200мл").is_empty());
        assert!(guesser.guess("craft").is_empty());
        // Too short to leave a stem.
        assert!(guesser.guess("сок").is_empty());
        assert!(guesser.guess("роки").is_empty());
    }

    #[test]
    fn reads_opencorpora_lexemes() {
        let forms = read_opencorpora(DICTIONARY.as_bytes()).expect("read");
        assert_eq!(forms["мешков"], ["мешок"]);
        assert_eq!(forms["лотки"], ["лоток"]);
        assert_eq!(forms["стали"], ["сталь", "стать"]);
        assert_eq!(forms["елки"], ["елка"]);
        assert!(!forms.contains_key("1"));
    }

    #[test]
    fn learned_guesser_generalises_paradigms() {
        let forms = read_opencorpora(DICTIONARY.as_bytes()).expect("read");
        let pairs: Vec<(&str, &str)> = forms
            .iter()
            .flat_map(|(form, lemmas)| lemmas.iter().map(move |l| (form.as_str(), l.as_str())))
            .collect();
        let guesser = SuffixGuesser::learn(pairs);
        assert!(!guesser.is_empty());
        assert_eq!(guesser.guess("совков"), ["совок"]);
        assert_eq!(guesser.guess("совок"), ["совок"]);
    }

    #[test]
    fn fold_word_spells_yo_as_ye() {
        assert_eq!(fold_word("Ёршик"), "ершик");
    }
}
