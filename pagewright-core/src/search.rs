//! Full-text search index.
//!
//! The serialized index is a token table: each token maps to postings that
//! carry title and body occurrence counts, so title matches can be ranked
//! above body matches by a client-side lookup.

use crate::config::{BuildConfig, SearchOptions};
use crate::models::{PageRecord, PageSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

pub const SEARCH_INDEX_VERSION: u32 = 1;

/// A title occurrence counts this many body occurrences.
const TITLE_WEIGHT: u32 = 10;
const SNIPPET_CHARS: usize = 160;

const STOP_WORDS_EN: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];
const STOP_WORDS_DE: &[&str] = &[
    "aber", "als", "am", "an", "auch", "auf", "aus", "bei", "das", "dass", "dem", "den", "der",
    "des", "die", "ein", "eine", "einen", "einer", "es", "für", "im", "in", "ist", "mit", "nicht",
    "oder", "sich", "sie", "und", "von", "zu",
];
const STOP_WORDS_FR: &[&str] = &[
    "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "elle", "en", "est", "et", "il",
    "la", "le", "les", "leur", "mais", "ne", "ou", "par", "pas", "pour", "qui", "sa", "se", "son",
    "sur", "un", "une",
];
const STOP_WORDS_ES: &[&str] = &[
    "al", "con", "de", "del", "el", "en", "es", "la", "las", "lo", "los", "no", "para", "por",
    "que", "se", "su", "un", "una", "y",
];

/// Built-in stop words for a locale (`en-US` falls back to `en`).
pub fn default_stop_words(locale: &str) -> &'static [&'static str] {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .to_ascii_lowercase();
    match language.as_str() {
        "en" => STOP_WORDS_EN,
        "de" => STOP_WORDS_DE,
        "fr" => STOP_WORDS_FR,
        "es" => STOP_WORDS_ES,
        _ => &[],
    }
}

/// Word-boundary tokenizer with case folding and stop-word removal.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: HashSet<String>,
    min_token_length: usize,
}

impl Tokenizer {
    pub fn new<I, S>(stop_words: I, min_token_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
            min_token_length,
        }
    }

    /// Configured stop words for the locale win over the built-in list.
    pub fn for_locale(locale: &str, options: &SearchOptions) -> Self {
        match options.stop_words.get(locale) {
            Some(words) => Self::new(words, options.min_token_length),
            None => Self::new(default_stop_words(locale).iter(), options.min_token_length),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(str::to_lowercase)
            .filter(|word| word.chars().count() >= self.min_token_length)
            .filter(|word| !self.stop_words.contains(word))
            .collect()
    }

    fn sorted_stop_words(&self) -> Vec<String> {
        let sorted: BTreeSet<&String> = self.stop_words.iter().collect();
        sorted.into_iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// One (token, page) entry. Field names are kept short for the compact artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Index into `documents`
    pub d: usize,
    /// Occurrences in the title
    pub t: u32,
    /// Occurrences in the body
    pub b: u32,
    /// Token offset of the first body occurrence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<u32>,
}

impl Posting {
    pub fn weight(&self) -> u32 {
        self.t * TITLE_WEIGHT + self.b
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub version: u32,
    pub locale: String,
    pub min_token_length: usize,
    pub stop_words: Vec<String>,
    pub documents: Vec<SearchDocument>,
    pub tokens: BTreeMap<String, Vec<Posting>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit<'a> {
    pub document: &'a SearchDocument,
    pub score: u32,
    /// Number of query terms found in the title
    pub title_matches: usize,
}

impl SearchIndex {
    /// Compact JSON; identical input pages always produce identical bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(&self.stop_words, self.min_token_length)
    }

    pub fn lookup(&self, token: &str) -> &[Posting] {
        self.tokens.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rank documents for a free-text query. Terms with no exact entry match
    /// as prefixes.
    pub fn query(&self, query: &str, limit: usize) -> Vec<SearchHit<'_>> {
        let terms: BTreeSet<String> = self.tokenizer().tokenize(query).into_iter().collect();
        let mut scores: HashMap<usize, (u32, usize)> = HashMap::new();

        for term in &terms {
            let mut matched: HashMap<usize, (u32, bool)> = HashMap::new();
            let postings: Vec<&Posting> = match self.tokens.get(term) {
                Some(postings) => postings.iter().collect(),
                None => self
                    .tokens
                    .range(term.clone()..)
                    .take_while(|(token, _)| token.starts_with(term.as_str()))
                    .flat_map(|(_, postings)| postings.iter())
                    .collect(),
            };
            for posting in postings {
                let entry = matched.entry(posting.d).or_insert((0, false));
                entry.0 += posting.weight();
                entry.1 |= posting.t > 0;
            }
            for (doc, (weight, in_title)) in matched {
                let score = scores.entry(doc).or_insert((0, 0));
                score.0 += weight;
                if in_title {
                    score.1 += 1;
                }
            }
        }

        let mut hits: Vec<SearchHit<'_>> = scores
            .into_iter()
            .filter_map(|(doc, (score, title_matches))| {
                self.documents.get(doc).map(|document| SearchHit {
                    document,
                    score,
                    title_matches,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.title_matches
                .cmp(&a.title_matches)
                .then_with(|| b.score.cmp(&a.score))
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(limit);
        hits
    }
}

struct PageTokens {
    title: BTreeMap<String, u32>,
    body: BTreeMap<String, (u32, u32)>,
}

/// Builds the [`SearchIndex`] from a finalized page set.
pub struct SearchIndexBuilder {
    locale: String,
    tokenizer: Tokenizer,
}

impl SearchIndexBuilder {
    pub fn new(config: &BuildConfig) -> Self {
        let locale = config.i18n.default_locale.clone();
        let tokenizer = Tokenizer::for_locale(&locale, &config.search);
        Self { locale, tokenizer }
    }

    pub fn build(&self, pages: &PageSet) -> SearchIndex {
        let per_page: Vec<PageTokens> = pages
            .as_slice()
            .par_iter()
            .map(|page| self.tokenize_page(page))
            .collect();

        let mut tokens: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        for (d, page_tokens) in per_page.into_iter().enumerate() {
            let PageTokens { title, body } = page_tokens;
            let mut merged: BTreeMap<String, Posting> = BTreeMap::new();
            for (token, t) in title {
                merged.insert(token, Posting { d, t, b: 0, p: None });
            }
            for (token, (b, first)) in body {
                let posting = merged.entry(token).or_insert(Posting {
                    d,
                    t: 0,
                    b: 0,
                    p: None,
                });
                posting.b = b;
                posting.p = Some(first);
            }
            for (token, posting) in merged {
                tokens.entry(token).or_default().push(posting);
            }
        }

        let documents = pages
            .iter()
            .map(|page| SearchDocument {
                id: page.id.clone(),
                title: page.title.clone(),
                url: page.permalink.clone(),
                snippet: snippet(page),
            })
            .collect();

        tracing::debug!("Search index has {} distinct tokens", tokens.len());

        SearchIndex {
            version: SEARCH_INDEX_VERSION,
            locale: self.locale.clone(),
            min_token_length: self.tokenizer.min_token_length,
            stop_words: self.tokenizer.sorted_stop_words(),
            documents,
            tokens,
        }
    }

    fn tokenize_page(&self, page: &PageRecord) -> PageTokens {
        let mut title = BTreeMap::new();
        for token in self.tokenizer.tokenize(&page.title) {
            *title.entry(token).or_insert(0) += 1;
        }

        let mut body: BTreeMap<String, (u32, u32)> = BTreeMap::new();
        for (position, token) in self.tokenizer.tokenize(&page.text).into_iter().enumerate() {
            let position = u32::try_from(position).unwrap_or(u32::MAX);
            body.entry(token)
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, position));
        }

        PageTokens { title, body }
    }
}

fn snippet(page: &PageRecord) -> String {
    let source = page.description.as_deref().unwrap_or(&page.text);
    let flat = source.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= SNIPPET_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_folds_case_and_drops_stop_words() {
        let tokenizer = Tokenizer::for_locale("en", &SearchOptions::default());
        assert_eq!(
            tokenizer.tokenize("The Streamlit app, and a DataFrame!"),
            vec!["streamlit", "app", "dataframe"]
        );
    }

    #[test]
    fn test_configured_stop_words_replace_builtins() {
        let mut options = SearchOptions::default();
        options
            .stop_words
            .insert("en".to_string(), vec!["streamlit".to_string()]);
        let tokenizer = Tokenizer::for_locale("en", &options);
        assert_eq!(tokenizer.tokenize("the streamlit docs"), vec!["the", "docs"]);
    }

    #[test]
    fn test_regional_locale_uses_language_list() {
        assert!(default_stop_words("fr-CA").contains(&"les"));
        assert!(default_stop_words("xx").is_empty());
    }

    #[test]
    fn test_min_token_length() {
        let options = SearchOptions {
            min_token_length: 4,
            ..SearchOptions::default()
        };
        let tokenizer = Tokenizer::for_locale("en", &options);
        assert_eq!(tokenizer.tokenize("use the cache wisely"), vec!["cache", "wisely"]);
    }

    fn index_with(documents: &[(&str, &str)], tokens: &[(&str, Vec<Posting>)]) -> SearchIndex {
        SearchIndex {
            version: SEARCH_INDEX_VERSION,
            locale: "en".to_string(),
            min_token_length: 2,
            stop_words: vec!["the".to_string()],
            documents: documents
                .iter()
                .map(|(id, title)| SearchDocument {
                    id: id.to_string(),
                    title: title.to_string(),
                    url: format!("/docs/{}", id),
                    snippet: String::new(),
                })
                .collect(),
            tokens: tokens
                .iter()
                .map(|(t, p)| (t.to_string(), p.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_title_matches_rank_first() {
        let index = index_with(
            &[("body-heavy", "Other"), ("titled", "Caching")],
            &[(
                "caching",
                vec![
                    Posting { d: 0, t: 0, b: 40, p: Some(0) },
                    Posting { d: 1, t: 1, b: 0, p: None },
                ],
            )],
        );
        let hits = index.query("the caching", 10);
        let ids: Vec<_> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["titled", "body-heavy"]);
    }

    #[test]
    fn test_prefix_fallback_and_limit() {
        let index = index_with(
            &[("a", "A"), ("b", "B")],
            &[
                ("dataframe", vec![Posting { d: 0, t: 0, b: 1, p: Some(3) }]),
                ("datasets", vec![Posting { d: 1, t: 0, b: 2, p: Some(0) }]),
            ],
        );
        let hits = index.query("data", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "b");
        assert_eq!(index.query("data", 1).len(), 1);
        assert!(index.query("charts", 10).is_empty());
    }

    #[test]
    fn test_json_is_compact_and_parses_back() {
        let index = index_with(&[("a", "A")], &[("alpha", vec![Posting { d: 0, t: 1, b: 0, p: None }])]);
        let json = index.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains(r#""alpha":[{"d":0,"t":1,"b":0}]"#));
        assert_eq!(SearchIndex::from_json(&json).unwrap(), index);
    }
}
