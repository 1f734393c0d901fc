use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_WORDS: usize = 10;
pub const MAX_WORDS: usize = 15;

const MAX_AUTHOR_WORDS: usize = 5;

static ATTRIBUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\s*(?:—|–|\s-)\s*([^—–]+)$").unwrap());

const QUOTE_MARKS: &[char] = &['"', '\'', '“', '”', '‘', '’', '«', '»', '*'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub author: Option<String>,
}

impl Quote {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: None,
        }
    }

    /// Cleans raw generated text into a quote. Returns `None` when nothing
    /// is left after cleaning.
    pub fn parse(raw: &str) -> Option<Self> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }

        let (body, author) = split_attribution(&collapsed);
        let text = body.trim_matches(|c: char| QUOTE_MARKS.contains(&c) || c.is_whitespace());
        if text.is_empty() {
            return None;
        }

        Some(Self {
            text: text.to_string(),
            author,
        })
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn has_acceptable_length(&self) -> bool {
        (MIN_WORDS..=MAX_WORDS).contains(&self.word_count())
    }
}

fn split_attribution(text: &str) -> (&str, Option<String>) {
    let Some(caps) = ATTRIBUTION_RE.captures(text) else {
        return (text, None);
    };
    let (Some(body), Some(name)) = (caps.get(1), caps.get(2)) else {
        return (text, None);
    };

    let name = name.as_str().trim().trim_matches(|c: char| QUOTE_MARKS.contains(&c));
    let starts_upper = name.chars().next().is_some_and(char::is_uppercase);
    let words = name.split_whitespace().count();
    if !starts_upper || words == 0 || words > MAX_AUTHOR_WORDS || name.ends_with('.') {
        return (text, None);
    }

    (body.as_str(), Some(name.to_string()))
}
