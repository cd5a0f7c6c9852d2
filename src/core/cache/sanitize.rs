//! Text sanitization applied before fingerprinting and synthesis.
//!
//! Order matters: pronunciation substitutions run on the raw text, then the
//! full-width colon is folded to ASCII, and only then is the text XML-escaped
//! so substitutions can never inject markup.

use std::borrow::Cow;

use regex::Regex;
use tracing::error;

use crate::core::tts::Pronunciation;

/// Compiled pronunciation replacement patterns.
#[derive(Debug, Clone, Default)]
pub struct PronunciationReplacer {
    patterns: Vec<(Regex, String)>,
}

impl PronunciationReplacer {
    /// Compiles one literal substring pattern per entry, longest word first.
    ///
    /// No word boundaries are applied: CJK text has no separators, so an entry
    /// must match anywhere it occurs.
    pub fn new(pronunciations: &[Pronunciation]) -> Self {
        let mut entries: Vec<&Pronunciation> = pronunciations
            .iter()
            .filter(|p| !p.word.is_empty())
            .collect();
        entries.sort_by(|a, b| b.word.chars().count().cmp(&a.word.chars().count()));

        let patterns = entries
            .into_iter()
            .filter_map(|p| {
                match Regex::new(&regex::escape(&p.word)) {
                    Ok(regex) => Some((regex, p.pronunciation.clone())),
                    Err(e) => {
                        error!(
                            "Failed to compile pronunciation pattern for '{}': {}",
                            p.word, e
                        );
                        None
                    }
                }
            })
            .collect();

        Self { patterns }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Applies all replacements in order.
    pub fn apply(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (pattern, replacement) in &self.patterns {
            result = pattern
                .replace_all(&result, regex::NoExpand(replacement.as_str()))
                .into_owned();
        }
        result
    }
}

/// Folds the full-width colon (U+FF1A) into an ASCII colon.
pub fn normalize_colons(text: &str) -> Cow<'_, str> {
    if text.contains('：') {
        Cow::Owned(text.replace('：', ":"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Escapes the five XML special characters.
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Full sanitization pipeline.
#[derive(Debug, Clone, Default)]
pub struct TextSanitizer {
    replacer: PronunciationReplacer,
}

impl TextSanitizer {
    pub fn new(pronunciations: &[Pronunciation]) -> Self {
        Self {
            replacer: PronunciationReplacer::new(pronunciations),
        }
    }

    pub fn sanitize(&self, text: &str) -> String {
        let replaced = if self.replacer.is_empty() {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(self.replacer.apply(text))
        };
        let normalized = normalize_colons(&replaced);
        escape_xml(&normalized).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(word: &str, pronunciation: &str) -> Pronunciation {
        Pronunciation {
            word: word.to_string(),
            pronunciation: pronunciation.to_string(),
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"a & b < c > "d" 'e'"#),
            "a &amp; b &lt; c &gt; &quot;d&quot; &apos;e&apos;"
        );
        assert!(matches!(escape_xml("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_full_width_colon() {
        assert_eq!(normalize_colons("时间：10：30"), "时间:10:30");
    }

    #[test]
    fn test_replacement_matches_inside_words() {
        let replacer =
            PronunciationReplacer::new(&[p("重庆", "chong2 qing4"), p("SQL", "sequel")]);
        assert_eq!(replacer.apply("我在重庆吃火锅"), "我在chong2 qing4吃火锅");
        assert_eq!(replacer.apply("SQL and MySQL"), "sequel and Mysequel");
    }

    #[test]
    fn test_longest_word_wins() {
        let replacer = PronunciationReplacer::new(&[p("New", "noo"), p("New York", "nu york")]);
        assert_eq!(replacer.apply("New York is New"), "nu york is noo");
    }

    #[test]
    fn test_symbol_edged_word_matches() {
        let replacer = PronunciationReplacer::new(&[p("C++", "see plus plus")]);
        assert_eq!(replacer.apply("I like C++ a lot"), "I like see plus plus a lot");
    }

    #[test]
    fn test_replacement_is_literal() {
        let replacer = PronunciationReplacer::new(&[p("cost", "$1 dollar")]);
        assert_eq!(replacer.apply("cost"), "$1 dollar");
    }

    #[test]
    fn test_sanitize_escapes_after_substitution() {
        let sanitizer = TextSanitizer::new(&[p("AT&T", "A T and T")]);
        assert_eq!(
            sanitizer.sanitize("AT&T：<call>"),
            "A T and T:&lt;call&gt;"
        );
    }
}
