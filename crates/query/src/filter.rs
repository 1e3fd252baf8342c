//! Display-name scrubbing.
//!
//! Categories carry filter words (provider boilerplate like `"HD"` or
//! `"[UK]"`) that are stripped from member channel names before sorting.
//! Words are matched case-insensitively as literal substrings; regex
//! metacharacters in a word are escaped, never interpreted.

use exn::ResultExt;
use regex::Regex;

use crate::error::{ErrorKind, Result};

/// Compiled scrub patterns for one view.
#[derive(Debug, Default)]
pub struct NameScrubber {
    patterns: Vec<Regex>,
}

impl NameScrubber {
    /// Compile a word list. Blank words are skipped; duplicates are
    /// harmless.
    pub fn compile<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut patterns = Vec::new();
        for word in words {
            if word.trim().is_empty() {
                continue;
            }
            let pattern = Regex::new(&format!("(?i){}", regex::escape(word)))
                .or_raise(|| ErrorKind::InvalidFilterWord(word.to_string()))?;
            patterns.push(pattern);
        }
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Strip every filter word from a display name and normalize the
    /// leftover whitespace. A name scrubbed down to nothing is returned
    /// unscrubbed so the channel stays identifiable.
    pub fn scrub(&self, name: &str) -> String {
        if self.patterns.is_empty() {
            return name.to_string();
        }
        let mut scrubbed = name.to_string();
        for pattern in &self.patterns {
            scrubbed = pattern.replace_all(&scrubbed, "").into_owned();
        }
        let normalized = scrubbed.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() { name.to_string() } else { normalized }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("BBC One HD", "BBC One")]
    #[case("HD BBC One", "BBC One")]
    #[case("BBC hd One", "BBC One")]
    #[case("BBC One", "BBC One")]
    fn test_case_insensitive_removal(#[case] input: &str, #[case] expected: &str) {
        let scrubber = NameScrubber::compile(["HD"]).unwrap();
        assert_eq!(scrubber.scrub(input), expected);
    }

    #[test]
    fn test_metacharacters_are_literal() {
        let scrubber = NameScrubber::compile(["[UK]", "(backup)"]).unwrap();
        assert_eq!(scrubber.scrub("[UK] Sky Sports (backup)"), "Sky Sports");
        // A bare "U" must not match; the brackets are part of the word.
        assert_eq!(scrubber.scrub("UK Gold"), "UK Gold");
    }

    #[test]
    fn test_fully_scrubbed_name_falls_back_to_original() {
        let scrubber = NameScrubber::compile(["HD"]).unwrap();
        assert_eq!(scrubber.scrub("HD"), "HD");
    }

    #[test]
    fn test_blank_words_are_skipped() {
        let scrubber = NameScrubber::compile(["", "  "]).unwrap();
        assert!(scrubber.is_empty());
        assert_eq!(scrubber.scrub("As Is"), "As Is");
    }
}
