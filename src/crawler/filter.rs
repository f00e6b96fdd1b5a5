//! Keyword relevance filter

use crate::crawler::RawCandidate;

/// Case-insensitive keyword OR-match over a candidate's title and summary
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
}

impl RelevanceFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Returns true if any keyword occurs in `title + " " + summary`
    pub fn is_relevant(&self, candidate: &RawCandidate) -> bool {
        self.matches_text(&candidate.title, &candidate.summary)
    }

    pub fn matches_text(&self, title: &str, summary: &str) -> bool {
        let haystack = format!("{} {}", title, summary).to_lowercase();
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}
