//! In-run deduplication of candidates

use crate::crawler::RawCandidate;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Identity keys seen during one run (or one source's shard of it)
///
/// Not shared between tasks: each source worker owns its own set and the coordinator
/// merges shards at aggregation.
#[derive(Debug, Default)]
pub struct DeduplicationSet {
    seen: HashSet<String>,
}

impl DeduplicationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the candidate's key; returns false if it was already seen
    pub fn accept(&mut self, candidate: &RawCandidate) -> bool {
        self.accept_key(&candidate.identity_key)
    }

    pub fn accept_key(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn doc_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+/\d{4}/[\w-]+").expect("valid doc number regex"))
}

fn full_doc_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+/\d{4}/[\w-]+$").expect("valid doc number regex"))
}

/// Derives the canonical number of a legal document
///
/// The declared number is trimmed and its internal whitespace collapsed. When it is
/// missing or not of the form `NUM/YEAR/TYPE[-BODY]`, the first such pattern found in
/// the declared number, then in the title, is used instead.
///
/// # Examples
///
/// ```
/// use insurwatch::crawler::canonical_doc_number;
///
/// assert_eq!(
///     canonical_doc_number(None, "Nghị định 52/2024/NĐ-CP về bảo hiểm").as_deref(),
///     Some("52/2024/NĐ-CP")
/// );
/// ```
pub fn canonical_doc_number(declared: Option<&str>, title: &str) -> Option<String> {
    let declared = declared
        .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|d| !d.is_empty());

    if let Some(number) = &declared {
        if full_doc_number_pattern().is_match(number) {
            return Some(number.clone());
        }
        if let Some(found) = doc_number_pattern().find(number) {
            return Some(found.as_str().to_string());
        }
    }

    doc_number_pattern()
        .find(title)
        .map(|m| m.as_str().to_string())
        .or(declared)
}
