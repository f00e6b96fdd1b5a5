//! Records produced by extraction, before ingestion

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Legal force of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocStatus {
    Active,
    Expired,
    Pending,
    #[default]
    Unknown,
}

impl DocStatus {
    /// Parses the status text shown on a legal document page
    ///
    /// Matches "còn hiệu lực"/"đang hiệu lực" as in force, "hết hiệu lực"/"ngưng hiệu lực" as
    /// expired and "chưa có hiệu lực"/"chưa hiệu lực" as not yet in force.
    pub fn parse(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("còn hiệu lực") || lower.contains("đang hiệu lực") {
            Self::Active
        } else if lower.contains("hết hiệu lực") || lower.contains("ngưng hiệu lực") {
            Self::Expired
        } else if lower.contains("chưa có hiệu lực") || lower.contains("chưa hiệu lực") {
            Self::Pending
        } else {
            Self::Unknown
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Pending => "pending",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "pending" => Some(Self::Pending),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Fields only legal documents carry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegalFields {
    /// Canonical number such as `52/2024/NĐ-CP`
    pub doc_number: String,
    pub doc_type: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub effective_date: Option<NaiveDate>,
    pub issuing_body: Option<String>,
    pub signer: Option<String>,
    pub status: DocStatus,
    /// Cleaned HTML of the full text
    pub content_full: Option<String>,
    pub pdf_url: Option<String>,
    pub tags: Vec<String>,
}

/// Fields only news articles carry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsFields {
    /// Source is an insurer's own press-release site
    pub is_company_source: bool,
    /// Cleaned article body, when the detail page was fetched
    pub content_html: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateDetails {
    Legal(LegalFields),
    News(NewsFields),
}

/// A record extracted from a listing page, not yet validated against the store
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandidate {
    /// URL for news, canonical document number for legal documents
    pub identity_key: String,
    pub title: String,
    pub summary: String,
    /// Absolute link to the item's own page
    pub link: String,
    pub image_url: Option<String>,
    pub source_name: String,
    pub source_display_name: String,
    pub extracted_at: DateTime<Utc>,
    pub details: CandidateDetails,
}

impl RawCandidate {
    pub fn is_legal(&self) -> bool {
        matches!(self.details, CandidateDetails::Legal(_))
    }

    pub fn legal(&self) -> Option<&LegalFields> {
        match &self.details {
            CandidateDetails::Legal(fields) => Some(fields),
            CandidateDetails::News(_) => None,
        }
    }

    pub fn news(&self) -> Option<&NewsFields> {
        match &self.details {
            CandidateDetails::News(fields) => Some(fields),
            CandidateDetails::Legal(_) => None,
        }
    }
}
