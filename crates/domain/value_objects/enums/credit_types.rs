use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Kinds of usage-metered credits. Balances are tracked per user and per kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CreditType {
    ResumeView,
    AiCredit,
    JobApplication,
    JobPosting,
    FeaturedJob,
}

impl CreditType {
    pub const ALL: [CreditType; 5] = [
        CreditType::ResumeView,
        CreditType::AiCredit,
        CreditType::JobApplication,
        CreditType::JobPosting,
        CreditType::FeaturedJob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditType::ResumeView => "resume_view",
            CreditType::AiCredit => "ai_credit",
            CreditType::JobApplication => "job_application",
            CreditType::JobPosting => "job_posting",
            CreditType::FeaturedJob => "featured_job",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "resume_view" => Some(CreditType::ResumeView),
            "ai_credit" => Some(CreditType::AiCredit),
            "job_application" => Some(CreditType::JobApplication),
            "job_posting" => Some(CreditType::JobPosting),
            "featured_job" => Some(CreditType::FeaturedJob),
            _ => None,
        }
    }
}

impl Display for CreditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
