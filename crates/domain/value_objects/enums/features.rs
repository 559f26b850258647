use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::{credit_types::CreditType, plan_tiers::PlanTier};

/// Plan-gated capabilities of the job board.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PostJobs,
    ApplicantTracking,
    CompanyProfile,
    FeaturedJobs,
    ResumeSearch,
    AiCandidateMatching,
    Analytics,
    SubUsers,
    CustomBranding,
    ApiAccess,
    PrioritySupport,
}

impl Feature {
    pub const ALL: [Feature; 11] = [
        Feature::PostJobs,
        Feature::ApplicantTracking,
        Feature::CompanyProfile,
        Feature::FeaturedJobs,
        Feature::ResumeSearch,
        Feature::AiCandidateMatching,
        Feature::Analytics,
        Feature::SubUsers,
        Feature::CustomBranding,
        Feature::ApiAccess,
        Feature::PrioritySupport,
    ];

    /// Capability matrix: the lowest tier that unlocks the feature. Higher
    /// tiers inherit everything below them.
    pub fn minimum_tier(&self) -> PlanTier {
        match self {
            Feature::PostJobs | Feature::ApplicantTracking | Feature::CompanyProfile => {
                PlanTier::Basic
            }
            Feature::FeaturedJobs
            | Feature::ResumeSearch
            | Feature::AiCandidateMatching
            | Feature::Analytics
            | Feature::SubUsers => PlanTier::Premium,
            Feature::CustomBranding | Feature::ApiAccess | Feature::PrioritySupport => {
                PlanTier::Enterprise
            }
        }
    }

    pub fn is_granted_to(&self, tier: PlanTier) -> bool {
        tier >= self.minimum_tier()
    }

    /// Credit type whose `used` counter measures consumption of the feature.
    pub fn metered_by(&self) -> Option<CreditType> {
        match self {
            Feature::PostJobs => Some(CreditType::JobPosting),
            Feature::FeaturedJobs => Some(CreditType::FeaturedJob),
            Feature::ResumeSearch => Some(CreditType::ResumeView),
            Feature::AiCandidateMatching => Some(CreditType::AiCredit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::PostJobs => "post_jobs",
            Feature::ApplicantTracking => "applicant_tracking",
            Feature::CompanyProfile => "company_profile",
            Feature::FeaturedJobs => "featured_jobs",
            Feature::ResumeSearch => "resume_search",
            Feature::AiCandidateMatching => "ai_candidate_matching",
            Feature::Analytics => "analytics",
            Feature::SubUsers => "sub_users",
            Feature::CustomBranding => "custom_branding",
            Feature::ApiAccess => "api_access",
            Feature::PrioritySupport => "priority_support",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Feature::ALL.into_iter().find(|feature| feature.as_str() == value)
    }

    pub fn granted_to(tier: PlanTier) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| feature.is_granted_to(tier))
            .collect()
    }
}

impl Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_tier_unlocks_nothing() {
        assert!(Feature::granted_to(PlanTier::Free).is_empty());
    }

    #[test]
    fn enterprise_unlocks_everything() {
        assert_eq!(Feature::granted_to(PlanTier::Enterprise), Feature::ALL.to_vec());
    }

    #[test]
    fn each_tier_is_a_superset_of_the_one_below() {
        for pair in PlanTier::ALL.windows(2) {
            let lower = Feature::granted_to(pair[0]);
            let higher = Feature::granted_to(pair[1]);
            assert!(lower.iter().all(|feature| higher.contains(feature)));
        }
        assert!(Feature::granted_to(PlanTier::Basic).len() < Feature::granted_to(PlanTier::Premium).len());
        assert!(
            Feature::granted_to(PlanTier::Premium).len()
                < Feature::granted_to(PlanTier::Enterprise).len()
        );
    }

    #[test]
    fn names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_str(feature.as_str()), Some(feature));
        }
    }
}
