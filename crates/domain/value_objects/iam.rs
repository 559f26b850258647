use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::enums::user_roles::UserRole;

/// Emails and email domains whose owners are treated as platform administrators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowlist {
    emails: Vec<String>,
    domains: Vec<String>,
}

impl AdminAllowlist {
    pub fn new<E, D>(emails: E, domains: D) -> Self
    where
        E: IntoIterator<Item = String>,
        D: IntoIterator<Item = String>,
    {
        let normalize = |value: String| value.trim().trim_start_matches('@').to_ascii_lowercase();

        Self {
            emails: emails
                .into_iter()
                .map(normalize)
                .filter(|v| !v.is_empty())
                .collect(),
            domains: domains
                .into_iter()
                .map(normalize)
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// Parses comma separated lists, as they come from the environment.
    pub fn from_csv(emails: &str, domains: &str) -> Self {
        let split = |raw: &str| {
            raw.split(',')
                .map(|part| part.to_string())
                .collect::<Vec<_>>()
        };
        Self::new(split(emails), split(domains))
    }

    pub fn contains(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        if self.emails.iter().any(|allowed| *allowed == email) {
            return true;
        }

        match email.rsplit_once('@') {
            Some((_, domain)) => self.domains.iter().any(|allowed| allowed == domain),
            None => false,
        }
    }
}

/// The authenticated caller, passed explicitly into every use case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionContext {
    pub fn new(
        user_id: Uuid,
        email: Option<String>,
        role: UserRole,
        allowlist: &AdminAllowlist,
    ) -> Self {
        let is_admin = role == UserRole::SuperAdmin
            || email
                .as_deref()
                .map(|value| allowlist.contains(value))
                .unwrap_or(false);

        Self {
            user_id,
            email,
            role,
            is_admin,
        }
    }
}
