use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    JobSeeker,
    EmployerAdmin,
    SubUser,
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::JobSeeker => "job_seeker",
            UserRole::EmployerAdmin => "employer_admin",
            UserRole::SubUser => "sub_user",
            UserRole::SuperAdmin => "super_admin",
        }
    }

    /// Unknown roles fall back to the least privileged one.
    pub fn from_str(value: &str) -> Self {
        match value {
            "employer_admin" => UserRole::EmployerAdmin,
            "sub_user" => UserRole::SubUser,
            "super_admin" => UserRole::SuperAdmin,
            _ => UserRole::JobSeeker,
        }
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
