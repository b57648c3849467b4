use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Subscription tier of an organization. Written by the billing flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    #[default]
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Plan {
    pub const ALL: [Plan; 4] = [Plan::Free, Plan::Starter, Plan::Pro, Plan::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Starter => "STARTER",
            Plan::Pro => "PRO",
            Plan::Enterprise => "ENTERPRISE",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(Plan::Free),
            "STARTER" => Ok(Plan::Starter),
            "PRO" => Ok(Plan::Pro),
            "ENTERPRISE" => Ok(Plan::Enterprise),
            other => Err(AppError::bad_request(format!("unknown plan: {other}"))),
        }
    }
}

/// Resource kinds whose count is capped per plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LimitedResource {
    Members,
    Domains,
}

impl LimitedResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitedResource::Members => "members",
            LimitedResource::Domains => "domains",
        }
    }
}

impl fmt::Display for LimitedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitedResource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "members" => Ok(LimitedResource::Members),
            "domains" => Ok(LimitedResource::Domains),
            other => Err(AppError::bad_request(format!("unknown limited resource: {other}"))),
        }
    }
}

/// Ceiling on the number of existing rows of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Finite(u64),
    Unlimited,
}

impl Limit {
    /// Whether one more row may be created when `current` already exist.
    pub fn allows(&self, current: u64) -> bool {
        match self {
            Limit::Finite(max) => current < *max,
            Limit::Unlimited => true,
        }
    }

    pub fn finite(&self) -> Option<u64> {
        match self {
            Limit::Finite(max) => Some(*max),
            Limit::Unlimited => None,
        }
    }

    /// Numeric view; unlimited maps to positive infinity.
    pub fn as_f64(&self) -> f64 {
        match self {
            Limit::Finite(max) => *max as f64,
            Limit::Unlimited => f64::INFINITY,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Finite(max) => write!(f, "{max}"),
            Limit::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct Usage {
    pub members: u64,
    pub domains: u64,
}

/// Usage alongside the plan ceilings; `null` limits are unbounded.
#[derive(Debug, Serialize, ToSchema)]
pub struct UsageReport {
    pub plan: Plan,
    pub usage: Usage,
    pub member_limit: Option<u64>,
    pub domain_limit: Option<u64>,
}

/// Advisory answer to "may one more `resource` be created right now?".
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LimitCheckResponse {
    pub resource: LimitedResource,
    pub allowed: bool,
    pub limit: Option<u64>,
}
