//! Subscription plans and their resource limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Plan tier, ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCode {
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl PlanCode {
    pub const ALL: [PlanCode; 4] = [
        PlanCode::Free,
        PlanCode::Starter,
        PlanCode::Pro,
        PlanCode::Enterprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCode::Free => "free",
            PlanCode::Starter => "starter",
            PlanCode::Pro => "pro",
            PlanCode::Enterprise => "enterprise",
        }
    }

    /// Unknown codes fall back to the free tier.
    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(PlanCode::Free)
    }

    pub fn limits(&self) -> PlanLimits {
        match self {
            PlanCode::Free => PlanLimits::bounded(1, 15, 5, 3),
            PlanCode::Starter => PlanLimits::bounded(1, 75, 25, 10),
            PlanCode::Pro => PlanLimits::bounded(3, 300, 100, 40),
            PlanCode::Enterprise => PlanLimits::unlimited(),
        }
    }

    pub fn is_downgrade_from(&self, current: PlanCode) -> bool {
        *self < current
    }
}

impl fmt::Display for PlanCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanCode::Free),
            "starter" => Ok(PlanCode::Starter),
            "pro" => Ok(PlanCode::Pro),
            "enterprise" => Ok(PlanCode::Enterprise),
            other => Err(format!("unknown plan code '{}'", other)),
        }
    }
}

/// Countable resources gated by the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanResource {
    Academies,
    Athletes,
    Classes,
    Groups,
}

impl PlanResource {
    pub const ALL: [PlanResource; 4] = [
        PlanResource::Academies,
        PlanResource::Athletes,
        PlanResource::Classes,
        PlanResource::Groups,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanResource::Academies => "academies",
            PlanResource::Athletes => "athletes",
            PlanResource::Classes => "classes",
            PlanResource::Groups => "groups",
        }
    }
}

impl fmt::Display for PlanResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource ceilings. `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub academies: Option<i64>,
    pub athletes: Option<i64>,
    pub classes: Option<i64>,
    pub groups: Option<i64>,
}

impl PlanLimits {
    const fn bounded(academies: i64, athletes: i64, classes: i64, groups: i64) -> Self {
        Self {
            academies: Some(academies),
            athletes: Some(athletes),
            classes: Some(classes),
            groups: Some(groups),
        }
    }

    const fn unlimited() -> Self {
        Self {
            academies: None,
            athletes: None,
            classes: None,
            groups: None,
        }
    }

    pub fn get(&self, resource: PlanResource) -> Option<i64> {
        match resource {
            PlanResource::Academies => self.academies,
            PlanResource::Athletes => self.athletes,
            PlanResource::Classes => self.classes,
            PlanResource::Groups => self.groups,
        }
    }

    /// Resources whose usage exceeds the limit.
    pub fn violations(&self, usage: &PlanUsage) -> Vec<PlanViolation> {
        PlanResource::ALL
            .iter()
            .filter_map(|&resource| {
                let limit = self.get(resource)?;
                let current = usage.get(resource);
                (current > limit).then(|| PlanViolation {
                    resource,
                    limit,
                    current,
                    excess: current - limit,
                })
            })
            .collect()
    }

    /// Whether `additional` more of `resource` still fit.
    pub fn allows(&self, usage: &PlanUsage, resource: PlanResource, additional: i64) -> bool {
        match self.get(resource) {
            Some(limit) => usage.get(resource) + additional <= limit,
            None => true,
        }
    }
}

/// Current resource counts for one owner, across all owned academies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanUsage {
    pub academies: i64,
    pub athletes: i64,
    pub classes: i64,
    pub groups: i64,
}

impl PlanUsage {
    pub fn get(&self, resource: PlanResource) -> i64 {
        match resource {
            PlanResource::Academies => self.academies,
            PlanResource::Athletes => self.athletes,
            PlanResource::Classes => self.classes,
            PlanResource::Groups => self.groups,
        }
    }
}

/// One resource over its plan limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanViolation {
    pub resource: PlanResource,
    pub limit: i64,
    pub current: i64,
    pub excess: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(academies: i64, athletes: i64, classes: i64, groups: i64) -> PlanUsage {
        PlanUsage {
            academies,
            athletes,
            classes,
            groups,
        }
    }

    #[test]
    fn plan_codes_round_trip_and_rank() {
        for plan in PlanCode::ALL {
            assert_eq!(plan.as_str().parse::<PlanCode>().unwrap(), plan);
        }
        assert!(PlanCode::Free.is_downgrade_from(PlanCode::Pro));
        assert!(!PlanCode::Enterprise.is_downgrade_from(PlanCode::Pro));
        assert_eq!(PlanCode::from_string("platinum"), PlanCode::Free);
    }

    #[test]
    fn free_plan_violations_list_only_exceeded_resources() {
        let violations = PlanCode::Free.limits().violations(&usage(1, 20, 5, 4));
        assert_eq!(
            violations,
            vec![
                PlanViolation {
                    resource: PlanResource::Athletes,
                    limit: 15,
                    current: 20,
                    excess: 5
                },
                PlanViolation {
                    resource: PlanResource::Groups,
                    limit: 3,
                    current: 4,
                    excess: 1
                },
            ]
        );
    }

    #[test]
    fn usage_at_limit_is_not_a_violation() {
        assert!(PlanCode::Starter
            .limits()
            .violations(&usage(1, 75, 25, 10))
            .is_empty());
    }

    #[test]
    fn enterprise_is_unlimited() {
        let limits = PlanCode::Enterprise.limits();
        assert!(limits.violations(&usage(50, 10_000, 900, 400)).is_empty());
        assert!(limits.allows(&usage(50, 10_000, 900, 400), PlanResource::Academies, 1));
    }

    #[test]
    fn allows_checks_headroom() {
        let limits = PlanCode::Free.limits();
        assert!(limits.allows(&usage(0, 14, 0, 0), PlanResource::Athletes, 1));
        assert!(!limits.allows(&usage(0, 15, 0, 0), PlanResource::Athletes, 1));
        assert!(!limits.allows(&usage(1, 0, 0, 0), PlanResource::Academies, 1));
    }
}
