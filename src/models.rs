use serde::{Deserialize, Serialize};

// Quota record as held by the quota directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientQuota {
    pub client_id: String,
    pub limit_per_second: u64,
    pub limit_per_month: u64,
}

impl ClientQuota {
    pub fn new(client_id: impl Into<String>, limit_per_second: u64, limit_per_month: u64) -> Self {
        Self {
            client_id: client_id.into(),
            limit_per_second,
            limit_per_month,
        }
    }

    // Both limits must be positive for the record to be usable
    pub fn is_valid(&self) -> bool {
        !self.client_id.is_empty() && self.limit_per_second > 0 && self.limit_per_month > 0
    }
}

// Quota dimension that rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Global,
    Second,
    Month,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Second => "second",
            Tier::Month => "month",
        }
    }

    // Client-facing message for a rejection on this tier
    pub fn message(&self) -> &'static str {
        match self {
            Tier::Global => "Global Request Limit Exceeded",
            Tier::Second => "Too Many Requests per Second",
            Tier::Month => "Monthly Request Limit Exceeded",
        }
    }
}

// Hard is never produced, no escalation policy exists yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleClass {
    Soft,
    Hard,
}

// Outcome of one admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit_type: Option<Tier>,
    pub retry_after_ms: Option<u64>,
    pub throttle_class: ThrottleClass,
}

impl Decision {
    pub fn admitted() -> Self {
        Self {
            allowed: true,
            limit_type: None,
            retry_after_ms: None,
            throttle_class: ThrottleClass::Soft,
        }
    }

    pub fn rejected(tier: Tier, retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            limit_type: Some(tier),
            retry_after_ms: Some(retry_after_ms),
            throttle_class: ThrottleClass::Soft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_record_uses_camel_case_fields() {
        let quota: ClientQuota = serde_json::from_str(
            r#"{"clientId":"acme","limitPerSecond":5,"limitPerMonth":1000}"#,
        )
        .unwrap();
        assert_eq!(quota, ClientQuota::new("acme", 5, 1000));
        assert!(quota.is_valid());
    }

    #[test]
    fn zero_limits_are_invalid() {
        assert!(!ClientQuota::new("acme", 0, 10).is_valid());
        assert!(!ClientQuota::new("acme", 10, 0).is_valid());
        assert!(!ClientQuota::new("", 10, 10).is_valid());
    }

    #[test]
    fn rejections_are_soft() {
        let decision = Decision::rejected(Tier::Month, 42);
        assert!(!decision.allowed);
        assert_eq!(decision.limit_type, Some(Tier::Month));
        assert_eq!(decision.retry_after_ms, Some(42));
        assert_eq!(decision.throttle_class, ThrottleClass::Soft);
    }
}
