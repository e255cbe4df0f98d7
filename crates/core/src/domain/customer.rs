use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service level of a customer. Drives prompt variants and tool eligibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Basic,
    Premium,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "premium" => Some(Self::Premium),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// Every tier above basic receives premium handling.
    pub fn is_premium(&self) -> bool {
        !matches!(self, Self::Basic)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the customer for one support session plus the troubleshooting
/// steps already shown to them.
///
/// Identity fields are fixed at construction. The troubleshooting log only
/// grows, and appends are serialized through an internal mutex so concurrent
/// tool calls cannot lose entries.
#[derive(Debug)]
pub struct UserContext {
    customer_id: CustomerId,
    name: String,
    email: String,
    tier: Tier,
    troubleshooting_log: Mutex<Vec<String>>,
}

impl UserContext {
    pub fn new(
        customer_id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        tier: Tier,
    ) -> Self {
        Self {
            customer_id: CustomerId(customer_id.into()),
            name: name.into(),
            email: email.into(),
            tier,
            troubleshooting_log: Mutex::new(Vec::new()),
        }
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn is_premium(&self) -> bool {
        self.tier.is_premium()
    }

    /// Appends a step and returns the new log length.
    pub fn record_troubleshooting_step(&self, step: impl Into<String>) -> usize {
        let step = step.into();
        match self.troubleshooting_log.lock() {
            Ok(mut log) => {
                log.push(step);
                log.len()
            }
            Err(poisoned) => {
                let mut log = poisoned.into_inner();
                log.push(step);
                log.len()
            }
        }
    }

    pub fn troubleshooting_log(&self) -> Vec<String> {
        match self.troubleshooting_log.lock() {
            Ok(log) => log.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::{Tier, UserContext};

    #[test]
    fn only_basic_tier_is_not_premium() {
        assert!(!Tier::Basic.is_premium());
        assert!(Tier::Premium.is_premium());
        assert!(Tier::Enterprise.is_premium());
    }

    #[test]
    fn tier_parse_is_case_insensitive() {
        assert_eq!(Tier::parse(" Enterprise "), Some(Tier::Enterprise));
        assert_eq!(Tier::parse("gold"), None);
    }

    #[test]
    fn concurrent_appends_are_all_recorded() {
        let ctx = Arc::new(UserContext::new("1", "nana", "ktra@example.com", Tier::Basic));

        let handles = (0..8)
            .map(|worker| {
                let ctx = Arc::clone(&ctx);
                thread::spawn(move || {
                    for step in 0..25 {
                        ctx.record_troubleshooting_step(format!("worker-{worker} step-{step}"));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        assert_eq!(ctx.troubleshooting_log().len(), 200);
    }
}
