use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Money;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    pub monthly_price: Money,
    /// Flat discount on charging, in percent
    pub charging_discount: u8,
    /// Sessions included per month, unlimited when absent
    pub session_cap: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscription {
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub started_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
}

/// Read-only view of the plans on offer and of who is enrolled in what.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCatalog {
    plans: Vec<SubscriptionPlan>,
    subscriptions: Vec<UserSubscription>,
}

impl SubscriptionCatalog {
    pub fn new(plans: Vec<SubscriptionPlan>, subscriptions: Vec<UserSubscription>) -> Self {
        SubscriptionCatalog {
            plans,
            subscriptions,
        }
    }

    /// The plans sold by default, without any enrollment.
    pub fn builtin() -> Self {
        let plan = |id: &str, name: &str, monthly_price, charging_discount, session_cap| {
            SubscriptionPlan {
                id: id.into(),
                name: name.into(),
                monthly_price,
                charging_discount,
                session_cap,
            }
        };
        SubscriptionCatalog::new(
            vec![
                plan("basic", "Basic", 99_000, 5, Some(10)),
                plan("standard", "Standard", 199_000, 10, Some(30)),
                plan("premium", "Premium", 349_000, 20, None),
            ],
            Vec::new(),
        )
    }

    pub fn with_subscriptions(mut self, subscriptions: Vec<UserSubscription>) -> Self {
        self.subscriptions = subscriptions;
        self
    }

    pub fn plans(&self) -> &[SubscriptionPlan] {
        &self.plans
    }

    pub fn plan(&self, plan_id: &str) -> Option<&SubscriptionPlan> {
        self.plans.iter().find(|plan| plan.id == plan_id)
    }

    /// A user holds at most one active subscription; the first match wins.
    pub fn current_subscription(&self, user_id: &str) -> Option<&UserSubscription> {
        self.subscriptions
            .iter()
            .find(|sub| sub.user_id == user_id && sub.status == SubscriptionStatus::Active)
    }

    pub fn active_plan(&self, user_id: &str) -> Option<&SubscriptionPlan> {
        self.current_subscription(user_id)
            .and_then(|sub| self.plan(&sub.plan_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment(user_id: &str, plan_id: &str, status: SubscriptionStatus) -> UserSubscription {
        UserSubscription {
            user_id: user_id.into(),
            plan_id: plan_id.into(),
            status,
            started_on: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            expires_on: None,
        }
    }

    #[test]
    fn test_builtin_plans() {
        let catalog = SubscriptionCatalog::builtin();
        assert_eq!(catalog.plans().len(), 3);
        assert_eq!(catalog.plan("premium").unwrap().charging_discount, 20);
        assert!(catalog.plan("gold").is_none());
    }

    #[test]
    fn test_current_subscription_skips_inactive() {
        let catalog = SubscriptionCatalog::builtin().with_subscriptions(vec![
            enrollment("U1", "basic", SubscriptionStatus::Expired),
            enrollment("U1", "premium", SubscriptionStatus::Active),
            enrollment("U2", "standard", SubscriptionStatus::Cancelled),
        ]);

        assert_eq!(catalog.current_subscription("U1").unwrap().plan_id, "premium");
        assert_eq!(catalog.active_plan("U1").unwrap().id, "premium");
        assert!(catalog.current_subscription("U2").is_none());
        assert!(catalog.active_plan("U3").is_none());
    }

    #[test]
    fn test_unknown_plan_has_no_discount() {
        let catalog = SubscriptionCatalog::builtin().with_subscriptions(vec![enrollment(
            "U1",
            "legacy",
            SubscriptionStatus::Active,
        )]);
        assert!(catalog.current_subscription("U1").is_some());
        assert!(catalog.active_plan("U1").is_none());
    }
}
