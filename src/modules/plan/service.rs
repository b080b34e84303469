use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error;
use crate::constants::StripeMode;
use crate::modules::plan::model::{free_plan, plan_for_price, SubscriptionPlan};
use crate::modules::user::{repository::UserRepository, schema::UserEntity};

#[derive(Clone)]
pub struct PlanService {
    user_repo: Arc<dyn UserRepository + Send + Sync>,
    mode: StripeMode,
}

impl PlanService {
    pub fn with_dependencies(
        user_repo: Arc<dyn UserRepository + Send + Sync>,
        mode: StripeMode,
    ) -> Self {
        Self { user_repo, mode }
    }

    pub async fn subscription_for(
        &self,
        user_id: &Uuid,
    ) -> Result<SubscriptionPlan, error::SystemError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| error::SystemError::unauthorized("User not found"))?;

        Ok(resolve_subscription(&user, self.mode, Utc::now()))
    }
}

/// A subscription counts until one day past the paid period end.
pub fn resolve_subscription(
    user: &UserEntity,
    mode: StripeMode,
    now: DateTime<Utc>,
) -> SubscriptionPlan {
    let is_subscribed = match (&user.stripe_price_id, user.stripe_current_period_end) {
        (Some(price_id), Some(period_end)) => {
            !price_id.is_empty() && period_end + Duration::days(1) > now
        }
        _ => false,
    };

    let plan = if is_subscribed {
        user.stripe_price_id
            .as_deref()
            .and_then(|id| plan_for_price(id, mode))
            .unwrap_or_else(free_plan)
    } else {
        free_plan()
    };

    SubscriptionPlan {
        plan,
        is_subscribed,
        // Cancellation state lives with the payment provider.
        is_canceled: false,
        stripe_customer_id: user.stripe_customer_id.clone(),
        stripe_subscription_id: user.stripe_subscription_id.clone(),
        stripe_current_period_end: user.stripe_current_period_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRO_TEST_PRICE: &str = "price_1QA6XIDPMy5TYGinQ9DZbKLh";

    fn user(price_id: Option<&str>, period_end: Option<DateTime<Utc>>) -> UserEntity {
        UserEntity {
            stripe_customer_id: price_id.map(|_| "cus_123".to_string()),
            stripe_subscription_id: price_id.map(|_| "sub_123".to_string()),
            stripe_price_id: price_id.map(str::to_string),
            stripe_current_period_end: period_end,
            ..UserEntity::reader()
        }
    }

    #[test]
    fn test_user_without_subscription_gets_free_plan() {
        let plan = resolve_subscription(&user(None, None), StripeMode::Test, Utc::now());
        assert!(!plan.is_subscribed);
        assert_eq!(plan.plan.slug, "free");
    }

    #[test]
    fn test_active_subscription_resolves_pro() {
        let now = Utc::now();
        let u = user(Some(PRO_TEST_PRICE), Some(now + Duration::days(10)));

        let plan = resolve_subscription(&u, StripeMode::Test, now);
        assert!(plan.is_subscribed);
        assert_eq!(plan.plan.slug, "pro");
        assert_eq!(plan.stripe_customer_id.as_deref(), Some("cus_123"));
    }

    #[test]
    fn test_subscription_has_one_day_grace() {
        let now = Utc::now();

        let u = user(Some(PRO_TEST_PRICE), Some(now - Duration::hours(12)));
        assert!(resolve_subscription(&u, StripeMode::Test, now).is_subscribed);

        let u = user(Some(PRO_TEST_PRICE), Some(now - Duration::days(2)));
        let plan = resolve_subscription(&u, StripeMode::Test, now);
        assert!(!plan.is_subscribed);
        assert_eq!(plan.plan.slug, "free");
    }

    #[test]
    fn test_unknown_price_falls_back_to_free() {
        let now = Utc::now();
        let u = user(Some("price_unknown"), Some(now + Duration::days(10)));

        let plan = resolve_subscription(&u, StripeMode::Test, now);
        assert!(plan.is_subscribed);
        assert_eq!(plan.plan.slug, "free");
    }

    #[test]
    fn test_price_ids_depend_on_mode() {
        let now = Utc::now();
        let u = user(Some(PRO_TEST_PRICE), Some(now + Duration::days(10)));

        let plan = resolve_subscription(&u, StripeMode::Production, now);
        assert_eq!(plan.plan.slug, "free");
    }
}
