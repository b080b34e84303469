use serde::Serialize;

use crate::constants::StripeMode;

const MB: usize = 1024 * 1024;

#[derive(Debug, Serialize, PartialEq)]
pub struct PriceIds {
    pub test: &'static str,
    pub production: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Monthly price in cents.
    pub amount: u32,
    pub price_ids: PriceIds,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: &'static str,
    pub slug: &'static str,
    /// PDF uploads allowed per calendar month.
    pub quota: u32,
    pub pages_per_pdf: u32,
    pub max_file_size: usize,
    pub price: Price,
}

impl Plan {
    pub fn price_id(&self, mode: StripeMode) -> &'static str {
        match mode {
            StripeMode::Test => self.price.price_ids.test,
            StripeMode::Production => self.price.price_ids.production,
        }
    }
}

pub static PLANS: [Plan; 2] = [
    Plan {
        name: "Free",
        slug: "free",
        quota: 7,
        pages_per_pdf: 7,
        max_file_size: 4 * MB,
        price: Price { amount: 0, price_ids: PriceIds { test: "", production: "" } },
    },
    Plan {
        name: "Pro",
        slug: "pro",
        quota: 100,
        pages_per_pdf: 49,
        max_file_size: 16 * MB,
        price: Price {
            amount: 499,
            price_ids: PriceIds { test: "price_1QA6XIDPMy5TYGinQ9DZbKLh", production: "" },
        },
    },
];

pub fn free_plan() -> &'static Plan {
    &PLANS[0]
}

/// Plan whose price id in `mode` equals `price_id`. Empty ids never match.
pub fn plan_for_price(price_id: &str, mode: StripeMode) -> Option<&'static Plan> {
    if price_id.is_empty() {
        return None;
    }
    PLANS.iter().find(|p| p.price_id(mode) == price_id)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub plan: &'static Plan,
    pub is_subscribed: bool,
    pub is_canceled: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_current_period_end: Option<chrono::DateTime<chrono::Utc>>,
}
