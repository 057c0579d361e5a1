use serde::{Deserialize, Serialize};

use crate::{
    domain::value_objects::money::MinorUnits,
    payments::stripe_client::{StripeExpandable, StripePrice},
};

/// A recurring price as shown on the pricing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlanDto {
    pub price_id: String,
    pub product_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub amount: MinorUnits,
    pub display_amount: String,
    pub currency: String,
    pub interval: String,
    pub interval_count: u32,
}

impl From<StripePrice> for SubscriptionPlanDto {
    fn from(price: StripePrice) -> Self {
        let (product_id, product_name, description) = match price.product {
            Some(StripeExpandable::Object(product)) => {
                (Some(product.id), product.name, product.description)
            }
            Some(StripeExpandable::Id(id)) => (Some(id), None, None),
            None => (None, None, None),
        };

        let amount = MinorUnits::new(price.unit_amount.unwrap_or(0));
        let (interval, interval_count) = price
            .recurring
            .map(|recurring| (recurring.interval, recurring.interval_count.unwrap_or(1)))
            .unwrap_or_else(|| ("month".to_string(), 1));

        Self {
            name: product_name
                .or(price.nickname)
                .unwrap_or_else(|| price.id.clone()),
            price_id: price.id,
            product_id,
            description,
            amount,
            display_amount: amount.to_major_string(),
            currency: price.currency,
            interval,
            interval_count,
        }
    }
}
