use uuid::Uuid;

use crate::domain::{
    entities::user_notifications::InsertUserNotificationEntity,
    value_objects::{enums::notification_types::NotificationType, money::MinorUnits},
};

pub const SUBSCRIPTION_ACTION_LINK: &str = "/dashboard/subscription";
pub const BILLING_ACTION_LINK: &str = "/dashboard/billing";

fn notification(
    user_id: Uuid,
    notification_type: NotificationType,
    title: &str,
    message: String,
    action_link: &str,
) -> InsertUserNotificationEntity {
    InsertUserNotificationEntity {
        user_id,
        title: title.to_string(),
        message,
        notification_type: notification_type.to_string(),
        action_link: Some(action_link.to_string()),
        dedupe_key: None,
    }
}

pub fn subscription_activated(user_id: Uuid, plan_id: Option<&str>) -> InsertUserNotificationEntity {
    let message = match plan_id {
        Some(plan) => format!("Your {plan} subscription is now active. Welcome aboard!"),
        None => "Your subscription is now active. Welcome aboard!".to_string(),
    };
    notification(
        user_id,
        NotificationType::Success,
        "Subscription activated",
        message,
        SUBSCRIPTION_ACTION_LINK,
    )
}

pub fn subscription_will_end(user_id: Uuid) -> InsertUserNotificationEntity {
    notification(
        user_id,
        NotificationType::Info,
        "Subscription will end",
        "Your subscription will end at the close of the current billing period.".to_string(),
        SUBSCRIPTION_ACTION_LINK,
    )
}

pub fn subscription_renewed(user_id: Uuid) -> InsertUserNotificationEntity {
    notification(
        user_id,
        NotificationType::Success,
        "Subscription renewed",
        "Your subscription will continue to renew automatically.".to_string(),
        SUBSCRIPTION_ACTION_LINK,
    )
}

pub fn subscription_ended(user_id: Uuid) -> InsertUserNotificationEntity {
    notification(
        user_id,
        NotificationType::Info,
        "Subscription ended",
        "Your subscription has ended. You can resubscribe at any time.".to_string(),
        SUBSCRIPTION_ACTION_LINK,
    )
}

pub fn payment_failed(
    user_id: Uuid,
    amount_due: MinorUnits,
    currency: &str,
) -> InsertUserNotificationEntity {
    notification(
        user_id,
        NotificationType::Error,
        "Payment failed",
        format!(
            "We could not collect {} {}. Please update your payment method.",
            amount_due.to_major_string(),
            currency.to_ascii_uppercase()
        ),
        BILLING_ACTION_LINK,
    )
}
