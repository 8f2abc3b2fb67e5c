use chrono::{DateTime, Utc};

/// Everything the notification renderer needs, as structured context. The
/// core never builds markup; HTML presentation belongs to the mail layer.
#[derive(Debug)]
pub enum Notification<'a> {
    OrderConfirmation {
        order_number: &'a str,
        total_amount: i64,
    },
    RenewalReminder {
        plan_name: &'a str,
        days_before: i64,
        expiry_date: DateTime<Utc>,
    },
    RenewalSuccess {
        plan_name: &'a str,
        start_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
        amount: i64,
    },
    GracePeriodNotice {
        plan_name: &'a str,
        grace_period_end: DateTime<Utc>,
    },
    MembershipSuspended {
        plan_name: &'a str,
    },
}

pub fn render(recipient_name: &str, notification: &Notification<'_>) -> (String, String) {
    match notification {
        Notification::OrderConfirmation {
            order_number,
            total_amount,
        } => (
            format!("Order Confirmation - {order_number}"),
            format!(
                "Hi {recipient_name},\n\nThanks for your order {order_number}.\n\
                 Total: {} VND.\nWe will contact you when it ships.",
                format_vnd(*total_amount)
            ),
        ),
        Notification::RenewalReminder {
            plan_name,
            days_before,
            expiry_date,
        } => {
            let subject = match days_before {
                30 => "Your membership renews in 1 month".to_string(),
                14 => "Your membership renews in 2 weeks".to_string(),
                7 => "Your membership renews in 7 days".to_string(),
                _ => "Membership renewal reminder".to_string(),
            };
            let body = format!(
                "Hi {recipient_name},\n\nYour {plan_name} membership expires on {}.\n\
                 With auto-renewal on, the next billing period starts automatically;\n\
                 otherwise renew from your account page to keep training.",
                expiry_date.format("%B %d, %Y")
            );
            (subject, body)
        }
        Notification::RenewalSuccess {
            plan_name,
            start_date,
            expiry_date,
            amount,
        } => (
            "Membership Renewed Successfully".to_string(),
            format!(
                "Hi {recipient_name},\n\nYour {plan_name} membership was renewed.\n\
                 New period: {} to {}.\nAmount: {} VND.",
                start_date.format("%B %d, %Y"),
                expiry_date.format("%B %d, %Y"),
                format_vnd(*amount)
            ),
        ),
        Notification::GracePeriodNotice {
            plan_name,
            grace_period_end,
        } => (
            "Membership Payment Issue - Grace Period".to_string(),
            format!(
                "Hi {recipient_name},\n\nWe could not renew your {plan_name} membership.\n\
                 Your access continues until {}; please update your payment or renew\n\
                 before then to avoid suspension.",
                grace_period_end.format("%B %d, %Y")
            ),
        ),
        Notification::MembershipSuspended { plan_name } => (
            "Membership Suspended".to_string(),
            format!(
                "Hi {recipient_name},\n\nYour {plan_name} membership has been suspended\n\
                 because the grace period ended without a renewal. Subscribe again at\n\
                 any time to restore access.",
            ),
        ),
    }
}

/// Thousands-grouped VND amount: 1200000 -> "1.200.000".
fn format_vnd(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
