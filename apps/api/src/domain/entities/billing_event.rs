use strum::{AsRefStr, EnumString};

/// Stripe webhook event types the reconciler acts on.
///
/// Anything that fails to parse is acknowledged and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum BillingEventKind {
    #[strum(serialize = "payment_intent.succeeded")]
    PaymentIntentSucceeded,
    #[strum(serialize = "payment_intent.payment_failed")]
    PaymentIntentFailed,
    #[strum(to_string = "invoice.paid", serialize = "invoice.payment_succeeded")]
    InvoicePaid,
    #[strum(serialize = "invoice.payment_failed")]
    InvoicePaymentFailed,
    #[strum(serialize = "customer.subscription.deleted")]
    SubscriptionDeleted,
    #[strum(serialize = "customer.subscription.updated")]
    SubscriptionUpdated,
    #[strum(serialize = "checkout.session.completed")]
    CheckoutSessionCompleted,
    #[strum(serialize = "checkout.session.expired")]
    CheckoutSessionExpired,
}

impl BillingEventKind {
    pub fn parse(event_type: &str) -> Option<Self> {
        event_type.parse().ok()
    }
}
