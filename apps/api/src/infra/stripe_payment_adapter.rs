use async_trait::async_trait;
use secrecy::SecretString;
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_provider::{
        BillingProviderPort, CheckoutSession, CheckoutUrls, CreatedSubscription, CustomerId,
        CustomerRequest, PriceRequest, SubscriptionId,
    },
    infra::stripe_client::StripeClient,
};

/// Adapter that wraps StripeClient to implement BillingProviderPort.
pub struct StripePaymentAdapter {
    client: StripeClient,
}

impl StripePaymentAdapter {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: StripeClient::new(secret_key),
        }
    }
}

/// Idempotency key for the one customer a user may own upstream.
pub fn customer_idempotency_key(request: &CustomerRequest) -> String {
    format!("customer-{}", request.user_id)
}

#[async_trait]
impl BillingProviderPort for StripePaymentAdapter {
    // ========================================================================
    // Catalog Mirror
    // ========================================================================

    #[instrument(skip(self, description))]
    async fn create_product(&self, name: &str, description: Option<&str>) -> AppResult<String> {
        let product = self.client.create_product(name, description).await?;
        Ok(product.id)
    }

    #[instrument(skip(self, name, description))]
    async fn update_product(
        &self,
        product_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> AppResult<()> {
        self.client
            .update_product(product_id, name, description)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_price(&self, request: PriceRequest<'_>) -> AppResult<String> {
        let price = self
            .client
            .create_price(
                request.product_id,
                request.unit_amount_cents,
                request.currency,
                request.interval,
            )
            .await?;
        Ok(price.id)
    }

    // ========================================================================
    // Customers
    // ========================================================================

    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    async fn ensure_customer(&self, request: &CustomerRequest) -> AppResult<CustomerId> {
        let customer = self
            .client
            .create_customer(
                &request.email,
                &request.name,
                &request.user_id.to_string(),
                &customer_idempotency_key(request),
            )
            .await?;
        Ok(CustomerId::new(customer.id))
    }

    #[instrument(skip(self))]
    async fn attach_default_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: &str,
    ) -> AppResult<()> {
        self.client
            .attach_payment_method(payment_method_id, customer_id.as_str())
            .await?;
        self.client
            .set_default_payment_method(customer_id.as_str(), payment_method_id)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    #[instrument(skip(self))]
    async fn create_subscription(
        &self,
        customer_id: &CustomerId,
        price_id: &str,
        idempotency_key: &str,
    ) -> AppResult<CreatedSubscription> {
        let sub = self
            .client
            .create_subscription(customer_id.as_str(), price_id, idempotency_key)
            .await?;

        let intent = sub.payment_intent();
        Ok(CreatedSubscription {
            subscription_id: SubscriptionId::new(&sub.id),
            status: sub.status.clone(),
            payment_intent_id: intent.map(|pi| pi.id.clone()),
            client_secret: intent.and_then(|pi| pi.client_secret.clone()),
        })
    }

    #[instrument(skip(self, urls))]
    async fn create_checkout_session(
        &self,
        customer_id: &CustomerId,
        price_id: &str,
        client_reference_id: &str,
        urls: &CheckoutUrls,
    ) -> AppResult<CheckoutSession> {
        let session = self
            .client
            .create_checkout_session(
                customer_id.as_str(),
                price_id,
                &urls.success_url,
                &urls.cancel_url,
                client_reference_id,
            )
            .await?;

        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_subscription(&self, subscription_id: &SubscriptionId) -> AppResult<()> {
        match self.client.cancel_subscription(subscription_id.as_str()).await {
            Ok(_) => Ok(()),
            // Already gone upstream.
            Err(AppError::InvalidInput(msg)) if msg.contains("No such subscription") => Ok(()),
            Err(e) => Err(e),
        }
    }
}
