use async_trait::async_trait;
use hibiscus_core::payment::{CheckoutOutcome, CheckoutRequest, CheckoutSession, PaymentGateway};
use hibiscus_core::{CoreError, CoreResult};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe hosted Checkout over its form-encoded REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

fn checkout_form(request: &CheckoutRequest) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("mode", "payment".to_string()),
        ("payment_method_types[]", "card".to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", request.currency.clone()),
        ("line_items[0][price_data][unit_amount]", request.amount_cents.to_string()),
        ("line_items[0][price_data][product_data][name]", request.product_name.clone()),
        ("line_items[0][price_data][product_data][description]", request.description.clone()),
        ("success_url", request.success_url.clone()),
        ("cancel_url", request.cancel_url.clone()),
        ("metadata[booking_id]", request.booking_id.clone()),
    ];
    if let Some(expires_at) = request.expires_at {
        form.push(("expires_at", expires_at.timestamp().to_string()));
    }
    form
}

impl StripeGateway {
    pub fn new(secret_key: &str, timeout: Duration) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::upstream)?;
        Ok(Self {
            client,
            secret_key: secret_key.to_string(),
        })
    }

    async fn read(response: reqwest::Response) -> CoreResult<SessionBody> {
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::upstream(format!("Stripe returned {status}: {detail}")));
        }
        response
            .json::<SessionBody>()
            .await
            .map_err(|e| CoreError::upstream(format!("Stripe body: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> CoreResult<CheckoutSession> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(|e| CoreError::upstream(format!("Stripe request failed: {e}")))?;

        let body = Self::read(response).await?;
        let url = body
            .url
            .ok_or_else(|| CoreError::upstream("Stripe session has no url"))?;
        Ok(CheckoutSession { id: body.id, url })
    }

    async fn fetch_checkout_session(&self, session_id: &str) -> CoreResult<CheckoutOutcome> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", STRIPE_API_BASE, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| CoreError::upstream(format!("Stripe request failed: {e}")))?;

        let mut body = Self::read(response).await?;
        Ok(CheckoutOutcome {
            paid: body.payment_status.as_deref() == Some("paid"),
            booking_id: body.metadata.remove("booking_id"),
            session_id: body.id,
        })
    }
}
