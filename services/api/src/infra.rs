//! In-process stand-ins for the mail and payment dependencies, plus shared
//! server state. A deployment swaps these for real adapters without touching
//! the routes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use villa_flow::checkout::{
    CheckoutError, CheckoutEvent, CheckoutEventKind, CheckoutMetadata, CheckoutProvider,
    CheckoutSession, CheckoutSessionRequest,
};
use villa_flow::notify::{EmailMessage, Mailer, MailerError, SendReceipt};
use villa_flow::pricing::default_pricing;
use villa_flow::store::{
    InquiryStore, ListingLocation, ListingStatus, MemoryStore, NewListing, NewOwner, OwnerTier,
    StoreError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Logs outbound mail instead of delivering it.
#[derive(Default)]
pub(crate) struct LogMailer {
    sequence: AtomicU64,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailerError> {
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            to = %message.to,
            bcc = ?message.bcc,
            reply_to = %message.reply_to,
            subject = %message.subject,
            "outbound email (log transport)"
        );
        Ok(SendReceipt {
            id: format!("log-{id}"),
        })
    }
}

/// Development checkout provider: mints predictable sessions and verifies
/// webhook payloads against a shared token.
pub(crate) struct StubCheckoutProvider {
    webhook_token: Vec<u8>,
    sequence: AtomicU64,
}

impl StubCheckoutProvider {
    pub(crate) fn new(webhook_token: &str) -> Self {
        Self {
            webhook_token: webhook_token.as_bytes().to_vec(),
            sequence: AtomicU64::new(0),
        }
    }
}

/// Processor-shaped envelope: the event type plus the session object.
#[derive(Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: WebhookData,
}

#[derive(Deserialize)]
struct WebhookData {
    object: WebhookSession,
}

#[derive(Deserialize)]
struct WebhookSession {
    id: String,
    metadata: CheckoutMetadata,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[async_trait]
impl CheckoutProvider for StubCheckoutProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let id = format!("cs_dev_{}", self.sequence.fetch_add(1, Ordering::SeqCst));
        tracing::info!(
            session_id = %id,
            amount_minor = request.amount_minor,
            currency = %request.currency,
            expires_at = %request.expires_at,
            "dev checkout session created"
        );
        Ok(CheckoutSession {
            url: format!("https://checkout.invalid/pay/{id}"),
            id,
        })
    }

    fn verify_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<Option<CheckoutEvent>, CheckoutError> {
        let provided = signature.as_bytes();
        if provided.len() != self.webhook_token.len()
            || !bool::from(provided.ct_eq(&self.webhook_token))
        {
            return Err(CheckoutError::InvalidSignature);
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|err| CheckoutError::MalformedEvent(err.to_string()))?;
        let kind = match envelope.kind.as_str() {
            "checkout.session.completed" => CheckoutEventKind::Completed,
            "checkout.session.expired" => CheckoutEventKind::Expired,
            _ => return Ok(None),
        };
        Ok(Some(CheckoutEvent {
            kind,
            session_id: envelope.data.object.id,
            metadata: envelope.data.object.metadata,
            amount_total_minor: envelope.data.object.amount_total,
            payment_intent_id: envelope.data.object.payment_intent,
        }))
    }
}

/// One owner and one priced listing, enough to walk the whole pipeline.
pub(crate) async fn seed_demo_data(store: &MemoryStore) -> Result<String, StoreError> {
    let owner = store
        .create_owner(NewOwner {
            name: "Alex Duran".to_string(),
            email: "owner@villa-azure.example".to_string(),
            tier: OwnerTier::AssetPartner,
            payout_account: "acct_demo_1".to_string(),
            currency: "EUR".to_string(),
            contract_start: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap_or_default(),
            contract_months: 24,
            commission_percent: 15.0,
        })
        .await?;
    let listing = store
        .create_listing(NewListing {
            slug: "villa-azure".to_string(),
            name: "Villa Azure".to_string(),
            owner_id: Some(owner.id),
            location: ListingLocation {
                country: "ES".to_string(),
                region: Some("Ibiza".to_string()),
                city: None,
            },
            max_guests: 8,
            commission_percent: 12.0,
            base_currency: "EUR".to_string(),
            pricing: Some(default_pricing("EUR")),
            status: ListingStatus::Active,
        })
        .await?;
    tracing::info!(slug = %listing.slug, "demo listing seeded");
    Ok(listing.slug)
}
