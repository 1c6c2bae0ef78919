//! Hosted-checkout seam and webhook reconciliation.
//!
//! The pipeline never talks to a payment processor directly; it builds a
//! [`CheckoutSessionRequest`], hands it to a [`CheckoutProvider`], and later
//! reconciles the provider's webhook events against the inquiry record. All
//! money crossing this boundary is in minor units (cents).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SiteConfig;
use crate::error::FlowError;
use crate::lifecycle::{transition, InquiryStatus, LifecycleEvent};
use crate::notify::{resolve_owner_email, templates, EmailRouter, Mailer};
use crate::store::{
    commission_split, BookingChannel, BookingStatus, Inquiry, InquiryId, InquiryStore,
    InquiryUpdate, NewBooking,
};

/// Sessions expire just inside the processor's 24-hour ceiling so our expiry
/// always fires before theirs would reject the value.
pub const SESSION_LIFETIME_HOURS: i64 = 23;

const DEFAULT_COMMISSION_PERCENT: f64 = 10.0;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("checkout provider failure: {0}")]
    Provider(String),
    #[error("webhook signature rejected")]
    InvalidSignature,
    #[error("webhook payload malformed: {0}")]
    MalformedEvent(String),
}

/// Carried on the session so webhook events can reconstruct context without
/// any processor-side state of ours. Only `inquiry_id` is load-bearing; the
/// rest is there for support staff reading the provider dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    #[serde(rename = "inquiryId")]
    pub inquiry_id: String,
    #[serde(rename = "listingId", skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    #[serde(rename = "villaSlug", skip_serializing_if = "Option::is_none")]
    pub villa_slug: Option<String>,
    #[serde(rename = "guestEmail", skip_serializing_if = "Option::is_none")]
    pub guest_email: Option<String>,
    #[serde(rename = "checkIn", skip_serializing_if = "Option::is_none")]
    pub check_in: Option<chrono::NaiveDate>,
    #[serde(rename = "checkOut", skip_serializing_if = "Option::is_none")]
    pub check_out: Option<chrono::NaiveDate>,
    #[serde(rename = "partySize", skip_serializing_if = "Option::is_none")]
    pub party_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl CheckoutMetadata {
    /// Bare metadata carrying only the inquiry reference.
    pub fn for_inquiry(inquiry_id: &InquiryId) -> Self {
        Self {
            inquiry_id: inquiry_id.0.clone(),
            listing_id: None,
            villa_slug: None,
            guest_email: None,
            check_in: None,
            check_out: None,
            party_size: None,
            lang: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionRequest {
    pub amount_minor: i64,
    /// Lowercase ISO 4217, the convention hosted checkouts expect.
    pub currency: String,
    /// Line-item name shown on the hosted page, the listing's display name.
    pub product_name: String,
    pub description: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub expires_at: DateTime<Utc>,
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEventKind {
    Completed,
    Expired,
}

/// A verified, decoded webhook event the pipeline reacts to.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutEvent {
    pub kind: CheckoutEventKind,
    pub session_id: String,
    pub metadata: CheckoutMetadata,
    pub amount_total_minor: Option<i64>,
    pub payment_intent_id: Option<String>,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, CheckoutError>;

    /// Verify the transport signature and decode the payload. Event types the
    /// pipeline does not react to decode to `Ok(None)`; a bad signature is an
    /// error the caller must surface as a rejection.
    fn verify_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<Option<CheckoutEvent>, CheckoutError>;
}

pub fn amount_to_minor(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn minor_to_amount(minor: i64) -> f64 {
    minor as f64 / 100.0
}

/// One line item for the whole stay; redirect targets are the listing's own
/// localized pages.
#[allow(clippy::too_many_arguments)]
pub fn build_session_request(
    inquiry: &Inquiry,
    villa_name: &str,
    slug: &str,
    lang: &str,
    price: f64,
    currency: &str,
    site: &SiteConfig,
    now: DateTime<Utc>,
) -> CheckoutSessionRequest {
    let nights = (inquiry.check_out - inquiry.check_in).num_days().max(0);
    CheckoutSessionRequest {
        amount_minor: amount_to_minor(price),
        currency: currency.to_ascii_lowercase(),
        product_name: villa_name.to_string(),
        description: format!(
            "{nights} nights: {} to {} ({} guests)",
            inquiry.check_in, inquiry.check_out, inquiry.party_size
        ),
        customer_email: inquiry.guest_email.clone(),
        success_url: site.thank_you_url(slug, lang),
        cancel_url: site.contact_url(slug, lang),
        expires_at: now + Duration::hours(SESSION_LIFETIME_HOURS),
        metadata: CheckoutMetadata {
            inquiry_id: inquiry.id.0.clone(),
            listing_id: inquiry.listing_id.as_ref().map(|id| id.0.clone()),
            villa_slug: Some(slug.to_string()),
            guest_email: Some(inquiry.guest_email.clone()),
            check_in: Some(inquiry.check_in),
            check_out: Some(inquiry.check_out),
            party_size: Some(inquiry.party_size),
            lang: Some(lang.to_string()),
        },
    }
}

/// What a webhook event did once reconciled.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Payment recorded and a booking created.
    Recorded { booking_id: String },
    /// An expired session rolled the inquiry back to `approved`.
    RolledBack,
    /// Already processed, stale, or unresolvable; acknowledged without effect.
    Ignored,
}

/// Applies verified checkout events to the inquiry record.
pub struct PaymentReconciler<S, M> {
    store: Arc<S>,
    router: Arc<EmailRouter<M>>,
}

impl<S, M> PaymentReconciler<S, M>
where
    S: InquiryStore,
    M: Mailer,
{
    pub fn new(store: Arc<S>, router: Arc<EmailRouter<M>>) -> Self {
        Self { store, router }
    }

    /// Events are at-least-once; every branch that is not a fresh state
    /// change resolves to [`WebhookOutcome::Ignored`] so redelivery is safe.
    pub async fn apply(&self, event: CheckoutEvent) -> Result<WebhookOutcome, FlowError> {
        match event.kind {
            CheckoutEventKind::Completed => self.apply_completed(event).await,
            CheckoutEventKind::Expired => self.apply_expired(event).await,
        }
    }

    async fn apply_completed(&self, event: CheckoutEvent) -> Result<WebhookOutcome, FlowError> {
        let inquiry_id = InquiryId(event.metadata.inquiry_id.clone());
        if self.store.get_inquiry_by_id(&inquiry_id).await?.is_none() {
            tracing::warn!(inquiry_id = %inquiry_id, "completed session references unknown inquiry");
            return Ok(WebhookOutcome::Ignored);
        }

        let next = transition(InquiryStatus::AwaitingPayment, LifecycleEvent::PaymentCompleted)
            .map_err(|err| FlowError::Dependency(err.to_string()))?;
        let inquiry = match self
            .store
            .transition_inquiry(
                &inquiry_id,
                InquiryStatus::AwaitingPayment,
                next,
                InquiryUpdate::default(),
            )
            .await
        {
            Ok(updated) => updated,
            Err(crate::store::StoreError::StatusConflict { actual, .. }) => {
                tracing::info!(
                    inquiry_id = %inquiry_id,
                    status = actual.label(),
                    "completed session replayed or raced, no-op"
                );
                return Ok(WebhookOutcome::Ignored);
            }
            Err(err) => return Err(err.into()),
        };

        let total = event
            .amount_total_minor
            .map(minor_to_amount)
            .or(inquiry.quote_amount)
            .unwrap_or(0.0);

        let listing = match inquiry.listing_id.as_ref() {
            Some(id) => self.store.get_listing_by_id(id).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "listing lookup failed during reconciliation");
                None
            }),
            None => None,
        };
        let commission_percent = self.commission_percent_for(listing.as_ref()).await;
        let (fee, owner_amount) = commission_split(total, commission_percent);

        let booking = self
            .store
            .create_booking(NewBooking {
                listing_id: inquiry.listing_id.clone(),
                owner_id: listing.as_ref().and_then(|listing| listing.owner_id.clone()),
                inquiry_id: inquiry.id.clone(),
                channel: BookingChannel::Direct,
                currency: inquiry.currency.clone(),
                total_amount: total,
                platform_fee_percent: commission_percent,
                platform_fee_amount: fee,
                owner_amount,
                status: BookingStatus::Paid,
                checkout_session_id: Some(event.session_id.clone()),
                payment_intent_id: event.payment_intent_id.clone(),
            })
            .await?;

        tracing::info!(
            inquiry_id = %inquiry.id,
            booking_id = %booking.id,
            total,
            fee,
            "payment recorded"
        );

        // Settlement already happened; confirmation mail failures only log.
        let villa_name = listing
            .as_ref()
            .map(|listing| listing.name.clone())
            .or_else(|| event.metadata.villa_slug.clone())
            .unwrap_or_else(|| "your villa".to_string());
        let brand = self.router.routing().from_name.clone();

        let owner_email =
            resolve_owner_email(listing.as_ref(), self.store.as_ref(), self.router.routing()).await;

        let guest_content = templates::guest_payment_confirmation(
            &inquiry,
            &villa_name,
            total,
            &inquiry.currency,
            &booking.id.0,
        );
        if let Err(err) = self
            .router
            .send_guest_message(
                &brand,
                &inquiry.guest_email,
                Some(&owner_email),
                guest_content,
            )
            .await
        {
            tracing::warn!(error = %err, "guest payment confirmation failed");
        }

        let owner_content = templates::owner_payment_notice(
            &inquiry,
            &villa_name,
            total,
            fee,
            owner_amount,
            &inquiry.currency,
            &booking.id.0,
        );
        if let Err(err) = self
            .router
            .send_owner_notification(
                &brand,
                Some(&owner_email),
                &inquiry.guest_email,
                owner_content,
            )
            .await
        {
            tracing::warn!(error = %err, "owner payment notice failed");
        }

        Ok(WebhookOutcome::Recorded {
            booking_id: booking.id.0,
        })
    }

    /// A session the guest never paid expires; the inquiry returns to
    /// `approved` so the owner can reissue a payment link. The stored session
    /// id must still match the event, otherwise a newer session supersedes it.
    async fn apply_expired(&self, event: CheckoutEvent) -> Result<WebhookOutcome, FlowError> {
        let inquiry_id = InquiryId(event.metadata.inquiry_id.clone());
        let Some(inquiry) = self.store.get_inquiry_by_id(&inquiry_id).await? else {
            tracing::warn!(inquiry_id = %inquiry_id, "expired session references unknown inquiry");
            return Ok(WebhookOutcome::Ignored);
        };

        if inquiry.status != InquiryStatus::AwaitingPayment {
            return Ok(WebhookOutcome::Ignored);
        }
        if inquiry.checkout_session_id.as_deref() != Some(event.session_id.as_str()) {
            tracing::info!(inquiry_id = %inquiry_id, "expired session superseded, no-op");
            return Ok(WebhookOutcome::Ignored);
        }

        let next = transition(InquiryStatus::AwaitingPayment, LifecycleEvent::CheckoutExpired)
            .map_err(|err| FlowError::Dependency(err.to_string()))?;
        match self
            .store
            .transition_inquiry(
                &inquiry_id,
                InquiryStatus::AwaitingPayment,
                next,
                InquiryUpdate {
                    checkout_session_id: Some(None),
                    ..InquiryUpdate::default()
                },
            )
            .await
        {
            Ok(_) => {
                tracing::info!(inquiry_id = %inquiry_id, "checkout expired, rolled back to approved");
                Ok(WebhookOutcome::RolledBack)
            }
            Err(crate::store::StoreError::StatusConflict { .. }) => Ok(WebhookOutcome::Ignored),
            Err(err) => Err(err.into()),
        }
    }

    /// Commission fallback chain: listing, then its owner record, then the
    /// platform default.
    async fn commission_percent_for(&self, listing: Option<&crate::store::Listing>) -> f64 {
        let Some(listing) = listing else {
            return DEFAULT_COMMISSION_PERCENT;
        };
        if listing.commission_percent > 0.0 {
            return listing.commission_percent;
        }
        if let Some(owner_id) = listing.owner_id.as_ref() {
            match self.store.get_owner_by_id(owner_id).await {
                Ok(Some(owner)) if owner.commission_percent > 0.0 => {
                    return owner.commission_percent;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "owner lookup failed resolving commission");
                }
            }
        }
        DEFAULT_COMMISSION_PERCENT
    }
}
