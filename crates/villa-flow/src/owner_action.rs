//! Owner approve/decline handling for signed email links.
//!
//! Links are unauthenticated GETs, so every request goes through signature
//! and expiry verification first, and all verification failures collapse into
//! one indistinguishable [`ActionOutcome::InvalidLink`]. State changes go
//! through the store's compare-and-swap, which makes a double-clicked or
//! replayed link a reportable no-op rather than a second side effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::checkout::{build_session_request, CheckoutProvider};
use crate::config::SiteConfig;
use crate::error::FlowError;
use crate::lifecycle::{transition, InquiryStatus, LifecycleEvent};
use crate::notify::{templates, EmailRouter, Mailer};
use crate::signing::{ActionParams, LinkSigner};
use crate::store::{Inquiry, InquiryStore, InquiryUpdate, Listing, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// Bad signature, expired link, or malformed query. Deliberately opaque.
    InvalidLink,
    NotFound,
    /// The inquiry already left `pending_owner`; the link did nothing.
    AlreadyProcessed { status: InquiryStatus },
    Approved {
        inquiry: Inquiry,
        price: f64,
        currency: String,
        /// `false` when the checkout provider failed and the inquiry stays
        /// `approved` for a manual payment link.
        payment_link_created: bool,
    },
    Declined { inquiry: Inquiry },
}

pub struct OwnerActionService<S, M, C> {
    store: Arc<S>,
    router: Arc<EmailRouter<M>>,
    provider: Arc<C>,
    signer: Arc<LinkSigner>,
    site: SiteConfig,
}

impl<S, M, C> OwnerActionService<S, M, C>
where
    S: InquiryStore,
    M: Mailer,
    C: CheckoutProvider,
{
    pub fn new(
        store: Arc<S>,
        router: Arc<EmailRouter<M>>,
        provider: Arc<C>,
        signer: Arc<LinkSigner>,
        site: SiteConfig,
    ) -> Self {
        Self {
            store,
            router,
            provider,
            signer,
            site,
        }
    }

    pub async fn handle(
        &self,
        query: &str,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, FlowError> {
        let Some(params) = self.signer.parse_and_verify(query, now.timestamp_millis()) else {
            tracing::info!("owner action link rejected");
            return Ok(ActionOutcome::InvalidLink);
        };

        let inquiry_id = crate::store::InquiryId(params.inquiry_id().to_string());
        let Some(inquiry) = self.store.get_inquiry_by_id(&inquiry_id).await? else {
            return Ok(ActionOutcome::NotFound);
        };

        match params {
            ActionParams::Approve {
                price, currency, ..
            } => self.approve(inquiry, price, currency, now).await,
            ActionParams::Decline { .. } => self.decline(inquiry).await,
        }
    }

    /// The approval write is the critical step. The checkout session and the
    /// guest email come after it and degrade: a provider outage leaves the
    /// inquiry `approved` so a payment link can be issued manually.
    async fn approve(
        &self,
        inquiry: Inquiry,
        price: f64,
        currency: String,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, FlowError> {
        let approved = transition(InquiryStatus::PendingOwner, LifecycleEvent::OwnerApproved)
            .map_err(|err| FlowError::Dependency(err.to_string()))?;
        let inquiry = match self
            .store
            .transition_inquiry(
                &inquiry.id,
                InquiryStatus::PendingOwner,
                approved,
                InquiryUpdate {
                    quote_amount: Some(price),
                    currency: Some(currency.clone()),
                    checkout_session_id: None,
                },
            )
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::StatusConflict { actual, .. }) => {
                return Ok(ActionOutcome::AlreadyProcessed { status: actual });
            }
            Err(StoreError::NotFound) => return Ok(ActionOutcome::NotFound),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(inquiry_id = %inquiry.id, price, %currency, "inquiry approved by owner");

        let listing = self.listing_for(&inquiry).await;
        let villa_name = listing
            .as_ref()
            .map(|listing| listing.name.clone())
            .unwrap_or_else(|| "our villa".to_string());
        let slug = listing
            .as_ref()
            .map(|listing| listing.slug.clone())
            .unwrap_or_else(|| "villa".to_string());

        let request = build_session_request(
            &inquiry,
            &villa_name,
            &slug,
            "en",
            price,
            &currency,
            &self.site,
            now,
        );

        let (inquiry, payment_url) = match self.provider.create_session(&request).await {
            Ok(session) => {
                let awaiting =
                    transition(InquiryStatus::Approved, LifecycleEvent::CheckoutSessionCreated)
                        .map_err(|err| FlowError::Dependency(err.to_string()))?;
                let updated = self
                    .store
                    .transition_inquiry(
                        &inquiry.id,
                        InquiryStatus::Approved,
                        awaiting,
                        InquiryUpdate {
                            checkout_session_id: Some(Some(session.id.clone())),
                            ..InquiryUpdate::default()
                        },
                    )
                    .await?;
                tracing::info!(
                    inquiry_id = %updated.id,
                    session_id = %session.id,
                    "checkout session created"
                );
                (updated, Some(session.url))
            }
            Err(err) => {
                tracing::error!(
                    inquiry_id = %inquiry.id,
                    error = %err,
                    "checkout session failed, inquiry left approved"
                );
                (inquiry, None)
            }
        };

        let brand = self.router.routing().from_name.clone();
        let content = templates::guest_approval(
            &inquiry,
            &villa_name,
            price,
            &currency,
            payment_url.as_deref(),
        );
        if let Err(err) = self
            .router
            .send_guest_message(
                &brand,
                &inquiry.guest_email,
                inquiry.owner_email.as_deref(),
                content,
            )
            .await
        {
            // The status write already landed; the email is best-effort
            // from here.
            tracing::error!(inquiry_id = %inquiry.id, error = %err, "guest approval email failed");
        }

        Ok(ActionOutcome::Approved {
            payment_link_created: payment_url.is_some(),
            price,
            currency,
            inquiry,
        })
    }

    async fn decline(&self, inquiry: Inquiry) -> Result<ActionOutcome, FlowError> {
        let declined = transition(InquiryStatus::PendingOwner, LifecycleEvent::OwnerDeclined)
            .map_err(|err| FlowError::Dependency(err.to_string()))?;
        let inquiry = match self
            .store
            .transition_inquiry(
                &inquiry.id,
                InquiryStatus::PendingOwner,
                declined,
                InquiryUpdate::default(),
            )
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::StatusConflict { actual, .. }) => {
                return Ok(ActionOutcome::AlreadyProcessed { status: actual });
            }
            Err(StoreError::NotFound) => return Ok(ActionOutcome::NotFound),
            Err(err) => return Err(err.into()),
        };
        tracing::info!(inquiry_id = %inquiry.id, "inquiry declined by owner");

        let listing = self.listing_for(&inquiry).await;
        let villa_name = listing
            .as_ref()
            .map(|listing| listing.name.clone())
            .unwrap_or_else(|| "our villa".to_string());

        let brand = self.router.routing().from_name.clone();
        let content = templates::guest_decline(&inquiry, &villa_name);
        if let Err(err) = self
            .router
            .send_guest_message(
                &brand,
                &inquiry.guest_email,
                inquiry.owner_email.as_deref(),
                content,
            )
            .await
        {
            tracing::warn!(inquiry_id = %inquiry.id, error = %err, "guest decline email failed");
        }

        Ok(ActionOutcome::Declined { inquiry })
    }

    async fn listing_for(&self, inquiry: &Inquiry) -> Option<Listing> {
        let id = inquiry.listing_id.as_ref()?;
        match self.store.get_listing_by_id(id).await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::warn!(error = %err, "listing lookup failed");
                None
            }
        }
    }
}
