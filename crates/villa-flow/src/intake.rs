//! Public inquiry intake: bot gating, validation, persistence, and the
//! notification fan-out that puts a signed decision in the owner's inbox.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};

use crate::config::{RoutingConfig, SiteConfig};
use crate::error::{FlowError, ValidationErrors};
use crate::notify::{resolve_owner_email, templates, EmailRouter, Mailer};
use crate::pricing::{calculate_quote, default_pricing, QuoteBreakdown};
use crate::signing::LinkSigner;
use crate::store::{InquiryId, InquiryOrigin, InquiryStore, Listing, NewInquiry};

/// Submissions faster than this since form render are not human.
pub const MIN_DWELL_MILLIS: i64 = 3_000;

/// Free-text from guests is capped before persistence.
pub const MAX_NOTES_CHARS: usize = 2_000;

/// The inquiry form as browsers actually send it. Field names changed across
/// site revisions, so both spellings stay accepted, and numeric fields arrive
/// as strings from classic form posts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInquiryForm {
    #[serde(alias = "fullName")]
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "checkInDate", alias = "checkIn")]
    pub check_in: Option<String>,
    #[serde(rename = "checkOutDate", alias = "checkOut")]
    pub check_out: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub adults: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    pub children: Option<u32>,
    #[serde(alias = "slug")]
    pub villa: Option<String>,
    pub lang: Option<String>,
    #[serde(alias = "notes")]
    pub message: Option<String>,
    pub occasion: Option<String>,
    // Honeypot fields: hidden in the real form, filled only by bots.
    pub company: Option<String>,
    pub website: Option<String>,
    /// Millisecond timestamp stamped into the form at render time.
    #[serde(rename = "renderedAt", deserialize_with = "lenient_i64")]
    pub rendered_at: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        NumberOrText::Number(n) if n.is_finite() && n >= 0.0 => Some(n as u32),
        NumberOrText::Text(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<NumberOrText>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        NumberOrText::Number(n) if n.is_finite() => Some(n as i64),
        NumberOrText::Text(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Request context captured outside the form body.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// A form that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidInquiry {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u32,
    pub children: u32,
    pub villa_slug: Option<String>,
    pub lang: String,
    pub notes: Option<String>,
    pub occasion: Option<String>,
}

impl ValidInquiry {
    pub fn party_size(&self) -> u32 {
        self.adults + self.children
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    Accepted { inquiry_id: InquiryId },
    /// Bot gate tripped. The caller must answer exactly as if accepted.
    SilentlyDropped,
    Rejected(ValidationErrors),
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Character-boundary-safe truncation for guest free text.
fn truncate_notes(notes: String) -> String {
    if notes.chars().count() <= MAX_NOTES_CHARS {
        return notes;
    }
    notes.chars().take(MAX_NOTES_CHARS).collect()
}

/// Structural validation only; availability and pricing come later.
pub fn validate(form: &RawInquiryForm) -> Result<ValidInquiry, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let name = trimmed(form.name.as_ref());
    if name.is_none() {
        errors.push("name", "name is required");
    }

    let email = trimmed(form.email.as_ref()).filter(|email| {
        let (local, domain) = match email.split_once('@') {
            Some(parts) => parts,
            None => return false,
        };
        !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
    });
    if email.is_none() {
        errors.push("email", "a valid email address is required");
    }

    let check_in = trimmed(form.check_in.as_ref())
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok());
    if check_in.is_none() {
        errors.push("checkInDate", "check-in must be an ISO date (YYYY-MM-DD)");
    }
    let check_out = trimmed(form.check_out.as_ref())
        .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok());
    if check_out.is_none() {
        errors.push("checkOutDate", "check-out must be an ISO date (YYYY-MM-DD)");
    }
    if let (Some(check_in), Some(check_out)) = (check_in, check_out) {
        if check_out <= check_in {
            errors.push("checkOutDate", "check-out must be after check-in");
        }
    }

    let adults = form.adults.unwrap_or(0);
    if adults == 0 {
        errors.push("adults", "at least one adult is required");
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidInquiry {
        name: name.unwrap_or_default(),
        email: email.unwrap_or_default(),
        phone: trimmed(form.phone.as_ref()),
        check_in: check_in.unwrap_or_default(),
        check_out: check_out.unwrap_or_default(),
        adults,
        children: form.children.unwrap_or(0),
        villa_slug: trimmed(form.villa.as_ref()),
        lang: trimmed(form.lang.as_ref()).unwrap_or_else(|| "en".to_string()),
        notes: trimmed(form.message.as_ref()).map(truncate_notes),
        occasion: trimmed(form.occasion.as_ref()),
    })
}

/// `true` when the submission should be silently dropped.
fn looks_automated(form: &RawInquiryForm, now_millis: i64) -> bool {
    if trimmed(form.company.as_ref()).is_some() || trimmed(form.website.as_ref()).is_some() {
        return true;
    }
    // No render timestamp reads as automated too: the real form always
    // stamps one.
    match form.rendered_at {
        Some(rendered_at) => now_millis - rendered_at < MIN_DWELL_MILLIS,
        None => true,
    }
}

/// Intake pipeline: gate, validate, persist, notify.
pub struct InquiryPipeline<S, M> {
    store: Arc<S>,
    router: Arc<EmailRouter<M>>,
    signer: Arc<LinkSigner>,
    site: SiteConfig,
}

impl<S, M> InquiryPipeline<S, M>
where
    S: InquiryStore,
    M: Mailer,
{
    pub fn new(
        store: Arc<S>,
        router: Arc<EmailRouter<M>>,
        signer: Arc<LinkSigner>,
        site: SiteConfig,
    ) -> Self {
        Self {
            store,
            router,
            signer,
            site,
        }
    }

    fn routing(&self) -> &RoutingConfig {
        self.router.routing()
    }

    /// Handle one submission. The owner notification is the critical side
    /// effect: if it cannot be sent the whole submission fails, because a
    /// stored inquiry nobody hears about is a lost booking. The guest receipt
    /// is best-effort.
    pub async fn submit(
        &self,
        form: RawInquiryForm,
        meta: RequestMeta,
        now: DateTime<Utc>,
    ) -> Result<IntakeOutcome, FlowError> {
        if looks_automated(&form, now.timestamp_millis()) {
            tracing::info!(ip = ?meta.ip, "submission dropped by bot gate");
            return Ok(IntakeOutcome::SilentlyDropped);
        }

        let valid = match validate(&form) {
            Ok(valid) => valid,
            Err(errors) => return Ok(IntakeOutcome::Rejected(errors)),
        };

        let listing = self.lookup_listing(valid.villa_slug.as_deref()).await;
        let villa_name = listing
            .as_ref()
            .map(|listing| listing.name.clone())
            .or_else(|| valid.villa_slug.clone())
            .unwrap_or_else(|| "our villa".to_string());

        let pricing = listing
            .as_ref()
            .and_then(|listing| listing.pricing.clone())
            .unwrap_or_else(|| {
                let currency = listing
                    .as_ref()
                    .map(|listing| listing.base_currency.as_str())
                    .unwrap_or("EUR");
                default_pricing(currency)
            });
        let quote: Option<QuoteBreakdown> = if pricing.is_rate_on_request() {
            None
        } else {
            Some(calculate_quote(
                &pricing,
                valid.check_in,
                valid.check_out,
                valid.party_size(),
            ))
        };

        let owner_email =
            resolve_owner_email(listing.as_ref(), self.store.as_ref(), self.routing()).await;

        let inquiry = self
            .store
            .create_inquiry(NewInquiry {
                listing_id: listing.as_ref().map(|listing| listing.id.clone()),
                guest_name: valid.name.clone(),
                guest_email: valid.email.clone(),
                guest_phone: valid.phone.clone(),
                check_in: valid.check_in,
                check_out: valid.check_out,
                party_size: valid.party_size(),
                message: valid.notes.clone(),
                occasion: valid.occasion.clone(),
                origin: InquiryOrigin::VillaSite,
                currency: pricing.currency.clone(),
                owner_email: Some(owner_email.clone()),
            })
            .await?;

        tracing::info!(
            inquiry_id = %inquiry.id,
            villa = %villa_name,
            nights = (valid.check_out - valid.check_in).num_days(),
            "inquiry stored"
        );

        let endpoint = self.site.owner_action_url();
        let (approve_url, decline_url) = match quote.as_ref() {
            Some(quote) => (
                Some(self.signer.approve_url(
                    &endpoint,
                    &inquiry.id.0,
                    quote.total,
                    &quote.currency,
                    now,
                )),
                Some(self.signer.decline_url(&endpoint, &inquiry.id.0, now)),
            ),
            // Rate on request: no price exists yet, so no link may commit one.
            None => (None, None),
        };

        let brand = self.routing().from_name.clone();
        let notice = templates::owner_notice(&templates::OwnerNotice {
            villa_name: &villa_name,
            lang: &valid.lang,
            guest_name: &valid.name,
            guest_email: &valid.email,
            guest_phone: valid.phone.as_deref(),
            check_in: valid.check_in,
            check_out: valid.check_out,
            adults: valid.adults,
            children: valid.children,
            notes: valid.notes.as_deref(),
            occasion: valid.occasion.as_deref(),
            quote: quote.as_ref(),
            approve_url: approve_url.as_deref(),
            decline_url: decline_url.as_deref(),
            user_agent: meta.user_agent.as_deref(),
            ip: meta.ip.as_deref(),
        });
        self.router
            .send_owner_notification(&brand, Some(&owner_email), &valid.email, notice)
            .await?;

        let receipt = templates::guest_receipt(&inquiry, &villa_name);
        if let Err(err) = self
            .router
            .send_guest_message(&brand, &valid.email, Some(&owner_email), receipt)
            .await
        {
            tracing::warn!(inquiry_id = %inquiry.id, error = %err, "guest receipt failed");
        }

        Ok(IntakeOutcome::Accepted {
            inquiry_id: inquiry.id,
        })
    }

    async fn lookup_listing(&self, slug: Option<&str>) -> Option<Listing> {
        let slug = slug?;
        match self.store.get_listing_by_slug(slug).await {
            Ok(Some(listing)) => Some(listing),
            Ok(None) => {
                tracing::warn!(slug, "inquiry references unknown listing");
                None
            }
            Err(err) => {
                tracing::warn!(slug, error = %err, "listing lookup failed");
                None
            }
        }
    }
}
