//! Persistence abstraction over a document store.
//!
//! The pipeline only ever talks to [`InquiryStore`]; the concrete backend is
//! a deployment concern. Records keep optional fields optional all the way
//! into serialization (`skip_serializing_if`) so a backend that rejects
//! null/undefined writes never sees them.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::InquiryStatus;
use crate::pricing::PricingConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InquiryId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl std::fmt::Display for InquiryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commercial tier an owner signed up under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnerTier {
    AssetPartner,
    PerformanceStarter,
    Buyout,
}

/// A villa's payee and contact record. Created once per owner email;
/// mutated rarely, never deleted in normal operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub name: String,
    pub email: String,
    pub tier: OwnerTier,
    pub payout_account: String,
    pub currency: String,
    pub contract_start: NaiveDate,
    pub contract_months: u32,
    pub commission_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOwner {
    pub name: String,
    pub email: String,
    pub tier: OwnerTier,
    pub payout_account: String,
    pub currency: String,
    pub contract_start: NaiveDate,
    pub contract_months: u32,
    pub commission_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingLocation {
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Hidden,
}

/// One rentable property. The slug is the stable external identifier and is
/// immutable after onboarding; `owner_id` is soft, and everything that reads
/// it degrades gracefully when the owner record is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    pub location: ListingLocation,
    pub max_guests: u32,
    pub commission_percent: f64,
    pub base_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingConfig>,
    pub status: ListingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    pub location: ListingLocation,
    pub max_guests: u32,
    pub commission_percent: f64,
    pub base_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingConfig>,
    pub status: ListingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSource {
    Airbnb,
    Booking,
    Manual,
}

/// An externally sourced or manually entered unavailable range. Dates are
/// half-open: `end_date` is the first free day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarBlock {
    pub id: String,
    pub listing_id: ListingId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub source: BlockSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalendarBlock {
    pub listing_id: ListingId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub source: BlockSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InquiryOrigin {
    VillaSite,
    Whatsapp,
    Manual,
    Phone,
    Email,
}

/// A guest's stay request, the durable audit trail of the pipeline.
/// Never deleted; mutated only through status transitions.
///
/// `owner_email` is snapshotted at creation so a later change to the owner
/// record cannot silently redirect an in-flight approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub id: InquiryId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,
    pub guest_name: String,
    pub guest_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub party_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occasion: Option<String>,
    pub origin: InquiryOrigin,
    pub status: InquiryStatus,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInquiry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,
    pub guest_name: String,
    pub guest_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub party_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occasion: Option<String>,
    pub origin: InquiryOrigin,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
}

/// Fields an inquiry transition may write alongside the status change.
///
/// `checkout_session_id` distinguishes "leave as is" (`None`) from
/// "clear the stored id" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InquiryUpdate {
    pub quote_amount: Option<f64>,
    pub currency: Option<String>,
    pub checkout_session_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    AwaitingPayment,
    Paid,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingChannel {
    Direct,
    Airbnb,
    Booking,
    Vrbo,
}

/// Created exactly once, when payment completes. Immutable afterwards except
/// for provider-driven status changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    pub inquiry_id: InquiryId,
    pub channel: BookingChannel,
    pub currency: String,
    pub total_amount: f64,
    pub platform_fee_percent: f64,
    pub platform_fee_amount: f64,
    pub owner_amount: f64,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<ListingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,
    pub inquiry_id: InquiryId,
    pub channel: BookingChannel,
    pub currency: String,
    pub total_amount: f64,
    pub platform_fee_percent: f64,
    pub platform_fee_amount: f64,
    pub owner_amount: f64,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
}

/// Commission split for a paid booking: the platform fee is rounded to two
/// decimals, the owner amount is the exact remainder. Rounding the two sides
/// independently would drift off the total by a cent.
pub fn commission_split(total: f64, commission_percent: f64) -> (f64, f64) {
    let fee = (total * commission_percent / 100.0 * 100.0).round() / 100.0;
    let owner = total - fee;
    (fee, owner)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("status conflict: expected {expected:?}, found {actual:?}")]
    StatusConflict {
        expected: InquiryStatus,
        actual: InquiryStatus,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Document-store operations used by the pipeline.
#[async_trait]
pub trait InquiryStore: Send + Sync {
    async fn create_owner(&self, owner: NewOwner) -> Result<Owner, StoreError>;
    async fn get_owner_by_id(&self, id: &OwnerId) -> Result<Option<Owner>, StoreError>;
    async fn find_owner_by_email(&self, email: &str) -> Result<Option<Owner>, StoreError>;

    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError>;
    async fn get_listing_by_slug(&self, slug: &str) -> Result<Option<Listing>, StoreError>;
    async fn get_listing_by_id(&self, id: &ListingId) -> Result<Option<Listing>, StoreError>;

    async fn add_calendar_block(&self, block: NewCalendarBlock)
        -> Result<CalendarBlock, StoreError>;
    /// Blocks overlapping `[check_in, check_out)`:
    /// `start_date < check_out && end_date > check_in`.
    async fn calendar_blocks_overlapping(
        &self,
        listing_id: &ListingId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<CalendarBlock>, StoreError>;

    /// Persist a new inquiry in the initial `pending_owner` status and stamp
    /// created/updated times.
    async fn create_inquiry(&self, inquiry: NewInquiry) -> Result<Inquiry, StoreError>;
    async fn get_inquiry_by_id(&self, id: &InquiryId) -> Result<Option<Inquiry>, StoreError>;
    async fn update_inquiry_status(
        &self,
        id: &InquiryId,
        status: InquiryStatus,
    ) -> Result<(), StoreError>;
    /// Compare-and-swap status transition. Fails with
    /// [`StoreError::StatusConflict`] unless the stored status still equals
    /// `expected`, which makes replayed signed links a safe no-op even when
    /// two requests race.
    async fn transition_inquiry(
        &self,
        id: &InquiryId,
        expected: InquiryStatus,
        next: InquiryStatus,
        update: InquiryUpdate,
    ) -> Result<Inquiry, StoreError>;

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, StoreError>;
    async fn get_booking_by_id(&self, id: &BookingId) -> Result<Option<Booking>, StoreError>;
    async fn update_booking_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
    ) -> Result<(), StoreError>;
}

/// Idempotent owner creation: look up by email first, create only on miss.
pub async fn ensure_owner<S: InquiryStore + ?Sized>(
    store: &S,
    owner: NewOwner,
) -> Result<Owner, StoreError> {
    if let Some(existing) = store.find_owner_by_email(&owner.email).await? {
        return Ok(existing);
    }
    store.create_owner(owner).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_split_sums_to_total_at_the_cent() {
        for (total, pct) in [
            (1000.00, 10.0),
            (1000.00, 15.0),
            (999.99, 10.0),
            (999.99, 15.0),
            (0.01, 10.0),
            (0.01, 15.0),
        ] {
            let (fee, owner) = commission_split(total, pct);
            let recombined = ((fee + owner) * 100.0).round() / 100.0;
            assert_eq!(recombined, total, "total {total} at {pct}%");
            // The fee itself is a clean two-decimal amount.
            assert_eq!((fee * 100.0).round() / 100.0, fee);
        }
    }

    #[test]
    fn commission_split_examples() {
        assert_eq!(commission_split(1000.00, 10.0), (100.0, 900.0));
        let (fee, owner) = commission_split(999.99, 15.0);
        assert_eq!(fee, 150.0);
        assert!((owner - 849.99).abs() < 1e-9);
        let (fee, owner) = commission_split(0.01, 10.0);
        assert_eq!(fee, 0.0);
        assert_eq!(owner, 0.01);
    }
}
