//! In-memory reference store, used by the demo, the API wiring until a real
//! backend is configured, and the integration tests. Lives in the core crate
//! so the compare-and-swap semantics are enforced in exactly one place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use super::{
    Booking, BookingId, BookingStatus, CalendarBlock, Inquiry, InquiryId, InquiryStore,
    InquiryUpdate, Listing, ListingId, NewBooking, NewCalendarBlock, NewInquiry, NewListing,
    NewOwner, Owner, OwnerId, StoreError,
};
use crate::lifecycle::InquiryStatus;

#[derive(Default)]
struct Collections {
    owners: HashMap<String, Owner>,
    listings: HashMap<String, Listing>,
    blocks: Vec<CalendarBlock>,
    inquiries: HashMap<String, Inquiry>,
    bookings: HashMap<String, Booking>,
    sequence: u64,
}

impl Collections {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:06}", self.sequence)
    }
}

#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InquiryStore for MemoryStore {
    async fn create_owner(&self, owner: NewOwner) -> Result<Owner, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let id = guard.next_id("own");
        let record = Owner {
            id: OwnerId(id.clone()),
            name: owner.name,
            email: owner.email,
            tier: owner.tier,
            payout_account: owner.payout_account,
            currency: owner.currency,
            contract_start: owner.contract_start,
            contract_months: owner.contract_months,
            commission_percent: owner.commission_percent,
        };
        guard.owners.insert(id, record.clone());
        Ok(record)
    }

    async fn get_owner_by_id(&self, id: &OwnerId) -> Result<Option<Owner>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.owners.get(&id.0).cloned())
    }

    async fn find_owner_by_email(&self, email: &str) -> Result<Option<Owner>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard
            .owners
            .values()
            .find(|owner| owner.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let id = guard.next_id("lst");
        let record = Listing {
            id: ListingId(id.clone()),
            slug: listing.slug,
            name: listing.name,
            owner_id: listing.owner_id,
            location: listing.location,
            max_guests: listing.max_guests,
            commission_percent: listing.commission_percent,
            base_currency: listing.base_currency,
            pricing: listing.pricing,
            status: listing.status,
        };
        guard.listings.insert(id, record.clone());
        Ok(record)
    }

    async fn get_listing_by_slug(&self, slug: &str) -> Result<Option<Listing>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard
            .listings
            .values()
            .find(|listing| listing.slug == slug)
            .cloned())
    }

    async fn get_listing_by_id(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.listings.get(&id.0).cloned())
    }

    async fn add_calendar_block(
        &self,
        block: NewCalendarBlock,
    ) -> Result<CalendarBlock, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let id = guard.next_id("blk");
        let record = CalendarBlock {
            id,
            listing_id: block.listing_id,
            start_date: block.start_date,
            end_date: block.end_date,
            source: block.source,
        };
        guard.blocks.push(record.clone());
        Ok(record)
    }

    async fn calendar_blocks_overlapping(
        &self,
        listing_id: &ListingId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<CalendarBlock>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        // Mirrors the one-inequality-in-the-query, second-inequality-in-memory
        // split a single-range document store forces; result sets are small.
        let first_pass: Vec<CalendarBlock> = guard
            .blocks
            .iter()
            .filter(|block| &block.listing_id == listing_id && block.start_date < check_out)
            .cloned()
            .collect();
        Ok(first_pass
            .into_iter()
            .filter(|block| block.end_date > check_in)
            .collect())
    }

    async fn create_inquiry(&self, inquiry: NewInquiry) -> Result<Inquiry, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let id = guard.next_id("inq");
        let now = Utc::now();
        let record = Inquiry {
            id: InquiryId(id.clone()),
            listing_id: inquiry.listing_id,
            guest_name: inquiry.guest_name,
            guest_email: inquiry.guest_email,
            guest_phone: inquiry.guest_phone,
            check_in: inquiry.check_in,
            check_out: inquiry.check_out,
            party_size: inquiry.party_size,
            message: inquiry.message,
            occasion: inquiry.occasion,
            origin: inquiry.origin,
            status: InquiryStatus::PendingOwner,
            currency: inquiry.currency,
            quote_amount: None,
            owner_email: inquiry.owner_email,
            checkout_session_id: None,
            created_at: now,
            updated_at: now,
        };
        guard.inquiries.insert(id, record.clone());
        Ok(record)
    }

    async fn get_inquiry_by_id(&self, id: &InquiryId) -> Result<Option<Inquiry>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.inquiries.get(&id.0).cloned())
    }

    async fn update_inquiry_status(
        &self,
        id: &InquiryId,
        status: InquiryStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let inquiry = guard.inquiries.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        inquiry.status = status;
        inquiry.updated_at = Utc::now();
        Ok(())
    }

    async fn transition_inquiry(
        &self,
        id: &InquiryId,
        expected: InquiryStatus,
        next: InquiryStatus,
        update: InquiryUpdate,
    ) -> Result<Inquiry, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let inquiry = guard.inquiries.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        if inquiry.status != expected {
            return Err(StoreError::StatusConflict {
                expected,
                actual: inquiry.status,
            });
        }
        inquiry.status = next;
        if let Some(amount) = update.quote_amount {
            inquiry.quote_amount = Some(amount);
        }
        if let Some(currency) = update.currency {
            inquiry.currency = currency;
        }
        if let Some(session) = update.checkout_session_id {
            inquiry.checkout_session_id = session;
        }
        inquiry.updated_at = Utc::now();
        Ok(inquiry.clone())
    }

    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let id = guard.next_id("bkg");
        let now = Utc::now();
        let record = Booking {
            id: BookingId(id.clone()),
            listing_id: booking.listing_id,
            owner_id: booking.owner_id,
            inquiry_id: booking.inquiry_id,
            channel: booking.channel,
            currency: booking.currency,
            total_amount: booking.total_amount,
            platform_fee_percent: booking.platform_fee_percent,
            platform_fee_amount: booking.platform_fee_amount,
            owner_amount: booking.owner_amount,
            status: booking.status,
            checkout_session_id: booking.checkout_session_id,
            payment_intent_id: booking.payment_intent_id,
            created_at: now,
            updated_at: now,
        };
        guard.bookings.insert(id, record.clone());
        Ok(record)
    }

    async fn get_booking_by_id(&self, id: &BookingId) -> Result<Option<Booking>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.bookings.get(&id.0).cloned())
    }

    async fn update_booking_status(
        &self,
        id: &BookingId,
        status: BookingStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let booking = guard.bookings.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        booking.status = status;
        booking.updated_at = Utc::now();
        Ok(())
    }
}
