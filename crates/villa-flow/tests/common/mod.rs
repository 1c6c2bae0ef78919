//! Shared in-memory infrastructure for the end-to-end pipeline tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use villa_flow::checkout::{
    CheckoutError, CheckoutProvider, CheckoutSession, CheckoutSessionRequest,
};
use villa_flow::config::{RoutingConfig, SigningConfig, SiteConfig};
use villa_flow::notify::{EmailMessage, EmailRouter, Mailer, MailerError, SendReceipt};
use villa_flow::pricing::default_pricing;
use villa_flow::signing::LinkSigner;
use villa_flow::store::{
    InquiryStore, Listing, ListingLocation, ListingStatus, MemoryStore, NewListing, NewOwner,
    Owner, OwnerTier,
};

pub const OPERATOR_INBOX: &str = "leads@platform.internal";
pub const OWNER_EMAIL: &str = "owner@villa-azure.example";
pub const GUEST_EMAIL: &str = "jane@example.com";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn routing() -> RoutingConfig {
    RoutingConfig {
        operator_inbox: OPERATOR_INBOX.to_string(),
        from_email: "bookings@platform.example".to_string(),
        from_name: "Love This Place".to_string(),
        owner_fallback_email: OPERATOR_INBOX.to_string(),
        public_contact_email: "concierge@platform.example".to_string(),
    }
}

pub fn site() -> SiteConfig {
    SiteConfig {
        base_url: "https://sites.platform.example".to_string(),
    }
}

pub fn signer() -> Arc<LinkSigner> {
    Arc::new(LinkSigner::new(&SigningConfig {
        secret: "integration-test-secret".to_string(),
        link_ttl_hours: 72,
    }))
}

/// Captures every message instead of delivering; can be told to fail.
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
    sequence: AtomicU64,
}

impl RecordingMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailerError::Transport("simulated outage".to_string()));
        }
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(message.clone());
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            id: format!("msg-{id}"),
        })
    }
}

pub fn router(mailer: Arc<RecordingMailer>) -> Arc<EmailRouter<RecordingMailer>> {
    Arc::new(EmailRouter::new(mailer, routing()))
}

/// Mints predictable sessions; can be told to fail.
pub struct StubCheckoutProvider {
    requests: Mutex<Vec<CheckoutSessionRequest>>,
    fail: AtomicBool,
    sequence: AtomicU64,
}

impl StubCheckoutProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        })
    }

    pub fn requests(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().expect("provider mutex poisoned").clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckoutProvider for StubCheckoutProvider {
    async fn create_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CheckoutError::Provider("simulated outage".to_string()));
        }
        self.requests
            .lock()
            .expect("provider mutex poisoned")
            .push(request.clone());
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutSession {
            id: format!("cs_test_{id}"),
            url: format!("https://pay.example/cs_test_{id}"),
        })
    }

    fn verify_event(
        &self,
        _payload: &[u8],
        _signature: &str,
    ) -> Result<Option<villa_flow::checkout::CheckoutEvent>, CheckoutError> {
        Err(CheckoutError::InvalidSignature)
    }
}

/// A store seeded with one owner and one active, priced listing.
pub async fn seeded_store() -> (Arc<MemoryStore>, Owner, Listing) {
    let store = Arc::new(MemoryStore::new());
    let owner = store
        .create_owner(NewOwner {
            name: "Alex Duran".to_string(),
            email: OWNER_EMAIL.to_string(),
            tier: OwnerTier::AssetPartner,
            payout_account: "acct_test_1".to_string(),
            currency: "EUR".to_string(),
            contract_start: date(2025, 1, 1),
            contract_months: 24,
            commission_percent: 15.0,
        })
        .await
        .expect("owner seeds");
    let listing = store
        .create_listing(NewListing {
            slug: "villa-azure".to_string(),
            name: "Villa Azure".to_string(),
            owner_id: Some(owner.id.clone()),
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
        .await
        .expect("listing seeds");
    (store, owner, listing)
}
