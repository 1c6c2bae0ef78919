//! End-to-end walkthrough of the pipeline against in-memory infrastructure:
//! inquiry in, owner decision via the actual signed link, payment webhook,
//! commission split out.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use clap::Args;

use villa_flow::checkout::{
    CheckoutEvent, CheckoutEventKind, CheckoutMetadata, PaymentReconciler, WebhookOutcome,
};
use villa_flow::config::{RoutingConfig, SigningConfig, SiteConfig};
use villa_flow::intake::{InquiryPipeline, IntakeOutcome, RawInquiryForm, RequestMeta};
use villa_flow::notify::{EmailMessage, EmailRouter, Mailer, MailerError, SendReceipt};
use villa_flow::owner_action::{ActionOutcome, OwnerActionService};
use villa_flow::signing::LinkSigner;
use villa_flow::store::{InquiryStore, MemoryStore};

use crate::infra::{seed_demo_data, StubCheckoutProvider};
use crate::ApiError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Check-in date (YYYY-MM-DD). Defaults to 30 days from today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) check_in: Option<NaiveDate>,
    /// Check-out date (YYYY-MM-DD). Defaults to check-in + 7 nights.
    #[arg(long, value_parser = parse_date)]
    pub(crate) check_out: Option<NaiveDate>,
    /// Have the owner decline instead of approve.
    #[arg(long)]
    pub(crate) decline: bool,
    /// Let the checkout session expire instead of completing payment.
    #[arg(long)]
    pub(crate) expire: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// Records every message so the demo can fish the signed links back out,
/// exactly as an owner reading the email would.
#[derive(Default)]
struct CapturingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl CapturingMailer {
    fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailerError> {
        let mut guard = self.sent.lock().expect("mailer mutex poisoned");
        guard.push(message.clone());
        Ok(SendReceipt {
            id: format!("demo-{}", guard.len()),
        })
    }
}

fn demo_routing() -> RoutingConfig {
    RoutingConfig {
        operator_inbox: "leads@platform.internal".to_string(),
        from_email: "bookings@lovethisplace.co".to_string(),
        from_name: "Love This Place".to_string(),
        owner_fallback_email: "leads@platform.internal".to_string(),
        public_contact_email: "concierge@lovethisplace.co".to_string(),
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), ApiError> {
    let check_in = args
        .check_in
        .unwrap_or_else(|| Local::now().date_naive() + chrono::Duration::days(30));
    let check_out = args
        .check_out
        .unwrap_or_else(|| check_in + chrono::Duration::days(7));

    let store = Arc::new(MemoryStore::new());
    let slug = seed_demo_data(&store).await?;

    let mailer = Arc::new(CapturingMailer::default());
    let email_router = Arc::new(EmailRouter::new(mailer.clone(), demo_routing()));
    let signer = Arc::new(LinkSigner::new(&SigningConfig {
        secret: "demo-secret".to_string(),
        link_ttl_hours: 72,
    }));
    let site = SiteConfig {
        base_url: "https://lovethisplace-sites.vercel.app".to_string(),
    };
    let provider = Arc::new(StubCheckoutProvider::new("whsec_demo"));

    let intake = InquiryPipeline::new(
        store.clone(),
        email_router.clone(),
        signer.clone(),
        site.clone(),
    );
    let owner_actions = OwnerActionService::new(
        store.clone(),
        email_router.clone(),
        provider,
        signer,
        site,
    );
    let reconciler = PaymentReconciler::new(store.clone(), email_router);

    println!("Inquiry-to-booking demo ({slug}, {check_in} to {check_out})");

    // 1. A guest submits the inquiry form.
    let form = RawInquiryForm {
        name: Some("Jane Doe".to_string()),
        email: Some("jane@example.com".to_string()),
        phone: Some("+34 600 000 000".to_string()),
        check_in: Some(check_in.to_string()),
        check_out: Some(check_out.to_string()),
        adults: Some(2),
        children: Some(2),
        villa: Some(slug),
        lang: Some("en".to_string()),
        message: Some("We are celebrating an anniversary.".to_string()),
        // Stamped far enough back to clear the dwell-time gate.
        rendered_at: Some(Utc::now().timestamp_millis() - 60_000),
        ..RawInquiryForm::default()
    };
    let now = Utc::now();
    let outcome = intake.submit(form, RequestMeta::default(), now).await?;
    let inquiry_id = match outcome {
        IntakeOutcome::Accepted { inquiry_id } => inquiry_id,
        other => {
            println!("  submission not accepted: {other:?}");
            return Ok(());
        }
    };
    println!("  guest inquiry stored as {inquiry_id} (pending owner)");

    // 2. The owner clicks the signed link from the notification email.
    let notice = mailer.sent().first().cloned().expect("owner notice was sent");
    let prefix = if args.decline { "Decline: " } else { "Approve: " };
    let link = notice
        .text
        .lines()
        .find_map(|line| line.strip_prefix(prefix).map(str::to_string))
        .expect("owner notice carries signed links");
    let query = link.split_once('?').map(|(_, q)| q.to_string()).unwrap_or_default();

    let action = owner_actions.handle(&query, Utc::now()).await?;
    match &action {
        ActionOutcome::Approved {
            price,
            currency,
            payment_link_created,
            ..
        } => println!(
            "  owner approved at {price} {currency} (payment link created: {payment_link_created})"
        ),
        ActionOutcome::Declined { .. } => {
            println!("  owner declined; guest informed. Demo ends here.");
            print_mail_log(&mailer);
            return Ok(());
        }
        other => println!("  unexpected action outcome: {other:?}"),
    }

    // 3. The payment provider reports on the session.
    let inquiry = store
        .get_inquiry_by_id(&inquiry_id)
        .await?
        .expect("inquiry exists");
    let session_id = inquiry
        .checkout_session_id
        .clone()
        .expect("session id stored");
    let kind = if args.expire {
        CheckoutEventKind::Expired
    } else {
        CheckoutEventKind::Completed
    };
    let event = CheckoutEvent {
        kind,
        session_id,
        metadata: CheckoutMetadata::for_inquiry(&inquiry_id),
        amount_total_minor: inquiry
            .quote_amount
            .map(villa_flow::checkout::amount_to_minor),
        payment_intent_id: Some("pi_demo_1".to_string()),
    };
    let webhook = reconciler.apply(event).await?;
    match webhook {
        WebhookOutcome::Recorded { booking_id } => {
            let booking = store
                .get_booking_by_id(&villa_flow::store::BookingId(booking_id))
                .await?
                .expect("booking exists");
            println!(
                "  payment received: booking {} for {} {} (fee {}, owner payout {})",
                booking.id,
                booking.total_amount,
                booking.currency,
                booking.platform_fee_amount,
                booking.owner_amount
            );
        }
        WebhookOutcome::RolledBack => {
            println!("  checkout session expired; inquiry rolled back to approved");
        }
        WebhookOutcome::Ignored => println!("  webhook event had no effect"),
    }

    let final_state = store
        .get_inquiry_by_id(&inquiry_id)
        .await?
        .expect("inquiry exists");
    println!("  final inquiry status: {}", final_state.status.label());

    print_mail_log(&mailer);
    Ok(())
}

fn print_mail_log(mailer: &CapturingMailer) {
    println!("\nOutbound mail ({} messages):", mailer.sent().len());
    for message in mailer.sent() {
        println!(
            "  to={} bcc={} reply_to={} | {}",
            message.to,
            message.bcc.as_deref().unwrap_or("-"),
            message.reply_to,
            message.subject
        );
    }
}
