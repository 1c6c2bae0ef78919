mod common;

use chrono::Utc;

use common::{
    router, seeded_store, signer, site, RecordingMailer, GUEST_EMAIL, OPERATOR_INBOX, OWNER_EMAIL,
};
use villa_flow::intake::{InquiryPipeline, IntakeOutcome, RawInquiryForm, RequestMeta};
use villa_flow::lifecycle::InquiryStatus;
use villa_flow::signing::ActionParams;
use villa_flow::store::InquiryStore;

fn form() -> RawInquiryForm {
    RawInquiryForm {
        name: Some("Jane Doe".to_string()),
        email: Some(GUEST_EMAIL.to_string()),
        phone: Some("+34 600 000 000".to_string()),
        check_in: Some("2026-07-01".to_string()),
        check_out: Some("2026-07-08".to_string()),
        adults: Some(2),
        children: Some(2),
        villa: Some("villa-azure".to_string()),
        lang: Some("en".to_string()),
        message: Some("We are celebrating an anniversary.".to_string()),
        rendered_at: Some(Utc::now().timestamp_millis() - 60_000),
        ..RawInquiryForm::default()
    }
}

async fn pipeline() -> (
    std::sync::Arc<villa_flow::store::MemoryStore>,
    std::sync::Arc<RecordingMailer>,
    InquiryPipeline<villa_flow::store::MemoryStore, RecordingMailer>,
) {
    let (store, _, _) = seeded_store().await;
    let mailer = RecordingMailer::new();
    let pipeline = InquiryPipeline::new(store.clone(), router(mailer.clone()), signer(), site());
    (store, mailer, pipeline)
}

#[tokio::test]
async fn accepted_inquiry_is_stored_pending_and_notifies_both_sides() {
    let (store, mailer, pipeline) = pipeline().await;

    let outcome = pipeline
        .submit(form(), RequestMeta::default(), Utc::now())
        .await
        .expect("submission succeeds");
    let inquiry_id = match outcome {
        IntakeOutcome::Accepted { inquiry_id } => inquiry_id,
        other => panic!("expected acceptance, got {other:?}"),
    };

    let inquiry = store
        .get_inquiry_by_id(&inquiry_id)
        .await
        .expect("store reachable")
        .expect("inquiry persisted");
    assert_eq!(inquiry.status, InquiryStatus::PendingOwner);
    assert_eq!(inquiry.party_size, 4);
    assert_eq!(inquiry.quote_amount, None, "quote is only fixed at approval");
    assert_eq!(inquiry.owner_email.as_deref(), Some(OWNER_EMAIL));

    let sent = mailer.sent();
    assert_eq!(sent.len(), 2, "owner notice and guest receipt");

    let owner_notice = &sent[0];
    assert_eq!(owner_notice.to, OPERATOR_INBOX);
    assert_eq!(owner_notice.bcc.as_deref(), Some(OWNER_EMAIL));
    assert_eq!(owner_notice.reply_to, GUEST_EMAIL);
    assert!(owner_notice.html.contains("Approve"));

    let receipt = &sent[1];
    assert_eq!(receipt.to, GUEST_EMAIL);
    assert_eq!(receipt.reply_to, OWNER_EMAIL);
    assert_eq!(receipt.bcc.as_deref(), Some(OPERATOR_INBOX));
}

#[tokio::test]
async fn internal_inbox_never_appears_in_guest_visible_fields() {
    let (_, mailer, pipeline) = pipeline().await;
    pipeline
        .submit(form(), RequestMeta::default(), Utc::now())
        .await
        .expect("submission succeeds");

    for message in mailer.sent().iter().filter(|m| m.to == GUEST_EMAIL) {
        assert_ne!(message.reply_to, OPERATOR_INBOX);
        assert!(!message.html.contains(OPERATOR_INBOX));
        assert!(!message.text.contains(OPERATOR_INBOX));
        assert!(!message.subject.contains(OPERATOR_INBOX));
    }
}

#[tokio::test]
async fn owner_notice_links_verify_and_carry_the_quote() {
    let (_, mailer, pipeline) = pipeline().await;
    let now = Utc::now();
    pipeline
        .submit(form(), RequestMeta::default(), now)
        .await
        .expect("submission succeeds");

    let notice = &mailer.sent()[0];
    let approve_query = notice
        .text
        .lines()
        .find_map(|line| line.strip_prefix("Approve: "))
        .and_then(|url| url.split_once('?'))
        .map(|(_, q)| q.to_string())
        .expect("approve link present");

    let params = signer()
        .parse_and_verify(&approve_query, now.timestamp_millis())
        .expect("minted link verifies");
    match params {
        ActionParams::Approve {
            price, currency, ..
        } => {
            // 7 high-season nights at 800 plus the 250 cleaning fee.
            assert_eq!(price, 5850.0);
            assert_eq!(currency, "EUR");
        }
        other => panic!("expected approve params, got {other:?}"),
    }
}

#[tokio::test]
async fn honeypot_submission_is_silently_dropped() {
    let (store, mailer, pipeline) = pipeline().await;

    let mut bot = form();
    bot.company = Some("SEO Experts Inc".to_string());
    let outcome = pipeline
        .submit(bot, RequestMeta::default(), Utc::now())
        .await
        .expect("drop is not an error");
    assert_eq!(outcome, IntakeOutcome::SilentlyDropped);

    let mut fast = form();
    fast.rendered_at = Some(Utc::now().timestamp_millis() - 200);
    let outcome = pipeline
        .submit(fast, RequestMeta::default(), Utc::now())
        .await
        .expect("drop is not an error");
    assert_eq!(outcome, IntakeOutcome::SilentlyDropped);

    let mut unstamped = form();
    unstamped.rendered_at = None;
    let outcome = pipeline
        .submit(unstamped, RequestMeta::default(), Utc::now())
        .await
        .expect("drop is not an error");
    assert_eq!(outcome, IntakeOutcome::SilentlyDropped);

    assert!(mailer.sent().is_empty(), "no mail to anyone");
    // No inquiry records were created either.
    let probe = store
        .get_inquiry_by_id(&villa_flow::store::InquiryId("inq-000001".to_string()))
        .await
        .expect("store reachable");
    assert!(probe.is_none());
}

#[tokio::test]
async fn invalid_form_is_rejected_with_field_errors() {
    let (_, mailer, pipeline) = pipeline().await;
    let mut bad = form();
    bad.email = Some("nope".to_string());
    bad.check_out = Some("2026-06-30".to_string());

    let outcome = pipeline
        .submit(bad, RequestMeta::default(), Utc::now())
        .await
        .expect("rejection is not an error");
    match outcome {
        IntakeOutcome::Rejected(errors) => {
            assert!(errors.0.contains_key("email"));
            assert!(errors.0.contains_key("checkOutDate"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn owner_notification_failure_fails_the_submission() {
    let (store, mailer, pipeline) = pipeline().await;
    mailer.set_failing(true);

    let result = pipeline.submit(form(), RequestMeta::default(), Utc::now()).await;
    assert!(result.is_err(), "a lead nobody hears about is a lost booking");

    // The stored record survives for manual follow-up.
    let probe = store
        .get_inquiry_by_id(&villa_flow::store::InquiryId("inq-000003".to_string()))
        .await
        .expect("store reachable");
    assert!(probe.is_some());
}
