use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde_json::json;

use villa_flow::availability::{AvailabilityOutcome, AvailabilityQuery, AvailabilityService};
use villa_flow::config::SiteConfig;
use villa_flow::checkout::{CheckoutError, CheckoutProvider, PaymentReconciler, WebhookOutcome};
use villa_flow::intake::{InquiryPipeline, IntakeOutcome, RawInquiryForm, RequestMeta};
use villa_flow::notify::Mailer;
use villa_flow::owner_action::{ActionOutcome, OwnerActionService};
use villa_flow::store::InquiryStore;

use crate::infra::AppState;
use crate::pages;

/// The payment provider's signature header on webhook deliveries.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// Everything the request handlers need, assembled once at startup.
pub(crate) struct ApiContext<S, M, C> {
    pub(crate) intake: InquiryPipeline<S, M>,
    pub(crate) owner_actions: OwnerActionService<S, M, C>,
    pub(crate) availability: AvailabilityService<S>,
    pub(crate) reconciler: PaymentReconciler<S, M>,
    pub(crate) provider: Arc<C>,
    pub(crate) site: SiteConfig,
}

pub(crate) fn api_router<S, M, C>(context: Arc<ApiContext<S, M, C>>) -> Router
where
    S: InquiryStore + 'static,
    M: Mailer + 'static,
    C: CheckoutProvider + 'static,
{
    Router::new()
        .route("/api/inquire", post(inquire_endpoint::<S, M, C>))
        .route("/api/owner-action", get(owner_action_endpoint::<S, M, C>))
        .route(
            "/api/check-availability",
            get(availability_endpoint::<S, M, C>),
        )
        .route(
            "/api/checkout-webhook",
            post(checkout_webhook_endpoint::<S, M, C>),
        )
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(context)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn wants_html(headers: &HeaderMap) -> bool {
    header_str(headers, "accept")
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

/// POST /api/inquire accepts both JSON and classic urlencoded form posts,
/// and answers in kind: JSON callers get `{ok}`, form posts get a 303 back
/// to the villa site. A silently dropped submission gets the exact success
/// response an accepted one does.
async fn inquire_endpoint<S, M, C>(
    State(context): State<Arc<ApiContext<S, M, C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: InquiryStore + 'static,
    M: Mailer + 'static,
    C: CheckoutProvider + 'static,
{
    let content_type = header_str(&headers, "content-type").unwrap_or_default();
    let is_form = content_type.contains("application/x-www-form-urlencoded");

    let form: RawInquiryForm = if is_form {
        match serde_urlencoded::from_bytes(&body) {
            Ok(form) => form,
            Err(_) => return bad_body_response(is_form),
        }
    } else {
        match serde_json::from_slice(&body) {
            Ok(form) => form,
            Err(_) => return bad_body_response(is_form),
        }
    };

    let meta = RequestMeta {
        user_agent: header_str(&headers, "user-agent").map(str::to_string),
        ip: header_str(&headers, "x-forwarded-for")
            .and_then(|raw| raw.split(',').next())
            .map(|ip| ip.trim().to_string()),
    };
    let as_html = is_form || wants_html(&headers);
    let slug = form.villa.clone().unwrap_or_default();
    let lang = form.lang.clone().unwrap_or_else(|| "en".to_string());

    match context.intake.submit(form, meta, Utc::now()).await {
        Ok(IntakeOutcome::Accepted { .. }) | Ok(IntakeOutcome::SilentlyDropped) => {
            if as_html {
                Redirect::to(&context.site.thank_you_url(&slug, &lang)).into_response()
            } else {
                Json(json!({ "ok": true })).into_response()
            }
        }
        Ok(IntakeOutcome::Rejected(errors)) => {
            if as_html {
                let back = format!(
                    "{}?inquiry=invalid",
                    context.site.contact_url(&slug, &lang)
                );
                Redirect::to(&back).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "ok": false, "errors": errors })),
                )
                    .into_response()
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "inquiry submission failed");
            if as_html {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(pages::error_page()),
                )
                    .into_response()
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "ok": false })),
                )
                    .into_response()
            }
        }
    }
}

fn bad_body_response(as_html: bool) -> Response {
    if as_html {
        (StatusCode::BAD_REQUEST, Html(pages::error_page())).into_response()
    } else {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "malformed request body" })),
        )
            .into_response()
    }
}

/// GET /api/owner-action renders a human-readable page; owners click these
/// links from an email client.
async fn owner_action_endpoint<S, M, C>(
    State(context): State<Arc<ApiContext<S, M, C>>>,
    RawQuery(query): RawQuery,
) -> Response
where
    S: InquiryStore + 'static,
    M: Mailer + 'static,
    C: CheckoutProvider + 'static,
{
    let query = query.unwrap_or_default();
    match context.owner_actions.handle(&query, Utc::now()).await {
        Ok(ActionOutcome::Approved {
            inquiry,
            price,
            currency,
            payment_link_created,
        }) => Html(pages::approval_page(
            &inquiry.guest_name,
            price,
            &currency,
            payment_link_created,
        ))
        .into_response(),
        Ok(ActionOutcome::Declined { inquiry }) => {
            Html(pages::decline_page(&inquiry.guest_name)).into_response()
        }
        Ok(ActionOutcome::AlreadyProcessed { status }) => {
            Html(pages::already_processed_page(status.label())).into_response()
        }
        Ok(ActionOutcome::InvalidLink) => {
            (StatusCode::BAD_REQUEST, Html(pages::invalid_link_page())).into_response()
        }
        Ok(ActionOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, Html(pages::not_found_page())).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "owner action failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::error_page())).into_response()
        }
    }
}

async fn availability_endpoint<S, M, C>(
    State(context): State<Arc<ApiContext<S, M, C>>>,
    Query(query): Query<AvailabilityQuery>,
) -> Response
where
    S: InquiryStore + 'static,
    M: Mailer + 'static,
    C: CheckoutProvider + 'static,
{
    match context.availability.check(query).await {
        Ok(AvailabilityOutcome::Available { nights }) => {
            Json(json!({ "ok": true, "available": true, "nights": nights })).into_response()
        }
        Ok(AvailabilityOutcome::Unavailable { conflicts }) => Json(json!({
            "ok": true,
            "available": false,
            "message": "These dates appear unavailable; we will confirm by email.",
            "conflicts": conflicts,
        }))
        .into_response(),
        // Unknown villa is an answer, not an error: the site falls back to
        // "contact us directly".
        Ok(AvailabilityOutcome::UnknownListing) => {
            Json(json!({ "ok": true, "available": "unknown" })).into_response()
        }
        Ok(AvailabilityOutcome::Invalid(errors)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "errors": errors })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "availability check failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// POST /api/checkout-webhook verifies the provider signature before parsing
/// anything, and acknowledges replays and stale events with 200 so the
/// provider stops retrying them.
async fn checkout_webhook_endpoint<S, M, C>(
    State(context): State<Arc<ApiContext<S, M, C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: InquiryStore + 'static,
    M: Mailer + 'static,
    C: CheckoutProvider + 'static,
{
    let Some(signature) = header_str(&headers, SIGNATURE_HEADER) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing signature" })),
        )
            .into_response();
    };

    let event = match context.provider.verify_event(&body, signature) {
        Ok(Some(event)) => event,
        Ok(None) => return Json(json!({ "received": true })).into_response(),
        Err(CheckoutError::InvalidSignature) => {
            tracing::warn!("webhook signature rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid signature" })),
            )
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "webhook payload rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "malformed payload" })),
            )
                .into_response();
        }
    };

    match context.reconciler.apply(event).await {
        Ok(outcome) => {
            let booked = matches!(outcome, WebhookOutcome::Recorded { .. });
            Json(json!({ "received": true, "booked": booked })).into_response()
        }
        // A 5xx here makes the provider redeliver once the store recovers.
        Err(err) => {
            tracing::error!(error = %err, "webhook reconciliation failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    use villa_flow::config::{RoutingConfig, SigningConfig, SiteConfig};
    use villa_flow::notify::{EmailMessage, EmailRouter, MailerError, SendReceipt};
    use villa_flow::pricing::default_pricing;
    use villa_flow::signing::LinkSigner;
    use villa_flow::lifecycle::InquiryStatus;
    use villa_flow::store::{
        InquiryOrigin, ListingLocation, ListingStatus, MemoryStore, NewInquiry, NewListing,
    };

    use crate::infra::StubCheckoutProvider;

    struct SilentMailer {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl villa_flow::notify::Mailer for SilentMailer {
        async fn send(&self, message: &EmailMessage) -> Result<SendReceipt, MailerError> {
            self.sent
                .lock()
                .expect("mailer mutex poisoned")
                .push(message.clone());
            Ok(SendReceipt {
                id: "msg".to_string(),
            })
        }
    }

    fn site() -> SiteConfig {
        SiteConfig {
            base_url: "https://sites.example".to_string(),
        }
    }

    fn signer() -> Arc<LinkSigner> {
        Arc::new(LinkSigner::new(&SigningConfig {
            secret: "route-test-secret".to_string(),
            link_ttl_hours: 72,
        }))
    }

    async fn test_app() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_listing(NewListing {
                slug: "villa-azure".to_string(),
                name: "Villa Azure".to_string(),
                owner_id: None,
                location: ListingLocation {
                    country: "ES".to_string(),
                    region: None,
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

        let mailer = Arc::new(SilentMailer {
            sent: Mutex::new(Vec::new()),
        });
        let router_cfg = RoutingConfig {
            operator_inbox: "leads@internal.example".to_string(),
            from_email: "bookings@example.com".to_string(),
            from_name: "Love This Place".to_string(),
            owner_fallback_email: "leads@internal.example".to_string(),
            public_contact_email: "concierge@example.com".to_string(),
        };
        let email_router = Arc::new(EmailRouter::new(mailer, router_cfg));
        let provider = Arc::new(StubCheckoutProvider::new("whsec_test"));
        let signer = signer();

        let context = Arc::new(ApiContext {
            intake: InquiryPipeline::new(
                store.clone(),
                email_router.clone(),
                signer.clone(),
                site(),
            ),
            owner_actions: OwnerActionService::new(
                store.clone(),
                email_router.clone(),
                provider.clone(),
                signer,
                site(),
            ),
            availability: AvailabilityService::new(store.clone()),
            reconciler: PaymentReconciler::new(store.clone(), email_router),
            provider,
            site: site(),
        });
        (api_router(context), store)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body collects")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body is json")
    }

    fn inquiry_json() -> String {
        json!({
            "name": "Jane Doe",
            "email": "jane@example.com",
            "checkInDate": "2026-07-01",
            "checkOutDate": "2026-07-08",
            "adults": 2,
            "villa": "villa-azure",
            "renderedAt": 1
        })
        .to_string()
    }

    #[tokio::test]
    async fn inquire_accepts_json() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/api/inquire")
                    .header("content-type", "application/json")
                    .body(Body::from(inquiry_json()))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn honeypot_submission_gets_the_same_success_response() {
        let (app, _) = test_app().await;
        let mut payload: serde_json::Value =
            serde_json::from_str(&inquiry_json()).expect("valid json");
        payload["company"] = json!("Link Building Pros");

        let response = app
            .oneshot(
                Request::post("/api/inquire")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn invalid_inquiry_returns_field_errors() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/api/inquire")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Jane","renderedAt":1}"#))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["ok"], json!(false));
        assert!(body["errors"].get("email").is_some());
    }

    #[tokio::test]
    async fn form_posts_redirect_back_to_the_villa_site() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/api/inquire")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(
                        "name=Jane+Doe&email=jane%40example.com&checkInDate=2026-07-01\
                         &checkOutDate=2026-07-08&adults=2&villa=villa-azure&renderedAt=1",
                    ))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .expect("location header");
        assert_eq!(
            location,
            "https://sites.example/villas/villa-azure/en/thank-you"
        );
    }

    #[tokio::test]
    async fn invalid_form_posts_redirect_with_a_query_flag() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::post("/api/inquire")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("name=Jane+Doe&villa=villa-azure&renderedAt=1"))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .expect("location header");
        assert_eq!(
            location,
            "https://sites.example/villas/villa-azure/en/contact?inquiry=invalid"
        );
    }

    #[tokio::test]
    async fn availability_reports_known_and_unknown_listings() {
        let (app, _) = test_app().await;
        let response = app
            .clone()
            .oneshot(
                Request::get(
                    "/api/check-availability?villa=villa-azure&checkIn=2026-07-01&checkOut=2026-07-08",
                )
                .body(Body::empty())
                .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["available"], json!(true));
        assert_eq!(body["nights"], json!(7));

        let response = app
            .oneshot(
                Request::get(
                    "/api/check-availability?villa=nowhere&checkIn=2026-07-01&checkOut=2026-07-08",
                )
                .body(Body::empty())
                .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["available"], json!("unknown"));
    }

    #[tokio::test]
    async fn owner_action_with_bad_signature_is_rejected_as_html() {
        let (app, _) = test_app().await;
        let response = app
            .oneshot(
                Request::get(
                    "/api/owner-action?inquiryId=inq-000001&action=approve&price=1\
                     &currency=EUR&expires=9999999999999&sig=deadbeef",
                )
                .body(Body::empty())
                .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature_and_applies_good_ones() {
        let (app, store) = test_app().await;

        // Seed an inquiry already awaiting payment on a known session.
        let inquiry = store
            .create_inquiry(NewInquiry {
                listing_id: None,
                guest_name: "Jane Doe".to_string(),
                guest_email: "jane@example.com".to_string(),
                guest_phone: None,
                check_in: chrono::NaiveDate::from_ymd_opt(2026, 7, 1).expect("valid date"),
                check_out: chrono::NaiveDate::from_ymd_opt(2026, 7, 8).expect("valid date"),
                party_size: 2,
                message: None,
                occasion: None,
                origin: InquiryOrigin::VillaSite,
                currency: "EUR".to_string(),
                owner_email: None,
            })
            .await
            .expect("inquiry seeds");
        store
            .transition_inquiry(
                &inquiry.id,
                InquiryStatus::PendingOwner,
                InquiryStatus::Approved,
                villa_flow::store::InquiryUpdate {
                    quote_amount: Some(5850.0),
                    currency: None,
                    checkout_session_id: None,
                },
            )
            .await
            .expect("approves");
        store
            .transition_inquiry(
                &inquiry.id,
                InquiryStatus::Approved,
                InquiryStatus::AwaitingPayment,
                villa_flow::store::InquiryUpdate {
                    checkout_session_id: Some(Some("cs_dev_0".to_string())),
                    ..Default::default()
                },
            )
            .await
            .expect("awaits payment");

        let payload = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_dev_0",
                "metadata": { "inquiryId": inquiry.id.0 },
                "amount_total": 585000,
                "payment_intent": "pi_1"
            }}
        })
        .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/checkout-webhook")
                    .header(SIGNATURE_HEADER, "wrong-token")
                    .body(Body::from(payload.clone()))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::post("/api/checkout-webhook")
                    .header(SIGNATURE_HEADER, "whsec_test")
                    .body(Body::from(payload))
                    .expect("request builds"),
            )
            .await
            .expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["booked"], json!(true));

        let inquiry = store
            .get_inquiry_by_id(&inquiry.id)
            .await
            .expect("store reachable")
            .expect("inquiry exists");
        assert_eq!(inquiry.status, InquiryStatus::Paid);
    }
}
