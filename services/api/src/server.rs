use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;

use villa_flow::availability::AvailabilityService;
use villa_flow::checkout::PaymentReconciler;
use villa_flow::config::AppConfig;
use villa_flow::intake::InquiryPipeline;
use villa_flow::notify::EmailRouter;
use villa_flow::owner_action::OwnerActionService;
use villa_flow::signing::LinkSigner;
use villa_flow::store::MemoryStore;
use villa_flow::telemetry;

use crate::cli::ServeArgs;
use crate::infra::{seed_demo_data, AppState, LogMailer, StubCheckoutProvider};
use crate::routes::{api_router, ApiContext};
use crate::ApiError;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), ApiError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::new());
    if args.seed_demo {
        seed_demo_data(&store).await?;
    }

    let mailer = Arc::new(LogMailer::default());
    let email_router = Arc::new(EmailRouter::new(mailer, config.routing.clone()));
    let signer = Arc::new(LinkSigner::new(&config.signing));
    let provider = Arc::new(StubCheckoutProvider::new(&config.checkout.webhook_token));

    let context = Arc::new(ApiContext {
        intake: InquiryPipeline::new(
            store.clone(),
            email_router.clone(),
            signer.clone(),
            config.site.clone(),
        ),
        owner_actions: OwnerActionService::new(
            store.clone(),
            email_router.clone(),
            provider.clone(),
            signer,
            config.site.clone(),
        ),
        availability: AvailabilityService::new(store.clone()),
        reconciler: PaymentReconciler::new(store, email_router),
        provider,
        site: config.site.clone(),
    });

    let app = api_router(context)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "inquiry pipeline ready");

    axum::serve(listener, app).await?;
    Ok(())
}
