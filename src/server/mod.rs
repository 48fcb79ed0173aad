pub mod handlers;
pub(crate) mod request_logging;

use std::sync::Arc;

use axum::Router;

use crate::applications::ApplicationStore;
use crate::config::Settings;
use crate::error::Result as AppResult;
use crate::escrow::EscrowStore;
use crate::gigs::GigStore;
use crate::messaging::MessageStore;
use crate::milestones::MilestoneStore;
use crate::payments::{CustomerStore, PaymentStore};
use crate::processor::{HttpProcessorClient, PaymentProcessor};
use crate::reviews::ReviewStore;
use crate::storage::{Database, PgStore, RequestLogStore};
use crate::subscription::SubscriptionStore;
use crate::users::UserStore;
use crate::webhook::WebhookDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub config: Settings,
    pub users: Arc<dyn UserStore>,
    pub gigs: Arc<dyn GigStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub escrows: Arc<dyn EscrowStore>,
    pub milestones: Arc<dyn MilestoneStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub log_store: Arc<dyn RequestLogStore>,
    pub processor: Arc<dyn PaymentProcessor>,
}

impl AppState {
    // 所有领域 trait 都由同一个后端实现；按 trait 拆开持有，便于测试替换
    fn from_store<S>(store: Arc<S>, config: Settings, processor: Arc<dyn PaymentProcessor>) -> Self
    where
        S: UserStore
            + GigStore
            + ApplicationStore
            + MessageStore
            + ReviewStore
            + PaymentStore
            + CustomerStore
            + EscrowStore
            + MilestoneStore
            + SubscriptionStore
            + RequestLogStore
            + 'static,
    {
        AppState {
            config,
            users: store.clone(),
            gigs: store.clone(),
            applications: store.clone(),
            messages: store.clone(),
            reviews: store.clone(),
            payments: store.clone(),
            customers: store.clone(),
            escrows: store.clone(),
            milestones: store.clone(),
            subscriptions: store.clone(),
            log_store: store,
            processor,
        }
    }

    pub fn dispatcher(&self) -> WebhookDispatcher {
        WebhookDispatcher {
            payments: self.payments.clone(),
            customers: self.customers.clone(),
            escrows: self.escrows.clone(),
            milestones: self.milestones.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

pub async fn create_app(config: Settings) -> AppResult<Router> {
    let processor: Arc<dyn PaymentProcessor> = Arc::new(HttpProcessorClient::new(
        &config.processor.api_base_url,
        &config.processor.secret_key(),
    )?);

    let app_state = if let Some(pg_url) = &config.storage.pg_url {
        // Strict Postgres-only mode (no SQLite fallback)
        let pool_size = config.storage.pg_pool_size.unwrap_or(4);
        let store = PgStore::connect(pg_url, &config.storage.pg_schema, pool_size).await?;
        tracing::info!("Using PostgreSQL storage");
        AppState::from_store(Arc::new(store), config, processor)
    } else {
        let db = Database::new(&config.storage.database_path).await?;
        AppState::from_store(Arc::new(db), config, processor)
    };

    let mut app = handlers::routes().with_state(Arc::new(app_state));

    // CORS（开发环境便于前端联调；生产应收敛来源并仅 HTTPS）
    use axum::http::{Method, header};
    use tower_http::cors::{AllowOrigin, CorsLayer};
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true);
    app = app.layer(cors);

    Ok(app)
}
