use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use serde_json::json;
use storefront_engine::{
    events::{EventHandlers, EventHooks},
    FileStoreBackend,
    OrderFlowApi,
    PersistenceFacade,
    SettingsApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    integrations::RazorpayGateway,
    routes,
    sse::{FeedEvent, OrderFeed},
};

/// The production storage stack: SQLite primary with a JSON file fallback behind the retry facade.
pub type Backend = PersistenceFacade<SqliteDatabase, FileStoreBackend>;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let backend = PersistenceFacade::new(db, FileStoreBackend::new(&config.fallback_dir));
    let srv = create_server_instance(config, backend).await?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub async fn create_server_instance(config: ServerConfig, backend: Backend) -> Result<Server, ServerError> {
    let feed = OrderFeed::new();
    let handlers = order_feed_hooks(feed.clone());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let gateway = RazorpayGateway::new(config.razorpay.clone())
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let orders_api =
        OrderFlowApi::new(backend.clone(), gateway, producers).with_payment_window(config.payment_window);
    let settings_api = SettingsApi::new(backend);
    if config.run_expiry_worker {
        start_expiry_worker(orders_api.clone(), config.expiry_interval_secs);
    } else {
        warn!("🕰️ The expiry worker is disabled. Another instance must sweep stale orders.");
    }

    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("spg::access_log"))
            .app_data(web::Data::new(orders_api.clone()))
            .app_data(web::Data::new(settings_api.clone()))
            .app_data(web::Data::new(feed.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(routes::health)
            .service(
                web::scope("/api")
                    .route("/orders", web::post().to(routes::checkout::<Backend, RazorpayGateway>))
                    .route("/orders", web::get().to(routes::list_orders::<Backend, RazorpayGateway>))
                    // the static segments go before {order_id}, or the path matcher swallows them
                    .route("/orders/summary", web::get().to(routes::order_summary::<Backend, RazorpayGateway>))
                    .route("/orders/stream", web::get().to(routes::order_stream::<Backend, RazorpayGateway>))
                    .route("/orders/expire", web::post().to(routes::expire_order::<Backend, RazorpayGateway>))
                    .route("/orders/{order_id}", web::get().to(routes::get_order::<Backend, RazorpayGateway>))
                    .route(
                        "/orders/{order_id}/status",
                        web::post().to(routes::update_status::<Backend, RazorpayGateway>),
                    )
                    .route(
                        "/payments/create",
                        web::post().to(routes::create_payment_intent::<Backend, RazorpayGateway>),
                    )
                    .route("/payments/verify", web::post().to(routes::verify_payment::<Backend, RazorpayGateway>))
                    .route("/payments/webhook", web::post().to(routes::payment_webhook::<Backend, RazorpayGateway>))
                    .route("/settings/stream", web::get().to(routes::settings_stream::<Backend>))
                    .route("/settings/{key}", web::get().to(routes::get_setting::<Backend>))
                    .route("/settings/{key}", web::put().to(routes::put_setting::<Backend>)),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    info!("🚀️ Server started on {host}:{port}");
    Ok(srv)
}

/// Wires the engine's order events into the live SSE feed. The dedup key pairs the order with the status it just
/// reached, so the callback and webhook settling the same capture produce one feed event, not two.
fn order_feed_hooks(feed: OrderFeed) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let created_feed = feed.clone();
    hooks.on_order_created(move |ev| {
        let feed = created_feed.clone();
        Box::pin(async move {
            let key = format!("{}:created", ev.order.order.order_id);
            let store_id = ev.order.order.store_id.clone();
            let event = FeedEvent::scoped("order.created", &json!({ "order": ev.order }), store_id);
            feed.publish(&key, event);
        })
    });
    hooks.on_order_changed(move |ev| {
        let feed = feed.clone();
        Box::pin(async move {
            let key = format!("{}:{}", ev.order.order_id, ev.new_status);
            let event = FeedEvent::scoped(
                "order.updated",
                &json!({ "order": ev.order, "old_status": ev.old_status, "new_status": ev.new_status }),
                ev.order.store_id.clone(),
            );
            feed.publish(&key, event);
        })
    });
    EventHandlers::new(10, hooks)
}
