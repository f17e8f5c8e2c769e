//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate module.
//! Keep this module neat and tidy 🙏
//!
//! Handlers are generic over the database backend and payment gateway so that endpoint tests can swap in mocks. The
//! server registers them with the concrete production types in [`crate::server`].

use actix_web::{get, web, HttpRequest, HttpResponse};
use log::*;
use serde_json::json;
use storefront_engine::{
    db_types::{CasOutcome, OrderId},
    helpers::{verify_callback_signature, verify_webhook_signature},
    order_objects::{NewCheckout, OrderQueryFilter},
    traits::{ConfirmOutcome, PaymentGateway, StorefrontDatabase},
    OrderFlowApi,
    SettingsApi,
};

use crate::{
    config::ServerConfig,
    data_objects::{
        payment_event_from_envelope,
        ExpireOrderRequest,
        JsonResponse,
        OrderQueryParams,
        OrderResult,
        PaymentCreateRequest,
        PaymentIntentResult,
        PaymentVerification,
        SettingsStreamParams,
        StatusUpdateRequest,
    },
    errors::ServerError,
    sse::{FeedEvent, OrderFeed},
};

#[get("/health")]
pub async fn health() -> HttpResponse {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//--------------------------------------       Checkout        -------------------------------------------------------

pub async fn checkout<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    body: web::Json<NewCheckout>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let checkout = body.into_inner();
    debug!("💻️ Checkout request with {} items", checkout.items.len());
    let full = api.process_checkout(checkout).await?;
    Ok(HttpResponse::Created().json(full))
}

//--------------------------------------       Payments        -------------------------------------------------------

pub async fn create_payment_intent<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    config: web::Data<ServerConfig>,
    body: web::Json<PaymentCreateRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let order_id = OrderId(body.into_inner().order_id);
    let (order, provider_order_id) = api.create_payment_intent(&order_id).await?;
    let result = PaymentIntentResult {
        order_id: order.order_id.0,
        provider_order_id,
        amount: order.total_price.value(),
        currency: order.currency,
        key_id: config.razorpay.key_id.clone(),
    };
    Ok(HttpResponse::Ok().json(result))
}

/// The synchronous callback from the buyer's browser. The signature covers
/// `"{provider_order_id}|{payment_id}"` and is checked before anything touches the database.
pub async fn verify_payment<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    config: web::Data<ServerConfig>,
    body: web::Json<PaymentVerification>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let v = body.into_inner();
    let secret = config.razorpay.key_secret.reveal();
    if !verify_callback_signature(&v.razorpay_order_id, &v.razorpay_payment_id, &v.razorpay_signature, secret) {
        warn!("💻️ Payment verification failed signature check for provider order {}", v.razorpay_order_id);
        return Err(ServerError::InvalidSignature);
    }
    let outcome = api.confirm_payment(&v.razorpay_order_id, &v.razorpay_payment_id).await?;
    let response = match outcome {
        ConfirmOutcome::Placed(order) | ConfirmOutcome::AlreadyPlaced(order) => HttpResponse::Ok().json(json!({
            "ok": true,
            "order": order,
        })),
        ConfirmOutcome::Expired { order, refund_id } => HttpResponse::Ok().json(json!({
            "ok": false,
            "message": "The payment window closed before the payment completed. The payment will be refunded.",
            "order": order,
            "refunded": refund_id.is_some(),
            "refund_id": refund_id,
        })),
        ConfirmOutcome::Unfulfillable { order, refund_id } => HttpResponse::Conflict().json(json!({
            "ok": false,
            "message": format!("Order {} is {} and cannot accept this payment. It will be refunded.",
                               order.order_id, order.status),
            "order": order,
            "refunded": refund_id.is_some(),
            "refund_id": refund_id,
        })),
    };
    Ok(response)
}

/// The asynchronous webhook from the provider. The signature covers the raw request body, so the body is taken as
/// bytes and only parsed after the check passes.
pub async fn payment_webhook<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    config: web::Data<ServerConfig>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let signature = req
        .headers()
        .get("X-Razorpay-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::InvalidSignature)?;
    let secret = config.razorpay.webhook_secret.reveal();
    if !verify_webhook_signature(&body, signature, secret) {
        warn!("💻️ Webhook failed signature check");
        return Err(ServerError::InvalidSignature);
    }
    // the provider retries anything that is not a 2xx; once the signature checks out, everything acknowledges and
    // failures are left to the logs, the webhook replay and the reaper
    match serde_json::from_slice::<razorpay_tools::WebhookEnvelope>(&body) {
        Ok(envelope) => {
            let event = payment_event_from_envelope(&envelope);
            if let Err(e) = api.reconcile_webhook(event).await {
                error!("💻️ Webhook reconciliation failed: {e}");
            }
        },
        Err(e) => error!("💻️ Signed webhook body could not be parsed: {e}"),
    }
    Ok(HttpResponse::Ok().json(JsonResponse::success("ok")))
}

//--------------------------------------        Orders         -------------------------------------------------------

pub async fn get_order<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let order_id = OrderId(path.into_inner());
    match api.fetch_order(&order_id).await? {
        Some(full) => Ok(HttpResponse::Ok().json(full)),
        None => Err(ServerError::NoRecordFound(format!("Order {order_id}"))),
    }
}

pub async fn list_orders<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    params: web::Query<OrderQueryParams>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let params = params.into_inner();
    let query = OrderQueryFilter {
        user_id: params.user_id,
        store_id: params.store_id,
        status: params.status,
        since: None,
        until: None,
        limit: params.limit,
    };
    let orders = api.search_orders(query).await?;
    let total = orders.len();
    Ok(HttpResponse::Ok().json(OrderResult { orders, total }))
}

pub async fn order_summary<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    params: web::Query<OrderQueryParams>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let summary = api.order_summary(params.store_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn update_status<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    path: web::Path<String>,
    body: web::Json<StatusUpdateRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let order_id = OrderId(path.into_inner());
    let order = api.set_status(&order_id, body.status).await?;
    Ok(HttpResponse::Ok().json(order))
}

pub async fn expire_order<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    body: web::Json<ExpireOrderRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let order_id = OrderId(body.into_inner().order_id);
    match api.expire_order(&order_id).await? {
        CasOutcome::Applied(order) => Ok(HttpResponse::Ok().json(json!({ "ok": true, "order": order }))),
        CasOutcome::Unchanged(order) => {
            let message = format!("Order is {} and was not expired", order.status);
            Ok(HttpResponse::Ok().json(json!({ "ok": false, "message": message, "order": order })))
        },
    }
}

//--------------------------------------      Live feed        -------------------------------------------------------

/// Opens an SSE subscription to live order updates. The first event is a snapshot of the order summary and the most
/// recent orders, optionally scoped to one store.
pub async fn order_stream<B, G>(
    api: web::Data<OrderFlowApi<B, G>>,
    feed: web::Data<OrderFeed>,
    params: web::Query<OrderQueryParams>,
) -> Result<HttpResponse, ServerError>
where
    B: StorefrontDatabase + 'static,
    G: PaymentGateway + 'static,
{
    let store_id = params.store_id.clone();
    let summary = api.order_summary(store_id.as_deref()).await?;
    let mut query = OrderQueryFilter { store_id: store_id.clone(), ..Default::default() };
    query.limit = Some(50);
    let orders = api.search_orders(query).await?;
    let snapshot = FeedEvent::new("snapshot", &json!({ "summary": summary, "orders": orders }));
    let stream = feed.subscribe(snapshot, store_id);
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/event-stream"))
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

/// Opens an SSE subscription to a single settings key. The first event is the current value (or `null` if the key
/// has never been written), then one event per write to that key.
pub async fn settings_stream<B>(
    api: web::Data<SettingsApi<B>>,
    feed: web::Data<OrderFeed>,
    params: web::Query<SettingsStreamParams>,
) -> Result<HttpResponse, ServerError>
where B: StorefrontDatabase + 'static {
    let key = params.into_inner().key;
    let value = api.fetch(&key).await.map_err(ServerError::from)?.unwrap_or(serde_json::Value::Null);
    let snapshot = FeedEvent::new("snapshot", &json!({ "key": key, "value": value }));
    let stream = feed.subscribe(snapshot, Some(key));
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", "text/event-stream"))
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

//--------------------------------------       Settings        -------------------------------------------------------

pub async fn get_setting<B>(
    api: web::Data<SettingsApi<B>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError>
where B: StorefrontDatabase + 'static {
    let key = path.into_inner();
    match api.fetch(&key).await.map_err(ServerError::from)? {
        Some(value) => Ok(HttpResponse::Ok().json(value)),
        None => Err(ServerError::NoRecordFound(format!("Setting {key}"))),
    }
}

pub async fn put_setting<B>(
    api: web::Data<SettingsApi<B>>,
    feed: web::Data<OrderFeed>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, ServerError>
where B: StorefrontDatabase + 'static {
    let key = path.into_inner();
    let value = body.into_inner();
    api.upsert(&key, &value).await.map_err(ServerError::from)?;
    // the dedup key includes the value, so only true duplicate writes are collapsed
    let dedup = format!("setting:{key}:{value}");
    feed.publish(&dedup, FeedEvent::scoped("setting.updated", &json!({ "key": key, "value": value }), key.clone()));
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Setting {key} saved"))))
}
