use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use serde_json::json;
use storefront_engine::{
    db_types::{CasOutcome, OrderStatus},
    events::EventProducers,
    helpers::{sign_callback, sign_webhook},
    traits::StoreError,
    OrderFlowApi,
};

use super::{
    helpers::{sample_full_order, sample_order, send_request, TEST_KEY_SECRET, TEST_WEBHOOK_SECRET},
    mocks::{MockBackend, MockGateway},
};
use crate::routes;

fn install_api(cfg: &mut ServiceConfig, db: MockBackend, gateway: MockGateway) {
    let api = OrderFlowApi::new(db, gateway, EventProducers::default());
    cfg.app_data(web::Data::new(api))
        .route("/payments/create", web::post().to(routes::create_payment_intent::<MockBackend, MockGateway>))
        .route("/payments/verify", web::post().to(routes::verify_payment::<MockBackend, MockGateway>))
        .route("/payments/webhook", web::post().to(routes::payment_webhook::<MockBackend, MockGateway>));
}

#[actix_web::test]
async fn payment_intent_hands_back_the_provider_reference() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order().returning(|_| Ok(Some(sample_full_order(OrderStatus::Pending))));
        db.expect_set_provider_order_id().returning(|_, pid| {
            let mut order = sample_order(OrderStatus::Pending);
            order.provider_order_id = Some(pid.to_string());
            Ok(order)
        });
        let mut gateway = MockGateway::new();
        gateway.expect_create_intent().returning(|_, _, _| Ok("order_Prov001".to_string()));
        install_api(cfg, db, gateway);
    }
    let req = TestRequest::post().uri("/payments/create").set_json(json!({ "order_id": "ord-1000" }));
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""provider_order_id":"order_Prov001""#), "unexpected body: {body}");
    assert!(body.contains(r#""key_id":"rzp_test_1234567890""#), "unexpected body: {body}");
    assert!(body.contains(r#""amount":49900"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn verification_rejects_a_forged_signature() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        // a forged signature must never reach the database
        db.expect_fetch_order_by_provider_order_id().never();
        install_api(cfg, db, MockGateway::new());
    }
    let body = json!({
        "razorpay_order_id": "order_Prov001",
        "razorpay_payment_id": "pay_1",
        "razorpay_signature": "deadbeef",
    });
    let req = TestRequest::post().uri("/payments/verify").set_json(&body);
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("Signature verification failed"), "unexpected body: {body}");
}

#[actix_web::test]
async fn a_signed_capture_places_the_order() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id()
            .returning(|_| Ok(Some(sample_order(OrderStatus::Pending))));
        db.expect_mark_placed_if_pending().returning(|_, payment_id, _| {
            let mut order = sample_order(OrderStatus::Placed);
            order.payment_id = Some(payment_id.to_string());
            Ok(CasOutcome::Applied(order))
        });
        install_api(cfg, db, MockGateway::new());
    }
    let signature = sign_callback("order_Prov001", "pay_1", TEST_KEY_SECRET);
    let body = json!({
        "razorpay_order_id": "order_Prov001",
        "razorpay_payment_id": "pay_1",
        "razorpay_signature": signature,
    });
    let req = TestRequest::post().uri("/payments/verify").set_json(&body);
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""ok":true"#), "unexpected body: {body}");
    assert!(body.contains(r#""status":"Placed""#), "unexpected body: {body}");
}

#[actix_web::test]
async fn a_capture_for_a_cancelled_order_is_a_conflict_and_refunds() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id()
            .returning(|_| Ok(Some(sample_order(OrderStatus::Cancelled))));
        db.expect_mark_placed_if_pending()
            .returning(|_, _, _| Ok(CasOutcome::Unchanged(sample_order(OrderStatus::Cancelled))));
        db.expect_record_refund().returning(|_, refund_id| {
            let mut order = sample_order(OrderStatus::Cancelled);
            match refund_id {
                Some(rid) => order.refund_id = Some(rid.to_string()),
                None => order.refund_pending = true,
            }
            Ok(CasOutcome::Applied(order))
        });
        let mut gateway = MockGateway::new();
        gateway.expect_refund().returning(|_| Ok("rfnd_77".to_string()));
        install_api(cfg, db, gateway);
    }
    let signature = sign_callback("order_Prov001", "pay_9", TEST_KEY_SECRET);
    let body = json!({
        "razorpay_order_id": "order_Prov001",
        "razorpay_payment_id": "pay_9",
        "razorpay_signature": signature,
    });
    let req = TestRequest::post().uri("/payments/verify").set_json(&body);
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains(r#""ok":false"#), "unexpected body: {body}");
    assert!(body.contains(r#""refunded":true"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn webhooks_are_rejected_without_a_valid_signature() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id().never();
        install_api(cfg, db, MockGateway::new());
    }
    let payload =
        r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_Prov001"}}}}"#;
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header(("X-Razorpay-Signature", "deadbeef"))
        .set_payload(payload);
    let (status, _) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // no signature header at all
    let req = TestRequest::post().uri("/payments/webhook").set_payload(payload);
    let (status, _) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn a_signed_webhook_capture_is_reconciled() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id()
            .returning(|_| Ok(Some(sample_order(OrderStatus::Pending))));
        db.expect_mark_placed_if_pending()
            .returning(|_, _, _| Ok(CasOutcome::Applied(sample_order(OrderStatus::Placed))));
        install_api(cfg, db, MockGateway::new());
    }
    let payload =
        r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_Prov001"}}}}"#;
    let signature = sign_webhook(payload.as_bytes(), TEST_WEBHOOK_SECRET);
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header(("X-Razorpay-Signature", signature))
        .set_payload(payload);
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""success":true"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn signed_webhooks_are_acknowledged_even_when_reconciliation_fails() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id()
            .returning(|_| Err(StoreError::DatabaseError("the database is down".to_string())));
        install_api(cfg, db, MockGateway::new());
    }
    let payload =
        r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_Prov001"}}}}"#;
    let signature = sign_webhook(payload.as_bytes(), TEST_WEBHOOK_SECRET);
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header(("X-Razorpay-Signature", signature))
        .set_payload(payload);
    let (status, _) = send_request(req, configure).await;
    // a 5xx would make the provider retry a request that will keep failing; the logs carry the failure instead
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn signed_but_unparseable_webhook_bodies_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id().never();
        install_api(cfg, db, MockGateway::new());
    }
    let payload = r#"{"event": "payment.captured", "payload": "#;
    let signature = sign_webhook(payload.as_bytes(), TEST_WEBHOOK_SECRET);
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header(("X-Razorpay-Signature", signature))
        .set_payload(payload);
    let (status, _) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn webhooks_for_unknown_provider_orders_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order_by_provider_order_id().returning(|_| Ok(None));
        db.expect_mark_placed_if_pending().never();
        install_api(cfg, db, MockGateway::new());
    }
    let payload =
        r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_9","order_id":"order_Unknown"}}}}"#;
    let signature = sign_webhook(payload.as_bytes(), TEST_WEBHOOK_SECRET);
    let req = TestRequest::post()
        .uri("/payments/webhook")
        .insert_header(("X-Razorpay-Signature", signature))
        .set_payload(payload);
    let (status, _) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
}
