use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use serde_json::json;
use spg_common::MinorUnits;
use storefront_engine::{
    db_types::{CasOutcome, OrderStatus, OrderSummary},
    events::EventProducers,
    OrderFlowApi,
};

use super::{
    helpers::{sample_full_order, sample_order, send_request},
    mocks::{MockBackend, MockGateway},
};
use crate::routes;

fn install_api(cfg: &mut ServiceConfig, db: MockBackend) {
    let api = OrderFlowApi::new(db, MockGateway::new(), EventProducers::default());
    cfg.app_data(web::Data::new(api))
        .route("/orders", web::post().to(routes::checkout::<MockBackend, MockGateway>))
        .route("/orders/summary", web::get().to(routes::order_summary::<MockBackend, MockGateway>))
        .route("/orders/expire", web::post().to(routes::expire_order::<MockBackend, MockGateway>))
        .route("/orders/{order_id}", web::get().to(routes::get_order::<MockBackend, MockGateway>))
        .route("/orders/{order_id}/status", web::post().to(routes::update_status::<MockBackend, MockGateway>));
}

#[actix_web::test]
async fn checkout_rejects_an_empty_cart() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        // the cart is rejected before the backend is touched
        install_api(cfg, MockBackend::new());
    }
    let body = json!({
        "address": { "name": "A", "email": "a@b.c", "street": "1 Main", "city": "Pune",
                     "state": "MH", "zip": "411001", "country": "IN", "phone": "555" },
        "items": [],
        "payment_method": "Gateway",
        "coupon_used": false,
    });
    let req = TestRequest::post().uri("/orders").set_json(&body);
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("empty"), "unexpected body: {body}");
}

#[actix_web::test]
async fn checkout_rejects_a_total_that_disagrees_with_the_cart() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        // validation fails before the backend is touched
        install_api(cfg, MockBackend::new());
    }
    let body = json!({
        "address": { "name": "A", "email": "a@b.c", "street": "1 Main", "city": "Pune",
                     "state": "MH", "zip": "411001", "country": "IN", "phone": "555" },
        "items": [{ "product_id": "p1", "store_id": "s1", "name": "Widget",
                    "quantity": 2, "unit_price": 10000 }],
        "total": 19999,
        "payment_method": "Gateway",
    });
    let req = TestRequest::post().uri("/orders").set_json(&body);
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("does not match"), "unexpected body: {body}");
}

#[actix_web::test]
async fn manual_expiry_answers_ok_when_the_order_expires() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_mark_expired_if_pending()
            .returning(|_| Ok(CasOutcome::Applied(sample_order(OrderStatus::Expired))));
        install_api(cfg, db);
    }
    let req = TestRequest::post().uri("/orders/expire").set_json(json!({ "order_id": "ord-1000" }));
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""ok":true"#), "unexpected body: {body}");

    // a settled order is not expired, and the caller is told so
    fn configure_settled(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_mark_expired_if_pending()
            .returning(|_| Ok(CasOutcome::Unchanged(sample_order(OrderStatus::Placed))));
        install_api(cfg, db);
    }
    let req = TestRequest::post().uri("/orders/expire").set_json(json!({ "order_id": "ord-1000" }));
    let (status, body) = send_request(req, configure_settled).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""ok":false"#), "unexpected body: {body}");
}

#[actix_web::test]
async fn order_lookup_returns_the_full_order() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order().returning(|_| Ok(Some(sample_full_order(OrderStatus::Placed))));
        install_api(cfg, db);
    }
    let req = TestRequest::get().uri("/orders/ord-1000");
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""order_id":"ord-1000""#), "unexpected body: {body}");
    assert!(body.contains("Steel water bottle"), "unexpected body: {body}");
}

#[actix_web::test]
async fn fetching_an_unknown_order_is_a_404() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_fetch_order().returning(|_| Ok(None));
        install_api(cfg, db);
    }
    let req = TestRequest::get().uri("/orders/no-such-order");
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("no-such-order"), "unexpected body: {body}");
}

#[actix_web::test]
async fn illegal_status_progressions_are_rejected() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        // delivered is terminal, so the guarded update must never be attempted
        db.expect_fetch_order().returning(|_| Ok(Some(sample_full_order(OrderStatus::Delivered))));
        db.expect_update_status_if().never();
        install_api(cfg, db);
    }
    let req = TestRequest::post().uri("/orders/ord-1000/status").set_json(json!({ "status": "Shipped" }));
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body.contains("Delivered"), "unexpected body: {body}");
}

#[actix_web::test]
async fn summary_reports_the_ledger_totals() {
    let _ = env_logger::try_init().ok();
    fn configure(cfg: &mut ServiceConfig) {
        let mut db = MockBackend::new();
        db.expect_order_summary().returning(|_| {
            Ok(OrderSummary { total_orders: 3, total_amount: MinorUnits::from(149_700), cancelled: 1 })
        });
        install_api(cfg, db);
    }
    let req = TestRequest::get().uri("/orders/summary?store_id=store-1");
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"total_orders":3,"total_amount":149700,"cancelled":1}"#);
}
