use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use chrono::{TimeZone, Utc};
use razorpay_tools::RazorpayConfig;
use spg_common::{MinorUnits, Secret};
use storefront_engine::db_types::{FullOrder, LineItem, Order, OrderId, OrderStatus, PaymentMethod};

use crate::config::ServerConfig;

pub const TEST_KEY_SECRET: &str = "test_key_secret_do_not_reuse";
pub const TEST_WEBHOOK_SECRET: &str = "test_webhook_secret_do_not_reuse";

// Test credentials only. DO NOT re-use these keys anywhere.
pub fn test_config() -> ServerConfig {
    let razorpay = RazorpayConfig {
        key_id: "rzp_test_1234567890".to_string(),
        key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
        webhook_secret: Secret::new(TEST_WEBHOOK_SECRET.to_string()),
        base_url: "http://localhost:1".to_string(),
    };
    ServerConfig { razorpay, ..ServerConfig::default() }
}

pub async fn send_request(req: TestRequest, configure: fn(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().app_data(web::Data::new(test_config())).configure(configure);
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    (status, body)
}

pub fn sample_order(status: OrderStatus) -> Order {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
    Order {
        id: 1,
        order_id: OrderId("ord-1000".into()),
        user_id: "user-1".into(),
        store_id: "store-1".into(),
        address_id: None,
        total_price: MinorUnits::from(49_900),
        currency: "INR".into(),
        status,
        payment_method: PaymentMethod::Gateway,
        provider_order_id: Some("order_Prov001".into()),
        payment_id: None,
        refund_id: None,
        refund_pending: false,
        failure_reason: None,
        coupon_used: false,
        via_fallback: false,
        fallback_reason: None,
        created_at: ts,
        updated_at: ts,
        expires_at: Some(ts + chrono::Duration::minutes(10)),
    }
}

pub fn sample_full_order(status: OrderStatus) -> FullOrder {
    let order = sample_order(status);
    let items = vec![LineItem {
        id: 1,
        order_id: order.order_id.clone(),
        product_id: "prod-1".into(),
        store_id: "store-1".into(),
        name: "Steel water bottle".into(),
        image: String::new(),
        quantity: 2,
        unit_price: MinorUnits::from(24_950),
    }];
    FullOrder { order, items, address: None }
}
