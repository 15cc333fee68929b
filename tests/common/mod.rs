#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use orderflow::application::Services;
use orderflow::domain::order::{MinorUnits, NewOrder, Order, OrderItem, OrderStatus};
use orderflow::domain::payment::PaymentProvider;
use orderflow::domain::settings::{PaymentSettings, SecretKey};
use orderflow::infrastructure::in_memory::{
    InMemoryOrderStore, InMemoryPaymentSettingsStore, InMemoryPaymentStore,
};
use orderflow::interfaces::http::create_router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const PAYME_KEY: &str = "payme-test-key";
pub const CLICK_SECRET: &str = "click-test-secret";
pub const CLICK_SERVICE_ID: &str = "4242";

pub struct TestApp {
    pub services: Services,
    pub router: Router,
    pub store_id: Uuid,
}

/// In-memory app without gateway secrets, so callbacks are not verified.
pub fn app() -> TestApp {
    build(InMemoryPaymentSettingsStore::new(), false)
}

/// Strict in-memory app with Payme and Click secrets configured.
pub fn strict_app() -> TestApp {
    let settings = InMemoryPaymentSettingsStore::with_defaults([
        PaymentSettings {
            provider: PaymentProvider::Payme,
            merchant_id: "payme-merchant".to_string(),
            secret_key: SecretKey::new(PAYME_KEY),
            enabled: true,
        },
        PaymentSettings {
            provider: PaymentProvider::Click,
            merchant_id: CLICK_SERVICE_ID.to_string(),
            secret_key: SecretKey::new(CLICK_SECRET),
            enabled: true,
        },
    ]);
    build(settings, true)
}

fn build(settings: InMemoryPaymentSettingsStore, strict: bool) -> TestApp {
    let services = Services::new(
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(InMemoryPaymentStore::new()),
        Arc::new(settings),
        strict,
    );
    TestApp {
        router: create_router(services.clone()),
        services,
        store_id: Uuid::new_v4(),
    }
}

impl TestApp {
    /// Seeds an order totalling 5000 minor units.
    pub async fn seed_order(&self, order_number: &str, status: OrderStatus) -> Order {
        let initial = match status {
            OrderStatus::Draft => OrderStatus::Draft,
            _ => OrderStatus::PendingPayment,
        };
        let order = Order::new(NewOrder {
            store_id: self.store_id,
            order_number: order_number.to_string(),
            status: initial,
            items: vec![OrderItem {
                product_name: "Plov".to_string(),
                quantity: 2,
                unit_price: MinorUnits::from(2000),
            }],
            delivery_fee: MinorUnits::from(1000),
            customer: Default::default(),
        })
        .unwrap();
        self.services.orders.insert(order.clone()).await.unwrap();

        if status == initial {
            return order;
        }
        self.force_status(order.id, status).await
    }

    /// Walks the standard graph to reach `status`.
    async fn force_status(&self, order_id: Uuid, status: OrderStatus) -> Order {
        use OrderStatus::*;
        let path: &[OrderStatus] = match status {
            Paid => &[Paid],
            Processing => &[Paid, Processing],
            Ready => &[Paid, Processing, Ready],
            Shipped => &[Paid, Processing, Shipped],
            Delivered => &[Paid, Processing, Ready, Delivered],
            Refunded => &[Paid, Refunded],
            Cancelled => &[Cancelled],
            other => panic!("cannot seed an order in {other}"),
        };
        let mut order = None;
        for next in path {
            order = Some(
                self.services
                    .state_machine
                    .apply_transition(order_id, *next, None)
                    .await
                    .unwrap(),
            );
        }
        order.unwrap()
    }

    pub async fn order(&self, order_id: Uuid) -> Order {
        self.services
            .orders
            .find_by_id(order_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        self.post_json_with_auth(uri, body, None).await
    }

    pub async fn post_json_with_auth(
        &self,
        uri: &str,
        body: &Value,
        authorization: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, form: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn patch_status(
        &self,
        store_id: Uuid,
        order_id: Uuid,
        body: &Value,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/stores/{store_id}/orders/{order_id}/status"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}
