mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use orderflow::domain::order::OrderStatus;
use orderflow::domain::payment::{PaymentProvider, PaymentStatus};
use serde_json::{Value, json};

const CALLBACK: &str = "/payments/payme/callback";

fn rpc(id: i64, method: &str, params: Value) -> Value {
    json!({"id": id, "method": method, "params": params})
}

fn basic_auth(key: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("Paycom:{key}")))
}

#[tokio::test]
async fn test_check_perform_for_unknown_order() {
    let app = common::app();
    let (status, body) = app
        .post_json(
            CALLBACK,
            &rpc(
                1,
                "CheckPerformTransaction",
                json!({"amount": 5000, "account": {"order_id": "NOPE"}}),
            ),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["error"]["code"], -31050);
}

#[tokio::test]
async fn test_check_perform_allows_known_order() {
    let app = common::app();
    app.seed_order("P-1", OrderStatus::PendingPayment).await;

    let (status, body) = app
        .post_json(
            CALLBACK,
            &rpc(
                7,
                "CheckPerformTransaction",
                json!({"amount": 5000, "account": {"order_id": "P-1"}}),
            ),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"]["allow"], true);
}

#[tokio::test]
async fn test_create_then_perform_marks_order_paid() {
    let app = common::app();
    let order = app.seed_order("P-2", OrderStatus::PendingPayment).await;

    let (_, created) = app
        .post_json(
            CALLBACK,
            &rpc(
                1,
                "CreateTransaction",
                json!({
                    "id": "tx-2",
                    "time": 1700000000000i64,
                    "amount": 5000,
                    "account": {"order_id": "P-2"}
                }),
            ),
        )
        .await;
    assert_eq!(created["result"]["state"], 1);
    let transaction = created["result"]["transaction"].clone();

    let (status, performed) = app
        .post_json(CALLBACK, &rpc(2, "PerformTransaction", json!({"id": "tx-2"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(performed["result"]["state"], 2);
    assert_eq!(performed["result"]["transaction"], transaction);

    let payments = app.services.ledger.payments_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].provider, PaymentProvider::Payme);
    assert_eq!(payments[0].status, PaymentStatus::Paid);
    assert_eq!(payments[0].provider_transaction_id.as_deref(), Some("tx-2"));
    assert_eq!(payments[0].amount, order.total);

    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Paid);
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].comment.as_deref(), Some("Payme payment confirmed"));
}

#[tokio::test]
async fn test_duplicate_perform_is_idempotent() {
    let app = common::app();
    let order = app.seed_order("P-3", OrderStatus::PendingPayment).await;

    app.post_json(
        CALLBACK,
        &rpc(1, "CreateTransaction", json!({"id": "tx-3", "account": {"order_id": "P-3"}})),
    )
    .await;
    let (_, first) = app
        .post_json(CALLBACK, &rpc(2, "PerformTransaction", json!({"id": "tx-3"})))
        .await;
    let (_, second) = app
        .post_json(CALLBACK, &rpc(3, "PerformTransaction", json!({"id": "tx-3"})))
        .await;

    assert_eq!(first["result"]["state"], 2);
    assert_eq!(second["result"]["state"], 2);
    assert_eq!(first["result"]["perform_time"], second["result"]["perform_time"]);

    let payments = app.services.ledger.payments_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    let stored = app.order(order.id).await;
    assert_eq!(stored.status, OrderStatus::Paid);
    assert_eq!(stored.history.len(), 1);
}

#[tokio::test]
async fn test_second_transaction_for_busy_order_is_rejected() {
    let app = common::app();
    app.seed_order("P-4", OrderStatus::PendingPayment).await;

    app.post_json(
        CALLBACK,
        &rpc(1, "CreateTransaction", json!({"id": "tx-a", "account": {"order_id": "P-4"}})),
    )
    .await;
    let (_, body) = app
        .post_json(
            CALLBACK,
            &rpc(2, "CreateTransaction", json!({"id": "tx-b", "account": {"order_id": "P-4"}})),
        )
        .await;

    assert_eq!(body["error"]["code"], -31099);
}

#[tokio::test]
async fn test_cancel_leaves_order_status() {
    let app = common::app();
    let order = app.seed_order("P-5", OrderStatus::PendingPayment).await;

    app.post_json(
        CALLBACK,
        &rpc(1, "CreateTransaction", json!({"id": "tx-5", "account": {"order_id": "P-5"}})),
    )
    .await;
    let (_, body) = app
        .post_json(CALLBACK, &rpc(2, "CancelTransaction", json!({"id": "tx-5", "reason": 3})))
        .await;
    assert_eq!(body["result"]["state"], -1);

    let (_, checked) = app
        .post_json(CALLBACK, &rpc(3, "CheckTransaction", json!({"id": "tx-5"})))
        .await;
    assert_eq!(checked["result"]["state"], -1);

    let (_, perform) = app
        .post_json(CALLBACK, &rpc(4, "PerformTransaction", json!({"id": "tx-5"})))
        .await;
    assert_eq!(perform["error"]["code"], -31008);

    assert_eq!(app.order(order.id).await.status, OrderStatus::PendingPayment);
}

#[tokio::test]
async fn test_unknown_transaction() {
    let app = common::app();
    let (_, body) = app
        .post_json(CALLBACK, &rpc(1, "CheckTransaction", json!({"id": "missing"})))
        .await;
    assert_eq!(body["error"]["code"], -31003);
}

#[tokio::test]
async fn test_unknown_method() {
    let app = common::app();
    app.seed_order("P-6", OrderStatus::PendingPayment).await;

    let (status, body) = app
        .post_json(CALLBACK, &rpc(9, "GetStatement", json!({"from": 0, "to": 1})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32601);

    let (_, body) = app
        .post_json(CALLBACK, &rpc(10, "Teleport", json!({"account": {"order_id": "P-6"}})))
        .await;
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_unparseable_body_still_answers_ok() {
    let app = common::app();
    let request = Request::builder()
        .method("POST")
        .uri(CALLBACK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32700);

    let (status, body) = app.post_json(CALLBACK, &json!({"params": {}})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn test_unknown_provider_is_not_found() {
    let app = common::app();
    let (status, _) = app.post_json("/payments/paypal/callback", &json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_strict_mode_checks_basic_auth() {
    let app = common::strict_app();
    let order = app.seed_order("P-7", OrderStatus::PendingPayment).await;
    let check = rpc(1, "CheckPerformTransaction", json!({"account": {"order_id": "P-7"}}));

    let (_, body) = app.post_json(CALLBACK, &check).await;
    assert_eq!(body["error"]["code"], -32504);

    let (_, body) = app
        .post_json_with_auth(CALLBACK, &check, Some(&basic_auth("wrong")))
        .await;
    assert_eq!(body["error"]["code"], -32504);

    let (_, body) = app
        .post_json_with_auth(CALLBACK, &check, Some(&basic_auth(common::PAYME_KEY)))
        .await;
    assert_eq!(body["result"]["allow"], true);

    // Rejected calls are still recorded.
    let payments = app.services.ledger.payments_for_order(order.id).await.unwrap();
    let attempts = app.services.ledger.attempts(payments[0].id).await.unwrap();
    assert_eq!(attempts.len(), 3);
}

#[tokio::test]
async fn test_attempts_are_redacted() {
    let app = common::app();
    let order = app.seed_order("P-8", OrderStatus::PendingPayment).await;

    app.post_json(
        CALLBACK,
        &rpc(
            1,
            "CheckPerformTransaction",
            json!({
                "amount": 5000,
                "account": {"order_id": "P-8", "phone": "998901234567"},
                "card": {"number": "8600"}
            }),
        ),
    )
    .await;

    let payments = app.services.ledger.payments_for_order(order.id).await.unwrap();
    let attempts = app.services.ledger.attempts(payments[0].id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(
        attempts[0].payload,
        json!({
            "method": "CheckPerformTransaction",
            "id": 1,
            "params": {"amount": 5000, "account": {"order_id": "P-8"}}
        })
    );
}

#[tokio::test]
async fn test_malformed_call_for_known_order_is_recorded() {
    let app = common::app();
    let order = app.seed_order("P-9", OrderStatus::PendingPayment).await;

    let (status, body) = app
        .post_json(CALLBACK, &json!({"id": 1, "params": {"account": {"order_id": "P-9"}}}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["error"]["code"], -32600);

    let payments = app.services.ledger.payments_for_order(order.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    let attempts = app.services.ledger.attempts(payments[0].id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(
        attempts[0].payload,
        json!({"id": 1, "params": {"account": {"order_id": "P-9"}}})
    );
    assert_eq!(app.order(order.id).await.status, OrderStatus::PendingPayment);
}

#[tokio::test]
async fn test_malformed_call_by_transaction_id_is_recorded() {
    let app = common::app();
    let order = app.seed_order("P-10", OrderStatus::PendingPayment).await;
    app.post_json(
        CALLBACK,
        &rpc(1, "CreateTransaction", json!({"id": "tx-10", "account": {"order_id": "P-10"}})),
    )
    .await;

    // `method` must be a string.
    let (_, body) = app
        .post_json(CALLBACK, &json!({"id": 2, "method": 5, "params": {"id": "tx-10"}}))
        .await;
    assert_eq!(body["error"]["code"], -32600);

    let payments = app.services.ledger.payments_for_order(order.id).await.unwrap();
    let attempts = app.services.ledger.attempts(payments[0].id).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(payments[0].status, PaymentStatus::Processing);
}
