//! HTTP API tests
//!
//! Drives the router with `oneshot` requests against an engine over the
//! in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use domain_posting::{
    FailurePoint, InMemoryPostingStore, SalesInvoiceStatus, ShipmentSource, ShipmentStatus,
};
use interface_api::{config::ApiConfig, create_router};
use test_utils::{InvoiceLineBuilder, PostingScenario, ShipmentLineSpec};

fn router(scenario: &PostingScenario) -> (Router, InMemoryPostingStore) {
    let (engine, store) = scenario.engine();
    (create_router(Arc::new(engine), ApiConfig::default()), store)
}

async fn send(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn invoice_body(action: &str, scenario: &PostingScenario, invoice_id: impl ToString) -> Value {
    json!({
        "type": action,
        "invoiceId": invoice_id.to_string(),
        "userId": scenario.user_id.as_uuid().to_string(),
        "companyId": scenario.company_id.as_uuid().to_string(),
    })
}

mod sales_invoice_routes {
    use super::*;

    #[tokio::test]
    async fn test_post_then_void() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (app, store) = router(&scenario);

        let (status, body) = send(
            app.clone(),
            "/functions/post-sales-invoice",
            invoice_body("post", &scenario, invoice_id.as_uuid()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["outcome"]["journalLines"], json!(2));
        assert_eq!(body["outcome"]["phase"], json!("committed"));

        let (status, body) = send(
            app,
            "/functions/post-sales-invoice",
            invoice_body("void", &scenario, invoice_id),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(
            store.snapshot().await.sales_invoices[&invoice_id].status,
            SalesInvoiceStatus::Voided
        );
    }

    #[tokio::test]
    async fn test_voiding_a_draft_is_a_bad_request() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (app, _store) = router(&scenario);

        let (status, body) = send(
            app,
            "/functions/post-sales-invoice",
            invoice_body("void", &scenario, invoice_id.as_uuid()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["kind"], json!("invalid_state"));
    }

    #[tokio::test]
    async fn test_failed_post_is_a_server_error_and_resets_to_draft() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_status(SalesInvoiceStatus::Pending)
                .line(InvoiceLineBuilder::service(dec!(1), dec!(10))),
        );
        let (app, store) = router(&scenario);
        store.fail_at(FailurePoint::InsertJournalLines).await;

        let (status, body) = send(
            app,
            "/functions/post-sales-invoice",
            invoice_body("post", &scenario, invoice_id.as_uuid()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], json!("transaction"));
        assert_eq!(
            store.snapshot().await.sales_invoices[&invoice_id].status,
            SalesInvoiceStatus::Draft
        );
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_a_server_error() {
        let scenario = PostingScenario::new();
        let (app, _store) = router(&scenario);

        let (status, body) = send(
            app,
            "/functions/post-sales-invoice",
            invoice_body("post", &scenario, uuid::Uuid::new_v4()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], json!("lookup"));
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_bad_requests() {
        let scenario = PostingScenario::new();
        let (app, _store) = router(&scenario);

        let (status, body) = send(
            app.clone(),
            "/functions/post-sales-invoice",
            json!({ "type": "post", "invoiceId": "abc" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], json!("bad_request"));

        let (status, body) = send(
            app.clone(),
            "/functions/post-sales-invoice",
            invoice_body("post", &scenario, ""),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], json!("validation_error"));

        let (status, _) = send(
            app,
            "/functions/post-sales-invoice",
            invoice_body("archive", &scenario, uuid::Uuid::new_v4()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod shipment_routes {
    use super::*;

    fn shipment_body(action: &str, scenario: &PostingScenario, shipment_id: impl ToString) -> Value {
        json!({
            "type": action,
            "shipmentId": shipment_id.to_string(),
            "userId": scenario.user_id.as_uuid().to_string(),
            "companyId": scenario.company_id.as_uuid().to_string(),
        })
    }

    #[tokio::test]
    async fn test_void_shipment() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(2)]);
        scenario.mark_sent(order.line_ids[0], dec!(2));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(2)).for_line(order.line_ids[0]).with_cost(dec!(8))],
        );
        let (app, store) = router(&scenario);

        let (status, body) = send(
            app,
            "/functions/void-shipment",
            shipment_body("void", &scenario, shipment_id.as_uuid()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"]["itemLedgerEntries"], json!(1));
        assert_eq!(store.snapshot().await.shipments[&shipment_id].status, ShipmentStatus::Voided);
    }

    #[tokio::test]
    async fn test_posting_a_shipment_is_rejected() {
        let scenario = PostingScenario::new();
        let (app, _store) = router(&scenario);

        let (status, body) = send(
            app,
            "/functions/void-shipment",
            shipment_body("post", &scenario, uuid::Uuid::new_v4()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], json!("bad_request"));
    }
}

mod health_routes {
    use super::*;

    #[tokio::test]
    async fn test_health_and_readiness() {
        let scenario = PostingScenario::new();
        let (app, _store) = router(&scenario);

        for uri in ["/health", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }
}
