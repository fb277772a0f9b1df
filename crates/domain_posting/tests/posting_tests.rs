//! Posting engine tests
//!
//! End-to-end runs of posting and voiding against the in-memory store. Each
//! scenario is built with the test_utils fixtures, run through the engine and
//! checked against the store's state afterwards.

use std::sync::Arc;

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{CompanyId, ShipmentId, UserId};
use domain_posting::{
    DocumentType, FailurePoint, JobOperationStatus, JobStatus, JournalLine, LineType, MethodType,
    PostingEngine, PostingError, PostingEventKind, PostingRequest, RunPhase, SalesInvoiceStatus,
    SalesOrderStatus, ShipmentSource, ShipmentSourceKind, ShipmentStatus, StoreState,
    TrackedEntityStatus, WarehouseTransferStatus,
};
use test_utils::{
    assert_account_total, assert_accounts_net_to_zero, assert_balanced_by_reference,
    assert_item_quantities_net_to_zero, assert_no_ledger_writes, assert_paired, invoice_lines_strategy,
    AccountFixtures, FailingHook, InvoiceLineBuilder, PostingScenario, RecordingHook, ShipmentLineSpec,
};

fn journal_lines(state: &StoreState, document_type: DocumentType, document_id: uuid::Uuid) -> Vec<JournalLine> {
    state
        .journal_lines_for(document_type, document_id)
        .into_iter()
        .cloned()
        .collect()
}

fn generated_shipment_id(state: &StoreState) -> Option<ShipmentId> {
    state
        .shipments
        .values()
        .find(|shipment| shipment.source_document == ShipmentSourceKind::SalesInvoice)
        .map(|shipment| shipment.id)
}

// ============================================================================
// Post Sales Invoice
// ============================================================================

mod post_sales_invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_unlinked_part_line_ships_on_invoice() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_number("INV-1001")
                .line(InvoiceLineBuilder::item(&item, dec!(3), dec!(25))),
        );
        let (engine, store) = scenario.engine();

        let outcome = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        assert_eq!(outcome.phase, RunPhase::Committed);
        assert!(outcome.journal_id.is_some());
        assert_eq!(outcome.journal_lines, 4);
        assert_eq!(outcome.item_ledger_entries, 1);

        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        assert_paired(&lines);
        assert_balanced_by_reference(&lines);
        assert_account_total(&lines, AccountFixtures::RECEIVABLES, dec!(75));
        assert_account_total(&lines, AccountFixtures::SALES, dec!(-75));
        assert_account_total(&lines, AccountFixtures::INVENTORY, dec!(75));
        assert_account_total(&lines, AccountFixtures::COST_OF_GOODS_SOLD, dec!(-75));

        let shipment_id = generated_shipment_id(&state).expect("shipment generated from the invoice");
        let shipment = &state.shipments[&shipment_id];
        assert_eq!(shipment.status, ShipmentStatus::Posted);
        assert_eq!(shipment.shipment_number, "INV-1001");
        assert_eq!(shipment.source_document_id, Some(*invoice_id.as_uuid()));
        assert!(shipment.invoiced);

        let entries = state.item_ledger_entries_for(DocumentType::SalesShipment, *shipment_id.as_uuid());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].quantity, dec!(-3));
        assert_eq!(entries[0].item_id, item.id);

        let invoice = &state.sales_invoices[&invoice_id];
        assert_eq!(invoice.status, SalesInvoiceStatus::Submitted);
        assert_eq!(invoice.updated_by, Some(scenario.user_id));
        assert_eq!(state.journals.len(), 1);
        assert_eq!(state.journals[0].description, "Sales Invoice INV-1001");
    }

    #[tokio::test]
    async fn test_linked_line_posts_revenue_and_standard_cost() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(5)]);
        scenario.mark_sent(order.line_ids[0], dec!(5));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(
                InvoiceLineBuilder::item(&item, dec!(5), dec!(10)).linked_to(order.sales_order_id, order.line_ids[0]),
            ),
        );
        let (engine, store) = scenario.engine();

        let outcome = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();
        assert_eq!(outcome.item_ledger_entries, 0);

        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        assert_eq!(lines.len(), 4);
        assert_balanced_by_reference(&lines);
        assert_account_total(&lines, AccountFixtures::RECEIVABLES, dec!(50));
        assert_account_total(&lines, AccountFixtures::SALES, dec!(-50));
        assert_account_total(&lines, AccountFixtures::COST_OF_GOODS_SOLD, dec!(20));
        assert_account_total(&lines, AccountFixtures::INVENTORY, dec!(-20));

        assert!(generated_shipment_id(&state).is_none());
        assert!(state.item_ledger_entries.is_empty());

        let order_line = &state.sales_order_lines[&order.line_ids[0]];
        assert_eq!(order_line.quantity_invoiced, dec!(5));
        assert!(order_line.invoiced_complete);
        assert_eq!(state.sales_orders[&order.sales_order_id].status, SalesOrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_partial_invoice_leaves_order_to_invoice() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(2));
        let order = scenario.sales_order(&[dec!(10)]);
        scenario.mark_sent(order.line_ids[0], dec!(10));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(
                InvoiceLineBuilder::item(&item, dec!(4), dec!(10)).linked_to(order.sales_order_id, order.line_ids[0]),
            ),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        let order_line = &state.sales_order_lines[&order.line_ids[0]];
        assert_eq!(order_line.quantity_invoiced, dec!(4));
        assert!(!order_line.invoiced_complete);
        assert_eq!(state.sales_orders[&order.sales_order_id].status, SalesOrderStatus::ToInvoice);
    }

    #[tokio::test]
    async fn test_posting_marks_order_shipments_invoiced() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(2)]);
        scenario.mark_sent(order.line_ids[0], dec!(2));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(2)).for_line(order.line_ids[0])],
        );
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(
                InvoiceLineBuilder::item(&item, dec!(2), dec!(30)).linked_to(order.sales_order_id, order.line_ids[0]),
            ),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        assert!(state.shipments[&shipment_id].invoiced);
    }

    #[tokio::test]
    async fn test_make_line_is_not_shipped_on_invoice() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(7));
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .line(InvoiceLineBuilder::item(&item, dec!(2), dec!(20)).with_method(MethodType::Make)),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        assert!(state.shipments.is_empty());
        assert!(state.item_ledger_entries.is_empty());
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        assert_account_total(&lines, AccountFixtures::RECEIVABLES, dec!(40));
        assert_account_total(&lines, AccountFixtures::COST_OF_GOODS_SOLD, dec!(14));
    }

    #[tokio::test]
    async fn test_non_inventory_item_ships_without_item_ledger() {
        let mut scenario = PostingScenario::new();
        let item = scenario.non_inventory_item();
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(InvoiceLineBuilder::item(&item, dec!(1), dec!(90))),
        );
        let (engine, store) = scenario.engine();

        let outcome = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        assert_eq!(outcome.item_ledger_entries, 0);
        let state = store.snapshot().await;
        let shipment_id = generated_shipment_id(&state).expect("shipment generated from the invoice");
        assert_eq!(state.shipment_lines.iter().filter(|line| line.shipment_id == shipment_id).count(), 1);
        assert!(state.item_ledger_entries.is_empty());
    }

    #[tokio::test]
    async fn test_service_and_comment_lines() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .line(InvoiceLineBuilder::service(dec!(2), dec!(60)))
                .line(InvoiceLineBuilder::comment()),
        );
        let (engine, store) = scenario.engine();

        let outcome = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        assert_eq!(outcome.journal_lines, 2);
        assert_eq!(outcome.item_ledger_entries, 0);
        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        assert_account_total(&lines, AccountFixtures::RECEIVABLES, dec!(120));
        assert_account_total(&lines, AccountFixtures::SALES, dec!(-120));
        assert!(state.shipments.is_empty());
    }

    #[tokio::test]
    async fn test_comment_only_invoice_writes_no_journal() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::comment()));
        let (engine, store) = scenario.engine();

        let outcome = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        assert!(outcome.journal_id.is_none());
        let state = store.snapshot().await;
        assert_no_ledger_writes(&state);
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Submitted);
    }

    #[tokio::test]
    async fn test_invoice_shipping_is_allocated_pro_rata() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_shipping_cost(dec!(60))
                .line(InvoiceLineBuilder::service(dec!(1), dec!(100)))
                .line(InvoiceLineBuilder::service(dec!(1), dec!(200)))
                .line(InvoiceLineBuilder::service(dec!(1), dec!(300))),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        let mut receivables: Vec<Decimal> = lines
            .iter()
            .filter(|line| line.account_number == AccountFixtures::RECEIVABLES)
            .map(|line| line.amount)
            .collect();
        receivables.sort();
        assert_eq!(receivables, vec![dec!(110), dec!(220), dec!(330)]);
    }

    #[tokio::test]
    async fn test_exchange_rate_and_tax_apply() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_exchange_rate(dec!(2))
                .line(InvoiceLineBuilder::service(dec!(1), dec!(50)).with_tax(dec!(0.1))),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        assert_account_total(&lines, AccountFixtures::RECEIVABLES, dec!(110));
    }

    #[tokio::test]
    async fn test_pending_invoice_can_be_posted() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_status(SalesInvoiceStatus::Pending)
                .line(InvoiceLineBuilder::service(dec!(1), dec!(10))),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Submitted);
    }

    #[tokio::test]
    async fn test_missing_posting_date_defaults_to_today() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .without_posting_date()
                .line(InvoiceLineBuilder::service(dec!(1), dec!(10))),
        );
        let (engine, store) = scenario.engine();

        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        let today = chrono::Utc::now().date_naive();
        assert!(state.journals[0].posting_date >= today - chrono::Duration::days(1));
        assert!(state.sales_invoices[&invoice_id].posting_date.is_some());
    }
}

// ============================================================================
// Post Sales Invoice: Rejections and Failures
// ============================================================================

mod post_failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_posted_invoice_is_rejected() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_status(SalesInvoiceStatus::Submitted)
                .line(InvoiceLineBuilder::service(dec!(1), dec!(10))),
        );
        let (engine, store) = scenario.engine();

        let error = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::InvalidState(_)));
        assert!(error.is_rejection());
        let state = store.snapshot().await;
        assert_no_ledger_writes(&state);
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Submitted);
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_a_lookup_error() {
        let scenario = PostingScenario::new();
        let (engine, _store) = scenario.engine();

        let error = engine
            .post_sales_invoice(PostingRequest::new(
                core_kernel::SalesInvoiceId::new(),
                scenario.user_id,
                scenario.company_id,
            ))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::Lookup { .. }));
        assert_eq!(error.kind(), "lookup");
    }

    #[tokio::test]
    async fn test_invoice_of_another_company_is_not_found() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (engine, store) = scenario.engine();

        let error = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, CompanyId::new()))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::Lookup { .. }));
        let state = store.snapshot().await;
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_missing_item_cost_resets_invoice_to_draft() {
        let mut scenario = PostingScenario::new();
        let item = scenario.uncosted_item();
        let order = scenario.sales_order(&[dec!(1)]);
        scenario.mark_sent(order.line_ids[0], dec!(1));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().with_status(SalesInvoiceStatus::Pending).line(
                InvoiceLineBuilder::item(&item, dec!(1), dec!(10)).linked_to(order.sales_order_id, order.line_ids[0]),
            ),
        );
        let (engine, store) = scenario.engine();

        let error = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        match error {
            PostingError::Lookup { entity, .. } => assert_eq!(entity, "item cost"),
            other => panic!("expected a lookup error, got {other:?}"),
        }
        let state = store.snapshot().await;
        assert_no_ledger_writes(&state);
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_failed_apply_writes_nothing() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(1)]);
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_status(SalesInvoiceStatus::Pending)
                .line(InvoiceLineBuilder::item(&item, dec!(2), dec!(25)))
                .line(
                    InvoiceLineBuilder::item(&item, dec!(1), dec!(25))
                        .linked_to(order.sales_order_id, order.line_ids[0]),
                ),
        );
        let (engine, store) = scenario.engine();
        store.fail_at(FailurePoint::UpdateSalesOrderLine).await;

        let error = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::Transaction(_)));
        let state = store.snapshot().await;
        assert_no_ledger_writes(&state);
        assert!(state.shipments.is_empty());
        assert!(state.shipment_lines.is_empty());
        assert_eq!(state.sales_order_lines[&order.line_ids[0]].quantity_invoiced, Decimal::ZERO);
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_failed_commit_writes_nothing() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(InvoiceLineBuilder::item(&item, dec!(2), dec!(25))),
        );
        let (engine, store) = scenario.engine();
        store.fail_at(FailurePoint::Commit).await;

        let error = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), "transaction");
        assert_no_ledger_writes(&store.snapshot().await);
    }

    #[tokio::test]
    async fn test_failed_reset_keeps_the_original_error() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_status(SalesInvoiceStatus::Pending)
                .line(InvoiceLineBuilder::service(dec!(1), dec!(10))),
        );
        let (engine, store) = scenario.engine();
        store.fail_at(FailurePoint::InsertJournalLines).await;
        store.fail_at(FailurePoint::ResetStatus).await;

        let error = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::Transaction(_)));
        let state = store.snapshot().await;
        assert_no_ledger_writes(&state);
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_after_failure_posts_once() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);

        store.fail_at(FailurePoint::MarkDocument).await;
        assert!(engine.post_sales_invoice(request).await.is_err());
        store.clear_failures().await;
        engine.post_sales_invoice(request).await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.journals.len(), 1);
        assert_eq!(state.journal_lines.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_posts_commit_once() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(InvoiceLineBuilder::item(&item, dec!(1), dec!(25))),
        );
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);

        let (first, second) = tokio::join!(engine.post_sales_invoice(request), engine.post_sales_invoice(request));

        let results = [first, second];
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        let rejected = results.iter().find_map(|result| result.as_ref().err()).expect("one run rejected");
        assert!(matches!(rejected, PostingError::InvalidState(_)));

        let state = store.snapshot().await;
        assert_eq!(state.journals.len(), 1);
        assert_eq!(state.journal_lines.len(), 4);
        assert_eq!(state.item_ledger_entries.len(), 1);
        assert_eq!(state.shipments.len(), 1);
        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Submitted);
    }
}

// ============================================================================
// Void Sales Invoice
// ============================================================================

mod void_sales_invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_post_then_void_nets_to_zero() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let invoice_id = scenario.add_invoice(
            scenario
                .invoice()
                .with_number("INV-2001")
                .line(InvoiceLineBuilder::item(&item, dec!(3), dec!(25)))
                .line(InvoiceLineBuilder::service(dec!(1), dec!(40))),
        );
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);

        let posted = engine.post_sales_invoice(request).await.unwrap();
        let voided = engine.void_sales_invoice(request).await.unwrap();

        assert_eq!(voided.journal_lines, posted.journal_lines);
        assert_eq!(voided.item_ledger_entries, posted.item_ledger_entries);
        assert_ne!(voided.journal_id, posted.journal_id);

        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesInvoice, *invoice_id.as_uuid());
        assert_eq!(lines.len(), 12);
        assert_balanced_by_reference(&lines);
        assert_accounts_net_to_zero(&lines);

        let shipment_id = generated_shipment_id(&state).expect("shipment generated from the invoice");
        let entries: Vec<_> = state
            .item_ledger_entries_for(DocumentType::SalesShipment, *shipment_id.as_uuid())
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(entries.len(), 2);
        assert_item_quantities_net_to_zero(&entries);

        let shipment = &state.shipments[&shipment_id];
        assert_eq!(shipment.status, ShipmentStatus::Voided);
        assert!(!shipment.invoiced);
        assert_eq!(shipment.voided_by, Some(scenario.user_id));

        assert_eq!(state.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Voided);
        let void_journal = state
            .journals
            .iter()
            .find(|journal| Some(journal.id) == voided.journal_id)
            .expect("void journal written");
        assert_eq!(void_journal.description, "VOID Sales Invoice INV-2001");
    }

    #[tokio::test]
    async fn test_void_rolls_back_invoiced_quantities() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(5)]);
        scenario.mark_sent(order.line_ids[0], dec!(5));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(5)).for_line(order.line_ids[0])],
        );
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(
                InvoiceLineBuilder::item(&item, dec!(5), dec!(10)).linked_to(order.sales_order_id, order.line_ids[0]),
            ),
        );
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);

        engine.post_sales_invoice(request).await.unwrap();
        engine.void_sales_invoice(request).await.unwrap();

        let state = store.snapshot().await;
        let order_line = &state.sales_order_lines[&order.line_ids[0]];
        assert_eq!(order_line.quantity_invoiced, Decimal::ZERO);
        assert!(!order_line.invoiced_complete);
        assert_eq!(order_line.quantity_sent, dec!(5));
        assert_eq!(state.sales_orders[&order.sales_order_id].status, SalesOrderStatus::ToInvoice);

        let shipment = &state.shipments[&shipment_id];
        assert_eq!(shipment.status, ShipmentStatus::Posted);
        assert!(!shipment.invoiced);
    }

    #[tokio::test]
    async fn test_draft_invoice_cannot_be_voided() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (engine, store) = scenario.engine();

        let error = engine
            .void_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::InvalidState(_)));
        assert_eq!(store.snapshot().await.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_second_void_is_rejected() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);

        engine.post_sales_invoice(request).await.unwrap();
        engine.void_sales_invoice(request).await.unwrap();
        let error = engine.void_sales_invoice(request).await.unwrap_err();

        assert!(matches!(error, PostingError::InvalidState(_)));
        assert_eq!(store.snapshot().await.journal_lines.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_void_leaves_invoice_posted() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(InvoiceLineBuilder::item(&item, dec!(1), dec!(25))),
        );
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);
        engine.post_sales_invoice(request).await.unwrap();
        let before = store.snapshot().await;

        store.fail_at(FailurePoint::InsertItemLedgerEntries).await;
        let error = engine.void_sales_invoice(request).await.unwrap_err();

        assert!(matches!(error, PostingError::Transaction(_)));
        let after = store.snapshot().await;
        assert_eq!(after.journal_lines.len(), before.journal_lines.len());
        assert_eq!(after.item_ledger_entries.len(), before.item_ledger_entries.len());
        assert_eq!(after.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Submitted);
    }

    #[tokio::test]
    async fn test_paid_invoice_can_be_voided() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);
        engine.post_sales_invoice(request).await.unwrap();
        store
            .with_state(|state| {
                if let Some(invoice) = state.sales_invoices.get_mut(&invoice_id) {
                    invoice.status = SalesInvoiceStatus::Paid;
                }
            })
            .await;

        engine.void_sales_invoice(request).await.unwrap();

        assert_eq!(store.snapshot().await.sales_invoices[&invoice_id].status, SalesInvoiceStatus::Voided);
    }
}

// ============================================================================
// Void Shipment
// ============================================================================

mod void_shipment_tests {
    use super::*;

    #[tokio::test]
    async fn test_sales_order_shipment_void() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(5)]);
        scenario.mark_sent(order.line_ids[0], dec!(5));
        scenario.mark_invoiced(order.line_ids[0], dec!(5));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(5)).for_line(order.line_ids[0]).with_cost(dec!(20))],
        );
        let (engine, store) = scenario.engine();

        let outcome = engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        assert_eq!(outcome.journal_lines, 2);
        assert_eq!(outcome.item_ledger_entries, 1);

        let state = store.snapshot().await;
        let lines = journal_lines(&state, DocumentType::SalesShipment, *shipment_id.as_uuid());
        assert_eq!(lines.len(), 4);
        assert_accounts_net_to_zero(&lines);
        let entries: Vec<_> = state
            .item_ledger_entries_for(DocumentType::SalesShipment, *shipment_id.as_uuid())
            .into_iter()
            .cloned()
            .collect();
        assert_item_quantities_net_to_zero(&entries);

        let order_line = &state.sales_order_lines[&order.line_ids[0]];
        assert_eq!(order_line.quantity_sent, Decimal::ZERO);
        assert!(!order_line.sent_complete);
        assert!(order_line.sent_date.is_none());
        assert_eq!(state.sales_orders[&order.sales_order_id].status, SalesOrderStatus::ToShip);

        let shipment = &state.shipments[&shipment_id];
        assert_eq!(shipment.status, ShipmentStatus::Voided);
        assert_eq!(shipment.voided_by, Some(scenario.user_id));
        assert!(shipment.voided_date.is_some());
    }

    #[tokio::test]
    async fn test_shipment_without_journal_writes_no_journal() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(2)]);
        scenario.mark_sent(order.line_ids[0], dec!(2));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(2)).for_line(order.line_ids[0])],
        );
        let (engine, store) = scenario.engine();

        let outcome = engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        assert!(outcome.journal_id.is_none());
        let state = store.snapshot().await;
        assert!(state.journals.is_empty());
        assert_eq!(state.item_ledger_entries.len(), 2);
    }

    #[tokio::test]
    async fn test_draft_shipment_is_rejected() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(1)]);
        let shipment_id = scenario.shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            ShipmentStatus::Draft,
            vec![ShipmentLineSpec::new(&item, dec!(1)).for_line(order.line_ids[0])],
        );
        let (engine, store) = scenario.engine();

        let error = engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::InvalidState(_)));
        let state = store.snapshot().await;
        assert_no_ledger_writes(&state);
        assert_eq!(state.shipments[&shipment_id].status, ShipmentStatus::Draft);
    }

    #[tokio::test]
    async fn test_second_void_is_rejected() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(3)]);
        scenario.mark_sent(order.line_ids[0], dec!(3));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(3)).for_line(order.line_ids[0]).with_cost(dec!(12))],
        );
        let (engine, store) = scenario.engine();
        let request = PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id);

        engine.void_shipment(request).await.unwrap();
        let error = engine.void_shipment(request).await.unwrap_err();

        assert!(matches!(error, PostingError::InvalidState(_)));
        let state = store.snapshot().await;
        assert_eq!(state.journal_lines.len(), 4);
        assert_eq!(state.item_ledger_entries.len(), 2);
    }

    #[tokio::test]
    async fn test_invoice_generated_shipment_is_rejected() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let invoice_id = scenario.add_invoice(
            scenario.invoice().line(InvoiceLineBuilder::item(&item, dec!(1), dec!(25))),
        );
        let (engine, store) = scenario.engine();
        engine
            .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();
        let shipment_id = generated_shipment_id(&store.snapshot().await).expect("shipment generated from the invoice");

        let error = engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::InvalidState(_)));
        assert_eq!(store.snapshot().await.shipments[&shipment_id].status, ShipmentStatus::Posted);
    }

    #[tokio::test]
    async fn test_job_quantities_floor_at_zero() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let order = scenario.sales_order(&[dec!(8)]);
        scenario.mark_sent(order.line_ids[0], dec!(8));
        let job_id = scenario.job(dec!(5), dec!(5), dec!(5), JobStatus::Completed);
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(8)).for_line(order.line_ids[0]).for_job(job_id)],
        );
        let (engine, store) = scenario.engine();

        engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        let job = &state.jobs[&job_id];
        assert_eq!(job.quantity_shipped, Decimal::ZERO);
        assert_eq!(job.quantity_complete, Decimal::ZERO);
        assert_eq!(job.status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_purchase_order_shipment_void() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let job_id = scenario.job(dec!(10), dec!(0), dec!(0), JobStatus::InProgress);
        let operation_id = scenario.job_operation(job_id, JobOperationStatus::Done);
        let po_line = scenario.purchase_order_line(dec!(4), Some(operation_id));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::PurchaseOrder(po_line.purchase_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(4)).for_line(po_line.id)],
        );
        let (engine, store) = scenario.engine();

        engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.purchase_order_lines[&po_line.id].quantity_shipped, Decimal::ZERO);
        assert_eq!(state.job_operations[&operation_id].status, JobOperationStatus::Planned);
        assert_eq!(state.shipments[&shipment_id].status, ShipmentStatus::Voided);
    }

    #[tokio::test]
    async fn test_transfer_shipment_void_recomputes_status() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let (transfer_id, line_ids) = scenario.warehouse_transfer(
            WarehouseTransferStatus::ToReceive,
            &[(dec!(5), dec!(5), dec!(0)), (dec!(3), dec!(3), dec!(0))],
        );
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::OutboundTransfer(transfer_id),
            vec![ShipmentLineSpec::new(&item, dec!(5)).for_line(line_ids[0])],
        );
        let (engine, store) = scenario.engine();

        engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.warehouse_transfer_lines[&line_ids[0]].shipped_quantity, Decimal::ZERO);
        assert_eq!(state.warehouse_transfer_lines[&line_ids[1]].shipped_quantity, dec!(3));
        assert_eq!(state.warehouse_transfers[&transfer_id].status, WarehouseTransferStatus::ToShipAndReceive);

        let entries: Vec<_> = state
            .item_ledger_entries_for(DocumentType::TransferShipment, *shipment_id.as_uuid())
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(entries.len(), 2);
        assert_item_quantities_net_to_zero(&entries);
    }

    #[tokio::test]
    async fn test_tracked_entities_are_restored() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let entity_id = scenario.consumed_entity(&item);
        let order = scenario.sales_order(&[dec!(1)]);
        scenario.mark_sent(order.line_ids[0], dec!(1));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(1)).for_line(order.line_ids[0]).tracked(entity_id)],
        );
        let (engine, store) = scenario.engine();

        engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let state = store.snapshot().await;
        let entity = &state.tracked_entities[&entity_id];
        assert_eq!(entity.status, TrackedEntityStatus::Available);
        assert_eq!(entity.quantity, dec!(1));

        assert_eq!(state.tracked_activities.len(), 1);
        let activity = &state.tracked_activities[0];
        assert_eq!(activity.activity_type, "Void Shipment");
        assert_eq!(activity.source_document_id, *shipment_id.as_uuid());
        assert_eq!(state.tracked_activity_inputs.len(), 1);
        assert_eq!(state.tracked_activity_inputs[0].tracked_entity_id, entity_id);
        assert_eq!(state.tracked_activity_inputs[0].tracked_activity_id, activity.id);
    }

    #[tokio::test]
    async fn test_partly_shipped_batch_gets_quantity_back() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let batch_id = scenario.partly_shipped_batch(&item, dec!(7));
        let order = scenario.sales_order(&[dec!(3)]);
        scenario.mark_sent(order.line_ids[0], dec!(3));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(3)).for_line(order.line_ids[0]).tracked(batch_id)],
        );
        let (engine, store) = scenario.engine();

        engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap();

        let batch = &store.snapshot().await.tracked_entities[&batch_id];
        assert_eq!(batch.status, TrackedEntityStatus::Available);
        assert_eq!(batch.quantity, dec!(10));
    }

    #[tokio::test]
    async fn test_failed_restore_writes_nothing() {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(4));
        let entity_id = scenario.consumed_entity(&item);
        let order = scenario.sales_order(&[dec!(1)]);
        scenario.mark_sent(order.line_ids[0], dec!(1));
        let shipment_id = scenario.posted_shipment(
            ShipmentSource::SalesOrder(order.sales_order_id),
            vec![ShipmentLineSpec::new(&item, dec!(1)).for_line(order.line_ids[0]).tracked(entity_id)],
        );
        let (engine, store) = scenario.engine();
        store.fail_at(FailurePoint::RestoreTrackedEntities).await;

        let error = engine
            .void_shipment(PostingRequest::new(shipment_id, scenario.user_id, scenario.company_id))
            .await
            .unwrap_err();

        assert!(matches!(error, PostingError::Transaction(_)));
        let state = store.snapshot().await;
        assert_eq!(state.tracked_entities[&entity_id].status, TrackedEntityStatus::Consumed);
        assert_eq!(state.item_ledger_entries.len(), 1);
        assert_eq!(state.sales_order_lines[&order.line_ids[0]].quantity_sent, dec!(1));
        assert_eq!(state.shipments[&shipment_id].status, ShipmentStatus::Posted);
    }
}

// ============================================================================
// Post-commit Hooks
// ============================================================================

mod hook_tests {
    use super::*;

    #[tokio::test]
    async fn test_hooks_see_committed_events_and_failures_are_swallowed() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let store = scenario.store();
        let recording = RecordingHook::new();
        let engine = PostingEngine::new(Arc::new(store.clone()))
            .with_hook(Arc::new(FailingHook))
            .with_hook(Arc::new(recording.clone()));
        let request = PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id);

        let posted = engine.post_sales_invoice(request).await.unwrap();
        engine.void_sales_invoice(request).await.unwrap();

        let events = recording.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, PostingEventKind::SalesInvoicePosted);
        assert_eq!(events[0].journal_id, posted.journal_id);
        assert_eq!(events[0].document_id, *invoice_id.as_uuid());
        assert_eq!(events[1].kind, PostingEventKind::SalesInvoiceVoided);
    }

    #[tokio::test]
    async fn test_hooks_are_not_called_on_failure() {
        let mut scenario = PostingScenario::new();
        let invoice_id = scenario.add_invoice(scenario.invoice().line(InvoiceLineBuilder::service(dec!(1), dec!(10))));
        let store = scenario.store();
        store.fail_at(FailurePoint::Commit).await;
        let recording = RecordingHook::new();
        let engine = PostingEngine::new(Arc::new(store)).with_hook(Arc::new(recording.clone()));

        let result = engine
            .post_sales_invoice(PostingRequest::new(invoice_id, UserId::new(), scenario.company_id))
            .await;

        assert!(result.is_err());
        assert!(recording.events().await.is_empty());
    }
}

// ============================================================================
// Property-based Tests
// ============================================================================

mod property_tests {
    use super::*;

    fn post_generated_invoice(shapes: &[test_utils::LineShape]) -> (StoreState, usize) {
        let mut scenario = PostingScenario::new();
        let item = scenario.inventory_item(dec!(3.5));
        let mut builder = scenario.invoice().with_shipping_cost(dec!(12.34));
        let mut shipped_inventory_lines = 0;

        for shape in shapes {
            let line = match shape.line_type {
                LineType::Comment => InvoiceLineBuilder::comment(),
                LineType::Service => InvoiceLineBuilder::service(shape.quantity, shape.unit_price),
                line_type => {
                    let mut line = InvoiceLineBuilder::item(&item, shape.quantity, shape.unit_price)
                        .with_line_type(line_type)
                        .with_method(shape.method_type);
                    if shape.linked {
                        let order = scenario.sales_order(&[shape.quantity]);
                        scenario.mark_sent(order.line_ids[0], shape.quantity);
                        line = line.linked_to(order.sales_order_id, order.line_ids[0]);
                    } else if shape.method_type != MethodType::Make {
                        shipped_inventory_lines += 1;
                    }
                    line
                }
            };
            builder = builder.line(line.with_tax(shape.tax_percent));
        }

        let invoice_id = scenario.add_invoice(builder);
        let (engine, store) = scenario.engine();
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            engine
                .post_sales_invoice(PostingRequest::new(invoice_id, scenario.user_id, scenario.company_id))
                .await
                .unwrap();
            (store.snapshot().await, shipped_inventory_lines)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_posting_is_balanced(shapes in invoice_lines_strategy(6)) {
            let (state, shipped) = post_generated_invoice(&shapes);

            prop_assert_eq!(state.journal_lines.len() % 2, 0);
            assert_balanced_by_reference(&state.journal_lines);
            let total: Decimal = state.journal_lines.iter().map(|line| line.amount).sum();
            prop_assert!(total.is_zero());
            prop_assert_eq!(state.item_ledger_entries.len(), shipped);
        }

        #[test]
        fn test_void_reverses_every_posting(shapes in invoice_lines_strategy(4)) {
            let (state, _) = post_generated_invoice(&shapes);
            let Some(invoice_id) = state.sales_invoices.keys().next().copied() else {
                return Ok(());
            };
            let company_id = state.sales_invoices[&invoice_id].company_id;

            let store = domain_posting::InMemoryPostingStore::with_initial_state(state);
            let engine = PostingEngine::new(Arc::new(store.clone()));
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let after = runtime.block_on(async {
                engine
                    .void_sales_invoice(PostingRequest::new(invoice_id, UserId::new(), company_id))
                    .await
                    .unwrap();
                store.snapshot().await
            });

            assert_accounts_net_to_zero(&after.journal_lines);
            assert_item_quantities_net_to_zero(&after.item_ledger_entries);
            prop_assert!(after
                .sales_order_lines
                .values()
                .all(|line| line.quantity_invoiced.is_zero()));
        }
    }
}
