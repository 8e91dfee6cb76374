//! Integration tests for the Order service.
//!
//! These tests verify the full order lifecycle against the in-memory store,
//! including pricing, product snapshots, audit history, and concurrency handling.

use std::sync::Arc;

use common::{AggregateId, PageRequest};
use domain::order::{Coupon, StandardPricingRules};
use domain::{
    Aggregate, AmountCalculator, CancelOrder, CreateOrder, Currency, CustomerContact, DomainError,
    ErrorKind, InMemoryProductCatalog, Money, Order, OrderError, OrderLine, OrderPaymentStatus,
    OrderService, OrderStatus, ProductId, ProductSnapshot, ShipOrder, UpdateOrderStatus,
};
use rust_decimal::Decimal;
use store::{InMemoryRecordStore, Version};

fn money(s: &str) -> Money {
    Money::parse(s).unwrap()
}

async fn catalog() -> InMemoryProductCatalog {
    let catalog = InMemoryProductCatalog::new();
    catalog
        .upsert(
            ProductSnapshot::new("P-1", "Kettle", money("100.00"), Currency::default())
                .with_name_ar("غلاية")
                .with_sku("KET-01"),
        )
        .await;
    catalog
        .upsert(
            ProductSnapshot::new("P-2", "Mug", money("50.00"), Currency::default())
                .with_sku("MUG-01"),
        )
        .await;
    catalog
        .upsert(ProductSnapshot::new("P-OLD", "Retired", money("10.00"), Currency::default()).inactive())
        .await;
    catalog
        .upsert(ProductSnapshot::new(
            "P-USD",
            "Imported",
            money("10.00"),
            Currency::parse("USD").unwrap(),
        ))
        .await;
    catalog
}

/// Helper to create a test order service with flat shipping of 5.00
async fn create_service() -> (OrderService<InMemoryRecordStore>, InMemoryProductCatalog) {
    let catalog = catalog().await;
    let service = OrderService::new(
        InMemoryRecordStore::new(),
        Arc::new(catalog.clone()),
        AmountCalculator::flat(money("5.00")),
    );
    (service, catalog)
}

fn two_line_order() -> CreateOrder {
    CreateOrder::new(
        CustomerContact::new("Amal Saleh", "amal@example.com").with_phone("770000000"),
        vec![OrderLine::new("P-1", 2), OrderLine::new("P-2", 1)],
    )
    .for_user("user-1")
}

async fn create_order(service: &OrderService<InMemoryRecordStore>) -> AggregateId {
    let order = service.create_order(two_line_order()).await.unwrap().aggregate;
    order.id().unwrap()
}

async fn processing_order(service: &OrderService<InMemoryRecordStore>) -> AggregateId {
    let order_id = create_order(service).await;
    service
        .update_payment_status(order_id, OrderPaymentStatus::Paid)
        .await
        .unwrap();
    service.start_processing(order_id).await.unwrap();
    order_id
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn complete_order_lifecycle() {
        let (service, _) = create_service().await;

        let result = service.create_order(two_line_order()).await.unwrap();
        let order_id = result.aggregate.id().unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Pending);
        assert_eq!(result.aggregate.amounts().subtotal, money("250.00"));
        assert_eq!(result.aggregate.amounts().total_amount, money("255.00"));
        assert_eq!(result.new_version, Version::first());

        // Payment arrives
        let result = service
            .update_payment_status(order_id, OrderPaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Confirmed);

        let result = service.start_processing(order_id).await.unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Processing);

        let result = service
            .ship(ShipOrder::new(order_id, "TRK-789"))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Shipped);
        assert_eq!(result.aggregate.tracking_number(), Some("TRK-789"));

        let result = service.deliver(order_id).await.unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Delivered);
        assert!(result.aggregate.is_terminal());
        assert_eq!(result.new_version, Version::new(5));

        let history = service.history(order_id).await.unwrap();
        let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "OrderPlaced",
                "OrderPaymentStatusChanged",
                "OrderConfirmed",
                "OrderProcessingStarted",
                "OrderShipped",
                "OrderDelivered",
            ]
        );
    }

    #[tokio::test]
    async fn cancel_order_at_various_stages() {
        let (service, _) = create_service().await;

        // Cancel pending order
        let order_id = create_order(&service).await;
        let result = service
            .cancel(CancelOrder::with_reason(order_id, "Customer request"))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Cancelled);
        assert_eq!(result.aggregate.cancellation_reason(), Some("Customer request"));

        // Cancel confirmed order
        let order_id = create_order(&service).await;
        service
            .update_payment_status(order_id, OrderPaymentStatus::Paid)
            .await
            .unwrap();
        let result = service.cancel(CancelOrder::new(order_id)).await.unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Cancelled);

        // Processing orders can no longer be cancelled
        let order_id = processing_order(&service).await;
        let err = service.cancel(CancelOrder::new(order_id)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn items_keep_their_product_snapshot() {
        let (service, catalog) = create_service().await;
        let order_id = create_order(&service).await;

        // Catalog changes after the order was placed
        catalog.set_price(&ProductId::new("P-1"), money("999.00")).await;
        catalog.remove(&ProductId::new("P-2")).await;

        let order = service.get_order(order_id).await.unwrap();
        let kettle = &order.items()[0];
        assert_eq!(kettle.unit_price, money("100.00"));
        assert_eq!(kettle.total_price, money("200.00"));
        assert_eq!(kettle.product_name_ar.as_deref(), Some("غلاية"));
        assert_eq!(kettle.product_sku.as_deref(), Some("KET-01"));
        assert_eq!(order.items()[1].product_name, "Mug");
        assert_eq!(order.amounts().total_amount, money("255.00"));
    }

    #[tokio::test]
    async fn coupons_and_tax_come_from_pricing_rules() {
        let rules = StandardPricingRules::new(Decimal::new(5, 2))
            .with_coupon("WELCOME", Coupon::Fixed(money("20.00")));
        let service = OrderService::new(
            InMemoryRecordStore::new(),
            Arc::new(catalog().await),
            AmountCalculator::new(money("5.00"), Arc::new(rules)),
        );

        let order = service
            .create_order(two_line_order().with_coupon("welcome"))
            .await
            .unwrap()
            .aggregate;

        let amounts = order.amounts();
        assert_eq!(amounts.tax_amount, money("12.50"));
        assert_eq!(amounts.discount_amount, money("20.00"));
        assert_eq!(amounts.total_amount, money("247.50"));
        assert_eq!(
            amounts.total_amount,
            amounts.subtotal + amounts.tax_amount + amounts.shipping_amount
                - amounts.discount_amount
        );
        assert_eq!(order.coupon_code(), Some("welcome"));
    }

    #[tokio::test]
    async fn orders_are_listed_by_user_and_status() {
        let (service, _) = create_service().await;

        let first = create_order(&service).await;
        create_order(&service).await;
        service
            .create_order(two_line_order().for_user("user-2"))
            .await
            .unwrap();
        service.cancel(CancelOrder::new(first)).await.unwrap();

        let page = service
            .list_by_user("user-1", PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(page.total_items, 2);

        let cancelled = service
            .list_by_status(OrderStatus::Cancelled, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(cancelled.total_items, 1);
        assert_eq!(cancelled.items[0].id(), Some(first));

        let pending_for_user = service
            .list_orders(Some("user-1"), Some(OrderStatus::Pending), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(pending_for_user.total_items, 1);
    }

    #[tokio::test]
    async fn admin_status_update_routes_to_transitions() {
        let (service, _) = create_service().await;
        let order_id = processing_order(&service).await;

        let update = |target, tracking_number: Option<&str>| UpdateOrderStatus {
            order_id,
            target,
            tracking_number: tracking_number.map(str::to_string),
            reason: None,
        };

        let err = service
            .update_status(update(OrderStatus::Shipped, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let result = service
            .update_status(update(OrderStatus::Shipped, Some("TRK-1")))
            .await
            .unwrap();
        assert_eq!(result.aggregate.status(), OrderStatus::Shipped);

        let err = service
            .update_status(update(OrderStatus::Pending, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    }
}

mod payment_status_sync {
    use super::*;

    #[tokio::test]
    async fn failed_payment_does_not_touch_order_status() {
        let (service, _) = create_service().await;
        let order_id = create_order(&service).await;

        let result = service
            .update_payment_status(order_id, OrderPaymentStatus::Failed)
            .await
            .unwrap();

        assert_eq!(result.aggregate.status(), OrderStatus::Pending);
        assert_eq!(result.aggregate.payment_status(), OrderPaymentStatus::Failed);
    }

    #[tokio::test]
    async fn failed_retry_does_not_clobber_paid() {
        let (service, _) = create_service().await;
        let order_id = create_order(&service).await;
        service
            .update_payment_status(order_id, OrderPaymentStatus::Paid)
            .await
            .unwrap();

        let result = service
            .update_payment_status(order_id, OrderPaymentStatus::Failed)
            .await
            .unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.aggregate.payment_status(), OrderPaymentStatus::Paid);
        assert_eq!(result.aggregate.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn refunded_order_cannot_ship() {
        let (service, _) = create_service().await;
        let order_id = processing_order(&service).await;

        service
            .update_payment_status(order_id, OrderPaymentStatus::Refunded)
            .await
            .unwrap();

        let err = service
            .ship(ShipOrder::new(order_id, "TRK-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidStateTransition {
                payment_status: OrderPaymentStatus::Refunded,
                ..
            })
        ));
        let order = service.get_order(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Processing);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ship_succeeds_once() {
        let (service, _) = create_service().await;
        let order_id = processing_order(&service).await;

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .ship(ShipOrder::new(order_id, format!("TRK-{i}")))
                        .await
                })
            })
            .collect();

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(
                    e.kind(),
                    ErrorKind::Conflict | ErrorKind::InvalidStateTransition
                )),
            }
        }

        assert_eq!(successes, 1);
        let order = service.get_order(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.version(), Version::new(4));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_payment_updates_are_retried() {
        let (service, _) = create_service().await;
        let order_id = create_order(&service).await;

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .update_payment_status(order_id, OrderPaymentStatus::Paid)
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let order = service.get_order(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        // Exactly one change was recorded, no matter who won
        assert_eq!(order.version(), Version::new(2));
    }
}

mod error_handling {
    use super::*;

    #[tokio::test]
    async fn cannot_ship_confirmed_order() {
        let (service, _) = create_service().await;
        let order_id = create_order(&service).await;
        service
            .update_payment_status(order_id, OrderPaymentStatus::Paid)
            .await
            .unwrap();

        let err = service
            .ship(ShipOrder::new(order_id, "TRK-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidStateTransition {
                current_state: OrderStatus::Confirmed,
                action: "ship",
                ..
            })
        ));
        let order = service.get_order(order_id).await.unwrap();
        assert_eq!(order.version(), Version::new(2));
    }

    #[tokio::test]
    async fn deliver_twice_fails_second_time() {
        let (service, _) = create_service().await;
        let order_id = processing_order(&service).await;
        service.ship(ShipOrder::new(order_id, "TRK-1")).await.unwrap();

        service.deliver(order_id).await.unwrap();
        let err = service.deliver(order_id).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (service, _) = create_service().await;

        let err = service.deliver(AggregateId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service.history(AggregateId::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_writing() {
        let (service, _) = create_service().await;

        let zero_quantity = CreateOrder::new(
            CustomerContact::new("Amal", "amal@example.com"),
            vec![OrderLine::new("P-1", 0)],
        );
        let inactive = CreateOrder::new(
            CustomerContact::new("Amal", "amal@example.com"),
            vec![OrderLine::new("P-OLD", 1)],
        );
        let other_currency = CreateOrder::new(
            CustomerContact::new("Amal", "amal@example.com"),
            vec![OrderLine::new("P-USD", 1)],
        );
        let bad_email = CreateOrder::new(
            CustomerContact::new("Amal", "amal"),
            vec![OrderLine::new("P-1", 1)],
        );
        let unknown_coupon = two_line_order().with_coupon("NOPE");

        for request in [zero_quantity, inactive, other_currency, bad_email, unknown_coupon] {
            let err = service.create_order(request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
        }

        let all = service
            .list_orders(None, None, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total_items, 0);
    }

    #[tokio::test]
    async fn orders_with_excessive_discount_are_rejected() {
        let rules = StandardPricingRules::new(Decimal::ZERO)
            .with_coupon("ALL", Coupon::Fixed(money("500.00")));
        let service: OrderService<InMemoryRecordStore> = OrderService::new(
            InMemoryRecordStore::new(),
            Arc::new(catalog().await),
            AmountCalculator::new(money("5.00"), Arc::new(rules)),
        );

        let err = service
            .create_order(two_line_order().with_coupon("ALL"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert!(err.to_string().contains("Discount exceeds order value"));
    }

    #[tokio::test]
    async fn order_state_survives_reload() {
        let (service, _) = create_service().await;
        let order_id = processing_order(&service).await;

        let loaded: Order = service.get_order(order_id).await.unwrap();

        assert_eq!(loaded.status(), OrderStatus::Processing);
        assert_eq!(loaded.payment_status(), OrderPaymentStatus::Paid);
        assert_eq!(loaded.customer().phone.as_deref(), Some("770000000"));
        assert_eq!(loaded.version(), Version::new(3));
    }
}
