//! Test helpers.

use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use salvo::{affix_state::inject, prelude::*};

use floodgate_app::{
    context::AppContext,
    domain::{
        holds::{
            MockHoldsService,
            models::{Hold, HoldStatus, HoldUuid},
        },
        idempotency::MockIdempotencyService,
        orders::{
            MockOrdersService,
            models::{Order, OrderStatus, OrderUuid},
        },
        products::{
            MockProductsService,
            models::{Product, ProductUuid},
        },
        webhooks::MockWebhooksService,
    },
};

use crate::state::State;

pub(crate) const TEST_SIGNATURE_HEADER: &str = "x-webhook-signature";

fn strict_products_mock() -> MockProductsService {
    let mut products = MockProductsService::new();

    products.expect_get_product().never();
    products.expect_available_stock().never();
    products.expect_create_product().never();

    products
}

fn strict_holds_mock() -> MockHoldsService {
    let mut holds = MockHoldsService::new();

    holds.expect_reserve().never();
    holds.expect_release().never();
    holds.expect_get_hold().never();
    holds.expect_expired_holds().never();

    holds
}

fn strict_orders_mock() -> MockOrdersService {
    let mut orders = MockOrdersService::new();

    orders.expect_create_order().never();
    orders.expect_get_order().never();
    orders.expect_cancel_order().never();
    orders.expect_stale_pending_orders().never();

    orders
}

fn strict_webhooks_mock() -> MockWebhooksService {
    let mut webhooks = MockWebhooksService::new();

    webhooks.expect_process().never();
    webhooks.expect_replay_deferred().never();

    webhooks
}

fn strict_idempotency_mock() -> MockIdempotencyService {
    let mut idempotency = MockIdempotencyService::new();

    idempotency.expect_begin().never();
    idempotency.expect_complete().never();
    idempotency.expect_purge_expired().never();

    idempotency
}

fn state(
    products: MockProductsService,
    holds: MockHoldsService,
    orders: MockOrdersService,
    webhooks: MockWebhooksService,
    idempotency: MockIdempotencyService,
) -> Arc<State> {
    Arc::new(State::new(
        AppContext {
            products: Arc::new(products),
            holds: Arc::new(holds),
            orders: Arc::new(orders),
            webhooks: Arc::new(webhooks),
            idempotency: Arc::new(idempotency),
        },
        TEST_SIGNATURE_HEADER.to_string(),
    ))
}

fn service(state: Arc<State>, route: Router) -> Service {
    Service::new(Router::new().hoop(inject(state)).push(route))
}

pub(crate) fn products_service(products: MockProductsService, route: Router) -> Service {
    service(
        state(
            products,
            strict_holds_mock(),
            strict_orders_mock(),
            strict_webhooks_mock(),
            strict_idempotency_mock(),
        ),
        route,
    )
}

pub(crate) fn holds_service(holds: MockHoldsService, route: Router) -> Service {
    service(
        state(
            strict_products_mock(),
            holds,
            strict_orders_mock(),
            strict_webhooks_mock(),
            strict_idempotency_mock(),
        ),
        route,
    )
}

pub(crate) fn holds_with_idempotency_service(
    holds: MockHoldsService,
    idempotency: MockIdempotencyService,
    route: Router,
) -> Service {
    service(
        state(
            strict_products_mock(),
            holds,
            strict_orders_mock(),
            strict_webhooks_mock(),
            idempotency,
        ),
        route,
    )
}

pub(crate) fn orders_service(orders: MockOrdersService, route: Router) -> Service {
    service(
        state(
            strict_products_mock(),
            strict_holds_mock(),
            orders,
            strict_webhooks_mock(),
            strict_idempotency_mock(),
        ),
        route,
    )
}

pub(crate) fn webhooks_service(webhooks: MockWebhooksService, route: Router) -> Service {
    service(
        state(
            strict_products_mock(),
            strict_holds_mock(),
            strict_orders_mock(),
            webhooks,
            strict_idempotency_mock(),
        ),
        route,
    )
}

/// Full router wiring with caller-supplied mocks; strict idempotency.
pub(crate) fn service_with_mocks(
    products: MockProductsService,
    holds: MockHoldsService,
    orders: MockOrdersService,
    webhooks: MockWebhooksService,
    route: Router,
) -> Service {
    service(
        state(products, holds, orders, webhooks, strict_idempotency_mock()),
        route,
    )
}

pub(crate) fn make_product(uuid: ProductUuid) -> Product {
    Product {
        uuid,
        name: "Test Product".to_string(),
        price: 2_500,
        initial_stock: 10,
        available_stock: 10,
        active: true,
        created_at: Timestamp::UNIX_EPOCH,
        updated_at: Timestamp::UNIX_EPOCH,
    }
}

pub(crate) fn make_hold(uuid: HoldUuid, product: ProductUuid) -> Hold {
    Hold {
        uuid,
        product_uuid: product,
        quantity: 2,
        session_id: None,
        status: HoldStatus::Pending,
        expires_at: Timestamp::UNIX_EPOCH + SignedDuration::from_secs(120),
        created_at: Timestamp::UNIX_EPOCH,
        consumed_at: None,
    }
}

pub(crate) fn make_order(uuid: OrderUuid, product: ProductUuid, hold: HoldUuid) -> Order {
    Order {
        uuid,
        product_uuid: product,
        hold_uuid: hold,
        quantity: 2,
        unit_price: 5_000,
        total_amount: 10_000,
        status: OrderStatus::Pending,
        customer_email: None,
        customer_details: None,
        payment_reference: None,
        paid_at: None,
        cancelled_at: None,
        created_at: Timestamp::UNIX_EPOCH,
    }
}
