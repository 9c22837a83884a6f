//! App Router

use salvo::{Router, prelude::max_concurrency};

use crate::{holds, orders, payments, products};

pub(crate) fn app_router(max_inflight_holds: usize) -> Router {
    Router::new()
        .push(
            Router::with_path("products")
                .push(Router::with_path("{product}").get(products::get::handler)),
        )
        .push(
            Router::with_path("holds")
                // Reservation is the hot path of a sale; beyond the admission
                // limit requests are shed with 429 instead of queueing.
                .push(
                    Router::new()
                        .hoop(max_concurrency(max_inflight_holds))
                        .post(holds::create::handler),
                )
                .push(
                    Router::with_path("{hold}")
                        .get(holds::get::handler)
                        .delete(holds::delete::handler),
                ),
        )
        .push(Router::with_path("orders").post(orders::create::handler))
        .push(
            Router::with_path("payments")
                .push(Router::with_path("webhook").post(payments::webhook::handler)),
        )
}
