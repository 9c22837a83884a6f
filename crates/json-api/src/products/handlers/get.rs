//! Get Product Handler

use std::sync::Arc;

use salvo::{
    oapi::{ToSchema, extract::PathParam},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use floodgate_app::domain::products::models::Product;

use crate::{extensions::*, products::errors::into_status_error, state::State};

/// Product Response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(crate) struct ProductResponse {
    /// The unique identifier of the product
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Unit price in minor units
    pub price: u64,

    /// Stock the sale opened with
    pub initial_stock: u64,

    /// Units still reservable; served from the stock cache
    pub available_stock: u64,

    /// Whether the product can currently be reserved
    pub active: bool,
}

impl ProductResponse {
    fn new(product: Product, available_stock: u64) -> Self {
        Self {
            id: product.uuid.into(),
            name: product.name,
            price: product.price,
            initial_stock: product.initial_stock,
            available_stock,
            active: product.active,
        }
    }
}

/// Get Product Handler
///
/// Returns a product with its cached available stock.
#[endpoint(
    tags("products"),
    summary = "Get Product",
    responses(
        (status_code = StatusCode::OK, description = "Product found"),
        (status_code = StatusCode::NOT_FOUND, description = "Product missing or inactive"),
        (status_code = StatusCode::INTERNAL_SERVER_ERROR, description = "Internal Server Error"),
    ),
)]
pub(crate) async fn handler(
    product: PathParam<Uuid>,
    depot: &mut Depot,
) -> Result<Json<ProductResponse>, StatusError> {
    let state = depot.obtain_or_500::<Arc<State>>()?;
    let uuid = product.into_inner().into();

    let product = state
        .app
        .products
        .get_product(uuid)
        .await
        .map_err(into_status_error)?;

    // Inactive products are indistinguishable from missing ones.
    if !product.active {
        return Err(StatusError::not_found().brief("Product not found"));
    }

    let available_stock = state
        .app
        .products
        .available_stock(uuid)
        .await
        .map_err(into_status_error)?;

    Ok(Json(ProductResponse::new(product, available_stock)))
}

#[cfg(test)]
mod tests {
    use salvo::test::{ResponseExt, TestClient};
    use testresult::TestResult;

    use floodgate_app::domain::products::{
        MockProductsService, ProductsServiceError, models::ProductUuid,
    };

    use crate::test_helpers::{make_product, products_service};

    use super::*;

    fn make_service(products: MockProductsService) -> Service {
        products_service(products, Router::with_path("products/{product}").get(handler))
    }

    #[tokio::test]
    async fn test_get_returns_product_with_cached_stock() -> TestResult {
        let mut products = MockProductsService::new();
        let uuid = ProductUuid::new();

        let product = make_product(uuid);

        products
            .expect_get_product()
            .once()
            .withf(move |u| *u == uuid)
            .return_once(move |_| Ok(product));

        products
            .expect_available_stock()
            .once()
            .withf(move |u| *u == uuid)
            .return_once(|_| Ok(7));

        let mut res = TestClient::get(format!("http://example.com/products/{uuid}"))
            .send(&make_service(products))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::OK));

        let body: ProductResponse = res.take_json().await?;
        assert_eq!(body.id, uuid.into_uuid());
        assert_eq!(body.available_stock, 7);
        assert!(body.active);

        Ok(())
    }

    #[tokio::test]
    async fn test_get_missing_product_returns_404() -> TestResult {
        let mut products = MockProductsService::new();
        let uuid = ProductUuid::new();

        products
            .expect_get_product()
            .once()
            .return_once(|_| Err(ProductsServiceError::NotFound));

        products.expect_available_stock().never();

        let res = TestClient::get(format!("http://example.com/products/{uuid}"))
            .send(&make_service(products))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::NOT_FOUND));

        Ok(())
    }

    #[tokio::test]
    async fn test_get_inactive_product_returns_404() -> TestResult {
        let mut products = MockProductsService::new();
        let uuid = ProductUuid::new();

        let mut product = make_product(uuid);
        product.active = false;

        products
            .expect_get_product()
            .once()
            .return_once(move |_| Ok(product));

        products.expect_available_stock().never();

        let res = TestClient::get(format!("http://example.com/products/{uuid}"))
            .send(&make_service(products))
            .await;

        assert_eq!(res.status_code, Some(StatusCode::NOT_FOUND));

        Ok(())
    }
}
