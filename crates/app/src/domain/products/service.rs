//! Products service.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;

use crate::{
    cache::StockCache,
    clock::Clock,
    database::Db,
    domain::products::{
        errors::ProductsServiceError,
        models::{NewProduct, Product, ProductUuid},
        repository::PgProductsRepository,
    },
};

#[derive(Clone)]
pub struct PgProductsService {
    db: Db,
    clock: Arc<dyn Clock>,
    cache: Arc<dyn StockCache>,
    repository: PgProductsRepository,
}

impl PgProductsService {
    #[must_use]
    pub fn new(db: Db, clock: Arc<dyn Clock>, cache: Arc<dyn StockCache>) -> Self {
        Self {
            db,
            clock,
            cache,
            repository: PgProductsRepository::new(),
        }
    }
}

#[async_trait]
impl ProductsService for PgProductsService {
    async fn get_product(&self, uuid: ProductUuid) -> Result<Product, ProductsServiceError> {
        let mut tx = self.db.begin().await.map_err(ProductsServiceError::Sql)?;

        let product = self.repository.get_product(&mut tx, uuid).await?;

        tx.commit().await.map_err(ProductsServiceError::Sql)?;

        Ok(product)
    }

    async fn available_stock(&self, uuid: ProductUuid) -> Result<u64, ProductsServiceError> {
        let db = self.db.clone();
        let repository = self.repository.clone();

        self.cache
            .load(
                uuid,
                Box::pin(async move {
                    let mut tx = db.begin().await?;

                    let available = repository.available_stock(&mut tx, uuid).await?;

                    tx.commit().await?;

                    Ok(available)
                }),
            )
            .await
            .map_err(Into::into)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, ProductsServiceError> {
        let mut tx = self.db.begin().await.map_err(ProductsServiceError::Sql)?;

        let created = self
            .repository
            .create_product(&mut tx, &product, self.clock.now())
            .await?;

        tx.commit().await.map_err(ProductsServiceError::Sql)?;

        Ok(created)
    }
}

#[automock]
#[async_trait]
pub trait ProductsService: Send + Sync {
    /// Retrieve a single product. Inactive products are still returned; the
    /// read surface decides whether to expose them.
    async fn get_product(&self, uuid: ProductUuid) -> Result<Product, ProductsServiceError>;

    /// Cached view of the available-stock counter. Serves display reads only;
    /// reservations read the counter under a row lock instead.
    async fn available_stock(&self, uuid: ProductUuid) -> Result<u64, ProductsServiceError>;

    /// Creates a new product with its full stock available.
    async fn create_product(&self, product: NewProduct) -> Result<Product, ProductsServiceError>;
}
