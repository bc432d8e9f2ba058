//! Tenant data consumed by the data-file phase of a deploy

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{RegistryError, Result};

/// Shop and catalog payloads of one tenant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreData {
    pub shop: Value,
    pub products: Value,
}

/// Source of a tenant's current shop and catalog data
#[async_trait]
pub trait StoreDataSource: Send + Sync {
    async fn fetch_shop(&self, shop_id: &str, subdomain: &str) -> Result<Value>;

    async fn fetch_products(&self, shop_id: &str, subdomain: &str) -> Result<Value>;

    /// Both payloads, fetched concurrently
    async fn fetch_all(&self, shop_id: &str, subdomain: &str) -> Result<StoreData> {
        let (shop, products) = futures::try_join!(
            self.fetch_shop(shop_id, subdomain),
            self.fetch_products(shop_id, subdomain)
        )?;
        Ok(StoreData { shop, products })
    }
}

/// Fixed payloads, for tests and local development
#[derive(Debug, Clone, Default)]
pub struct StaticDataSource {
    data: StoreData,
    unavailable: bool,
}

impl StaticDataSource {
    pub fn new(shop: Value, products: Value) -> Self {
        Self {
            data: StoreData { shop, products },
            unavailable: false,
        }
    }

    /// A source whose every fetch fails
    pub fn unavailable() -> Self {
        Self {
            data: StoreData::default(),
            unavailable: true,
        }
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            return Err(RegistryError::DataSource("backend unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreDataSource for StaticDataSource {
    async fn fetch_shop(&self, _shop_id: &str, _subdomain: &str) -> Result<Value> {
        self.check()?;
        Ok(self.data.shop.clone())
    }

    async fn fetch_products(&self, _shop_id: &str, _subdomain: &str) -> Result<Value> {
        self.check()?;
        Ok(self.data.products.clone())
    }
}

#[cfg(feature = "backend")]
pub use graphql::GraphQlDataSource;

#[cfg(feature = "backend")]
mod graphql {
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::{Value, json};
    use tracing::{debug, instrument};

    use super::StoreDataSource;
    use crate::error::{RegistryError, Result};

    const SHOP_QUERY: &str = "query GetShop { shop { id title defaultDomain contactPhone contactEmail address { address } whatsAppNumber whatsAppLink facebookLink instagramLink images { siteLogo { url altText } siteLogoDark { url altText } favicon { url altText } banner { url altText } bannerDark { url altText } coverImage { url altText } coverImageDark { url altText } } currencyCode about shopProductsCategory seoDescription seoKeywords seoTitle paymentMethods { id name provider enabled config { publishableKey testMode } } categories(first: 100) { edges { node { id slug title description images { banner { url altText } } } } } } }";

    const PRODUCTS_QUERY: &str = "query GetProducts($first: Int) { products(first: $first) { edges { node { id productId slug title description attributes { title value } defaultVariant { id variationId price availableQuantity description isDefault attributes { title value } stockStatus } variants { id variationId price availableQuantity description isDefault attributes { title value } stockStatus } images { url altText } updatedAt createdAt } } pageInfo { hasNextPage endCursor } totalCount } }";

    const PRODUCTS_PAGE_SIZE: u32 = 100;

    #[derive(Deserialize)]
    struct GraphQlResponse {
        #[serde(default)]
        data: Option<Value>,
        #[serde(default)]
        errors: Option<Value>,
    }

    /// Tenant data from the backend's GraphQL endpoint
    ///
    /// The tenant is selected with the `X-Shop-Subdomain` header.
    #[derive(Debug, Clone)]
    pub struct GraphQlDataSource {
        client: reqwest::Client,
        endpoint: String,
    }

    impl GraphQlDataSource {
        /// `backend_url` is the backend root; queries go to `{backend_url}/query`
        pub fn new(client: reqwest::Client, backend_url: &str) -> Self {
            Self {
                client,
                endpoint: format!("{}/query", backend_url.trim_end_matches('/')),
            }
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        #[instrument(skip(self, query, variables))]
        async fn query(&self, subdomain: &str, query: &str, variables: Value) -> Result<Value> {
            let response = self
                .client
                .post(&self.endpoint)
                .header("X-Shop-Subdomain", subdomain)
                .json(&json!({ "query": query, "variables": variables }))
                .send()
                .await
                .map_err(|e| RegistryError::DataSource(format!("request failed: {}", e)))?;

            let status = response.status();
            let body: GraphQlResponse = response.json().await.map_err(|e| {
                RegistryError::DataSource(format!("failed to decode response (HTTP {}): {}", status, e))
            })?;

            if let Some(errors) = body.errors.filter(|errors| !errors.is_null()) {
                return Err(RegistryError::DataSource(format!("GraphQL error: {}", errors)));
            }
            if !status.is_success() {
                return Err(RegistryError::DataSource(format!("HTTP error: {}", status)));
            }

            debug!("GraphQL request succeeded");
            Ok(body.data.unwrap_or(Value::Null))
        }
    }

    #[async_trait]
    impl StoreDataSource for GraphQlDataSource {
        async fn fetch_shop(&self, _shop_id: &str, subdomain: &str) -> Result<Value> {
            self.query(subdomain, SHOP_QUERY, json!({})).await
        }

        async fn fetch_products(&self, _shop_id: &str, subdomain: &str) -> Result<Value> {
            self.query(
                subdomain,
                PRODUCTS_QUERY,
                json!({ "first": PRODUCTS_PAGE_SIZE }),
            )
            .await
        }
    }

}
