//! NFT ownership lookups
//!
//! Positions are owned through NFTs minted into the registrar's collection.
//! The DAS `getAssetsByOwner` method returns every asset a wallet holds
//! together with its collection grouping.

use std::future::Future;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tracing::debug;
use url::Url;

use crate::error::{EngineError, Result};

pub const DAS_PAGE_LIMIT: u32 = 1000;

/// An NFT held by a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collectible {
    pub mint: Pubkey,
    pub collection: Option<Pubkey>,
}

impl Collectible {
    pub fn belongs_to(&self, collection: &Pubkey) -> bool {
        self.collection.as_ref() == Some(collection)
    }
}

#[async_trait]
pub trait CollectibleSource: Send + Sync {
    async fn owned_collectibles(&self, owner: &Pubkey) -> Result<Vec<Collectible>>;
}

#[derive(Serialize)]
struct DasRequest<'a> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    params: AssetsByOwnerParams,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetsByOwnerParams {
    owner_address: String,
    page: u32,
    limit: u32,
}

#[derive(Deserialize)]
struct DasResponse {
    result: Option<AssetPage>,
    error: Option<DasError>,
}

#[derive(Deserialize)]
struct DasError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPage {
    #[serde(default)]
    pub items: Vec<DasAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DasAsset {
    pub id: String,
    #[serde(default)]
    pub grouping: Vec<AssetGrouping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetGrouping {
    pub group_key: String,
    pub group_value: Option<String>,
}

impl DasAsset {
    pub fn to_collectible(&self) -> Result<Collectible> {
        let mint = Pubkey::from_str(&self.id)
            .map_err(|e| EngineError::decode("DasAsset", format!("asset id {}: {}", self.id, e)))?;

        let collection = self
            .grouping
            .iter()
            .find(|g| g.group_key == "collection")
            .and_then(|g| g.group_value.as_deref())
            .map(|value| {
                Pubkey::from_str(value).map_err(|e| {
                    EngineError::decode("DasAsset", format!("collection {}: {}", value, e))
                })
            })
            .transpose()?;

        Ok(Collectible { mint, collection })
    }
}

/// Collectible source backed by a DAS capable RPC endpoint
pub struct DasCollectibleSource {
    client: Client,
    url: Url,
    page_limit: u32,
}

impl DasCollectibleSource {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
            page_limit: DAS_PAGE_LIMIT,
        }
    }

    async fn fetch_page(&self, owner: &Pubkey, page: u32) -> Result<AssetPage> {
        let request = DasRequest {
            jsonrpc: "2.0",
            id: "vehnt-engine",
            method: "getAssetsByOwner",
            params: AssetsByOwnerParams {
                owner_address: owner.to_string(),
                page,
                limit: self.page_limit,
            },
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<DasResponse>()
            .await?;

        if let Some(error) = response.error {
            return Err(EngineError::Network(format!(
                "getAssetsByOwner failed ({}): {}",
                error.code, error.message
            )));
        }

        response
            .result
            .ok_or_else(|| EngineError::Network("getAssetsByOwner returned no result".to_string()))
    }
}

/// Request pages 1, 2, ... until one comes back with fewer than
/// `page_limit` items
pub async fn collect_pages<F, Fut>(page_limit: u32, mut fetch_page: F) -> Result<Vec<Collectible>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<AssetPage>>,
{
    let mut collectibles = Vec::new();
    let mut page = 1;

    loop {
        let assets = fetch_page(page).await?;
        let count = assets.items.len();
        for asset in &assets.items {
            collectibles.push(asset.to_collectible()?);
        }

        debug!(page, count, "Fetched asset page");
        if count < page_limit as usize {
            break;
        }
        page += 1;
    }

    Ok(collectibles)
}

#[async_trait]
impl CollectibleSource for DasCollectibleSource {
    async fn owned_collectibles(&self, owner: &Pubkey) -> Result<Vec<Collectible>> {
        let collectibles =
            collect_pages(self.page_limit, |page| self.fetch_page(owner, page)).await?;
        debug!(%owner, count = collectibles.len(), "Fetched owned assets");
        Ok(collectibles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "total": 3,
        "limit": 1000,
        "page": 1,
        "items": [
            {
                "id": "hntyVP6YFm1Hg25TN9WGLqM12b8TQmcknKrdu1oxWux",
                "grouping": [
                    {
                        "group_key": "collection",
                        "group_value": "39Lw1RH6zt8AJvKn3BTxmUDofzduCM2J3kSaGDZ8L7Sk"
                    }
                ]
            },
            { "id": "iotEVVZLEywoTn1QdwNPddxPWszn3zFhEot3MfL9fns", "grouping": [] },
            { "id": "mb1eu7TzEc71KxDpsmsKoucSSuuoGLv1drys1oP2jh6" }
        ]
    }"#;

    #[test]
    fn test_asset_page_to_collectibles() {
        let page: AssetPage = serde_json::from_str(PAGE).unwrap();
        let collectibles: Vec<Collectible> = page
            .items
            .iter()
            .map(|a| a.to_collectible().unwrap())
            .collect();

        assert_eq!(collectibles.len(), 3);
        let collection =
            Pubkey::from_str("39Lw1RH6zt8AJvKn3BTxmUDofzduCM2J3kSaGDZ8L7Sk").unwrap();
        assert!(collectibles[0].belongs_to(&collection));
        assert_eq!(collectibles[1].collection, None);
        assert_eq!(collectibles[2].collection, None);
    }

    #[test]
    fn test_malformed_asset_id_is_decode_error() {
        let asset = DasAsset {
            id: "not-base58!".to_string(),
            grouping: vec![],
        };
        assert!(matches!(asset.to_collectible(), Err(EngineError::Decode { .. })));
    }

    fn page_of(n: usize) -> AssetPage {
        AssetPage {
            items: (0..n)
                .map(|_| DasAsset {
                    id: Pubkey::new_unique().to_string(),
                    grouping: vec![],
                })
                .collect(),
        }
    }

    async fn run_pages(sizes: &[usize], page_limit: u32) -> (Result<Vec<Collectible>>, Vec<u32>) {
        let pages: Vec<AssetPage> = sizes.iter().map(|&n| page_of(n)).collect();
        let mut requested = Vec::new();
        let result = collect_pages(page_limit, |page| {
            requested.push(page);
            let served = pages.get(page as usize - 1).cloned();
            async move {
                served.ok_or_else(|| EngineError::Network(format!("page {} out of range", page)))
            }
        })
        .await;
        (result, requested)
    }

    #[tokio::test]
    async fn test_paging_stops_on_short_page() {
        let (result, requested) = run_pages(&[2, 2, 1], 2).await;
        assert_eq!(result.unwrap().len(), 5);
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_paging_stops_on_empty_page() {
        let (result, requested) = run_pages(&[2, 0], 2).await;
        assert_eq!(result.unwrap().len(), 2);
        assert_eq!(requested, vec![1, 2]);

        let (result, requested) = run_pages(&[0], 1000).await;
        assert!(result.unwrap().is_empty());
        assert_eq!(requested, vec![1]);
    }

    #[tokio::test]
    async fn test_paging_propagates_errors() {
        // Every page is full, so the loop runs past the served pages
        let (result, requested) = run_pages(&[2, 2], 2).await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(requested, vec![1, 2, 3]);
    }

    #[test]
    fn test_request_shape() {
        let request = DasRequest {
            jsonrpc: "2.0",
            id: "vehnt-engine",
            method: "getAssetsByOwner",
            params: AssetsByOwnerParams {
                owner_address: "owner".to_string(),
                page: 2,
                limit: 1000,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["params"]["ownerAddress"], "owner");
        assert_eq!(value["params"]["page"], 2);
    }
}
