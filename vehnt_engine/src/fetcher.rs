//! Chunked account retrieval
//!
//! `getMultipleAccounts` caps the number of keys per request, so larger
//! lookups are split into consecutive chunks that are requested concurrently
//! and stitched back together in input order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey};
use tracing::debug;

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::error::{EngineError, Result};

/// Raw account access. A missing account is `None`, never an error.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>>;

    async fn get_account(&self, key: &Pubkey) -> Result<Option<Account>>;
}

/// Account source backed by a Solana JSON-RPC endpoint
pub struct RpcAccountSource {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl RpcAccountSource {
    pub fn new(rpc_url: String, commitment: CommitmentConfig) -> Self {
        Self::from_client(Arc::new(RpcClient::new_with_commitment(rpc_url, commitment)))
    }

    /// Wrap an existing client, reading with its commitment

    pub fn from_client(client: Arc<RpcClient>) -> Self {
        let commitment = client.commitment();
        Self { client, commitment }
    }
}

#[async_trait]
impl AccountSource for RpcAccountSource {
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(keys, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn get_account(&self, key: &Pubkey) -> Result<Option<Account>> {
        let response = self
            .client
            .get_account_with_commitment(key, self.commitment)
            .await?;
        Ok(response.value)
    }
}

/// Split `items` into consecutive chunks of at most `size` elements
pub fn chunks<T>(items: &[T], size: usize) -> Result<Vec<&[T]>> {
    if size == 0 {
        return Err(EngineError::InvalidInput("batch size must be non-zero".to_string()));
    }
    Ok(items.chunks(size).collect())
}

pub struct BatchAccountFetcher {
    source: Arc<dyn AccountSource>,
    batch_size: usize,
}

impl BatchAccountFetcher {
    pub fn new(source: Arc<dyn AccountSource>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(EngineError::InvalidInput("batch size must be non-zero".to_string()));
        }
        Ok(Self { source, batch_size })
    }

    pub fn with_default_batch_size(source: Arc<dyn AccountSource>) -> Self {
        Self {
            source,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn source(&self) -> &Arc<dyn AccountSource> {
        &self.source
    }

    /// Fetch every address, one request per chunk. The output has the same
    /// length and order as `addresses`.
    pub async fn fetch_many(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let batches = chunks(addresses, self.batch_size)?;
        let total = batches.len();

        let requests = batches.into_iter().enumerate().map(|(idx, chunk)| async move {
            debug!(batch = idx + 1, total, keys = chunk.len(), "Fetching account batch");
            let accounts = self.source.get_multiple_accounts(chunk).await?;
            if accounts.len() != chunk.len() {
                return Err(EngineError::Network(format!(
                    "batch {} returned {} accounts for {} keys",
                    idx + 1,
                    accounts.len(),
                    chunk.len()
                )));
            }
            Ok::<_, EngineError>(accounts)
        });

        let results = try_join_all(requests).await?;
        Ok(results.into_iter().flatten().collect())
    }

    /// Fetch every address and key the results by address
    pub async fn fetch_map(
        &self,
        addresses: &[Pubkey],
    ) -> Result<HashMap<Pubkey, Option<Account>>> {
        let accounts = self.fetch_many(addresses).await?;
        Ok(addresses.iter().copied().zip(accounts).collect())
    }
}
