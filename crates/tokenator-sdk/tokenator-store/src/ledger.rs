//! [`Ledger`] backed by a [`TokenStore`].
//!
//! Diesel's connection is blocking and needs `&mut`, so the store sits behind
//! `Arc<Mutex<..>>` and every call runs on tokio's blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokenator_sdk::{
    CreateActionArgs, CreateActionResult, Ledger, ListOutputsArgs, OutPoint, OutputRecord,
    SubmitDirectArgs, SubmitDirectResult, Txid,
};

use crate::error::StoreError;
use crate::store::{StoredTransaction, TokenStore};

#[derive(Clone)]
pub struct SqliteLedger {
    store: Arc<Mutex<TokenStore>>,
}

impl SqliteLedger {
    pub fn new(store: TokenStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open(path: &str) -> crate::Result<Self> {
        Ok(Self::new(TokenStore::open(path)?))
    }

    pub fn open_in_memory() -> crate::Result<Self> {
        Ok(Self::new(TokenStore::open_in_memory()?))
    }

    /// Run a closure against the store on a blocking thread.
    async fn with_store<F, R>(&self, f: F) -> crate::Result<R>
    where
        F: FnOnce(&mut TokenStore) -> crate::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| StoreError::MutexPoisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub async fn is_spent(&self, outpoint: OutPoint) -> crate::Result<bool> {
        self.with_store(move |store| store.is_spent(&outpoint)).await
    }

    pub async fn get_transaction(&self, txid: Txid) -> crate::Result<Option<StoredTransaction>> {
        self.with_store(move |store| store.get_transaction(&txid))
            .await
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn create_action(&self, args: CreateActionArgs) -> tokenator_sdk::Result<CreateActionResult> {
        let result = self
            .with_store(move |store| store.create_action(&args))
            .await?;
        log::debug!("stored action {}", result.txid);
        Ok(result)
    }

    async fn submit_direct(&self, args: SubmitDirectArgs) -> tokenator_sdk::Result<SubmitDirectResult> {
        let result = self
            .with_store(move |store| store.submit_direct(&args))
            .await?;
        log::debug!(
            "stored submission {} ({} new outputs)",
            result.txid,
            result.outputs_added
        );
        Ok(result)
    }

    async fn list_outputs(&self, args: ListOutputsArgs) -> tokenator_sdk::Result<Vec<OutputRecord>> {
        Ok(self
            .with_store(move |store| store.list_outputs(&args))
            .await?)
    }
}
