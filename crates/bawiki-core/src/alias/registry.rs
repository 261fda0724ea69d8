use std::sync::{Arc, PoisonError, RwLock};

use crate::error::AliasError;
use crate::fetcher::CachedFetcher;
use crate::request::{DecodeAs, FetchRequest};

use super::resolver::{resolve, Resolution};
use super::table::AliasTable;

/// Shared, atomically replaceable alias table.
///
/// Readers take a snapshot and resolve against it; a refresh swaps the whole
/// table, so a resolution never sees a half-updated table.
#[derive(Debug, Default)]
pub struct AliasRegistry {
    table: RwLock<Arc<AliasTable>>,
}

impl AliasRegistry {
    pub fn new(table: AliasTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    pub fn snapshot(&self) -> Arc<AliasTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new table, returning the previous one.
    pub fn replace(&self, table: AliasTable) -> Arc<AliasTable> {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(table))
    }

    pub fn resolve(&self, input: &str) -> String {
        resolve(input, &self.snapshot())
    }

    pub fn resolution(&self, input: &str) -> Resolution {
        Resolution::of(input, &self.snapshot())
    }

    /// Fetch a JSON alias table and install it. The current table survives
    /// any fetch or parse failure.
    pub async fn refresh(
        &self,
        fetcher: &CachedFetcher,
        request: FetchRequest,
    ) -> Result<usize, AliasError> {
        let payload = fetcher.fetch(request.decode_as(DecodeAs::Json)).await?;
        let value = payload.into_json().unwrap_or_default();
        let table = AliasTable::from_value(&value)?;
        let entries = table.len();
        self.replace(table);
        tracing::info!(entries, "alias table refreshed");
        Ok(entries)
    }
}
