//! Thread-safe handle that runs fetches off the caller's thread.
//!
//! The index lives behind a std mutex that is only held for planning and
//! committing. Decoding runs on tokio's blocking pool with a time budget. An
//! async gate keeps at most one fetch in flight per index, since every fetch
//! moves the write cursor. Every fetching operation, `get_item` included,
//! goes through the gate.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use super::{DisassemblyIndex, FetchRequest};
use crate::core::item::{ColumnMask, DisassemblyItem};
use crate::disasm::AssemblyProvider;
use crate::error::{LazydisError, Result};

pub struct SharedIndex<P: ?Sized> {
    inner: Arc<Mutex<DisassemblyIndex<P>>>,
    gate: Arc<tokio::sync::Mutex<()>>,
    fetch_timeout: Duration,
}

impl<P: ?Sized> Clone for SharedIndex<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            gate: Arc::clone(&self.gate),
            fetch_timeout: self.fetch_timeout,
        }
    }
}

impl<P> SharedIndex<P>
where
    P: AssemblyProvider + Send + Sync + ?Sized + 'static,
{
    pub fn new(index: DisassemblyIndex<P>) -> Self {
        let fetch_timeout = Duration::from_secs(index.config().fetch_timeout_secs);
        Self {
            inner: Arc::new(Mutex::new(index)),
            gate: Arc::new(tokio::sync::Mutex::new(())),
            fetch_timeout,
        }
    }

    /// Direct access to the index for reads and synchronous calls.
    pub fn lock(&self) -> Result<MutexGuard<'_, DisassemblyIndex<P>>> {
        Ok(self.inner.lock()?)
    }

    // Decode off the lock, then commit. The caller holds the gate.
    async fn fetch(&self, request: FetchRequest) -> Result<(bool, usize)> {
        let (provider, file) = {
            let index = self.lock()?;
            (Arc::clone(index.provider()), Arc::clone(index.file()))
        };
        let task = tokio::task::spawn_blocking(move || request.execute(provider.as_ref(), &file));
        let outcome = match timeout(self.fetch_timeout, task).await {
            Ok(joined) => joined.map_err(|e| LazydisError::Internal(e.to_string()))??,
            Err(_) => {
                warn!(
                    seconds = self.fetch_timeout.as_secs(),
                    "Fetch exceeded its time budget"
                );
                return Err(LazydisError::Timeout {
                    seconds: self.fetch_timeout.as_secs(),
                });
            }
        };
        let decoded = outcome.items.len();
        let committed = self.lock()?.commit(outcome);
        if !committed {
            debug!("Fetch result dropped");
        }
        Ok((committed, decoded))
    }

    pub async fn prepare(&self) -> Result<usize> {
        let _permit = self.gate.lock().await;
        let request = self.lock()?.plan_prepare();
        let (_, decoded) = self.fetch(request).await?;
        Ok(decoded)
    }

    // Extend until `position` is filled or the data runs out. The caller
    // holds the gate.
    async fn fill_through(&self, position: usize) -> Result<()> {
        loop {
            let request = {
                let index = self.lock()?;
                if index.item_count() > position {
                    return Ok(());
                }
                index.plan_extend()
            };
            let Some(request) = request else {
                return Ok(());
            };
            let (committed, decoded) = self.fetch(request).await?;
            if !committed || decoded == 0 {
                return Ok(());
            }
        }
    }

    /// Fill up to `last_visible`, then fetch one more batch.
    pub async fn load_more_after(&self, last_visible: usize) -> Result<usize> {
        let _permit = self.gate.lock().await;
        self.fill_through(last_visible).await?;
        let Some(request) = self.lock()?.plan_extend() else {
            return Ok(0);
        };
        let (_, decoded) = self.fetch(request).await?;
        Ok(decoded)
    }

    pub async fn jump_to(&self, target: u64) -> Result<bool> {
        let _permit = self.gate.lock().await;
        let Some(request) = self.lock()?.plan_jump(target) else {
            warn!(target = %format_args!("{:#x}", target), "Jump target out of range");
            return Ok(false);
        };
        let (committed, _) = self.fetch(request).await?;
        Ok(committed)
    }

    /// False when there is nothing to return to. The history entry is only
    /// consumed once the fetch commits.
    pub async fn return_jump(&self) -> Result<bool> {
        let _permit = self.gate.lock().await;
        let Some(request) = self.lock()?.plan_return() else {
            return Ok(false);
        };
        let (committed, _) = self.fetch(request).await?;
        Ok(committed)
    }

    /// Item at `position`, filling forward off the lock when needed.
    /// Returns a placeholder when the data runs out first.
    pub async fn get_item(&self, position: usize) -> Result<DisassemblyItem> {
        let _permit = self.gate.lock().await;
        self.fill_through(position).await?;
        let item = self.lock()?.item_at(position).cloned();
        Ok(item.unwrap_or_else(DisassemblyItem::placeholder))
    }

    pub fn item_count(&self) -> Result<usize> {
        Ok(self.lock()?.item_count())
    }

    pub fn current_address(&self) -> Result<u64> {
        Ok(self.lock()?.current_address())
    }

    pub fn set_current_address(&self, position: usize) -> Result<bool> {
        Ok(self.lock()?.set_current_address(position))
    }

    pub fn set_comment(&self, address: u64, text: impl Into<String>) -> Result<bool> {
        Ok(self.lock()?.set_comment(address, text))
    }

    pub fn to_code_string(&self, address: u64, mask: &ColumnMask) -> Result<Option<String>> {
        Ok(self.lock()?.to_code_string(address, mask))
    }
}
