//! Lazily filled, position-addressed view of a binary's disassembly.
//!
//! The index maps display positions (rows) to virtual addresses and
//! addresses to decoded items. Positions are filled contiguously from zero
//! within an epoch; scrolling extends the filled range a batch at a time and
//! a jump discards both maps and starts a new epoch anchored at the target.
//!
//! Every fetch is split in three steps so it can run off the lock:
//! plan a [`FetchRequest`] against the current state, [`FetchRequest::execute`]
//! it against the provider, then [`DisassemblyIndex::commit`] the outcome. A
//! commit planned in an earlier epoch, or an append planned against a write
//! cursor that has since moved, is discarded.

pub mod comments;
pub mod observer;
pub mod shared;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::core::item::{ColumnMask, DisassemblyItem};
use crate::disasm::{AssemblyProvider, DisassemblerResult};
use crate::error::Result;
use crate::formats::BinaryFile;
use crate::span_trace;

pub use comments::CommentStore;
pub use observer::{IndexEvent, Observer, Observers, SubscriptionId};
pub use shared::SharedIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Fill positions from `position` onward in the current epoch
    Append,
    /// Discard the caches and start a new epoch at the fetched address
    Reset { history: HistoryStep },
}

/// What a reset does to the navigation history when it commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStep {
    Keep,
    /// Remember the address that was current before the reset
    Push,
    /// Consume the most recent entry, which is the reset's target
    Pop,
}

/// A planned provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub epoch: u64,
    pub kind: FetchKind,
    pub position: usize,
    /// Number of filled positions when the request was planned
    pub cursor: usize,
    pub virtual_address: u64,
    /// `None` when the address has no file offset; such a fetch yields nothing
    pub file_offset: Option<u64>,
    pub count: usize,
}

impl FetchRequest {
    /// Run the decoder. Reads only the file, never the index.
    pub fn execute<P: AssemblyProvider + ?Sized>(
        self,
        provider: &P,
        file: &BinaryFile,
    ) -> DisassemblerResult<FetchOutcome> {
        let items = match self.file_offset {
            Some(offset) => provider.decode_batch(
                file.contents(),
                offset,
                file.file_size(),
                self.virtual_address,
                self.count,
            )?,
            None => Vec::new(),
        };
        Ok(FetchOutcome {
            request: self,
            items,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub request: FetchRequest,
    pub items: Vec<DisassemblyItem>,
}

pub struct DisassemblyIndex<P: ?Sized> {
    file: Arc<BinaryFile>,
    provider: Arc<P>,
    config: IndexConfig,
    address_to_item: HashMap<u64, DisassemblyItem>,
    positions: Vec<u64>,
    current_address: u64,
    history: VecDeque<u64>,
    epoch: u64,
    comments: CommentStore,
    observers: Observers,
}

impl<P: AssemblyProvider> DisassemblyIndex<P> {
    pub fn new(file: BinaryFile, provider: P) -> Self {
        Self::with_config(Arc::new(file), Arc::new(provider), IndexConfig::default())
    }
}

impl<P: AssemblyProvider + ?Sized> DisassemblyIndex<P> {
    pub fn with_config(file: Arc<BinaryFile>, provider: Arc<P>, config: IndexConfig) -> Self {
        Self {
            file,
            provider,
            config,
            address_to_item: HashMap::new(),
            positions: Vec::new(),
            current_address: 0,
            history: VecDeque::new(),
            epoch: 0,
            comments: CommentStore::new(),
            observers: Observers::default(),
        }
    }

    pub fn file(&self) -> &Arc<BinaryFile> {
        &self.file
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of filled positions.
    pub fn item_count(&self) -> usize {
        self.positions.len()
    }

    pub fn current_address(&self) -> u64 {
        self.current_address
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Addresses of the filled positions, in position order.
    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    pub fn address_at(&self, position: usize) -> Option<u64> {
        self.positions.get(position).copied()
    }

    /// Navigation history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = u64> + '_ {
        self.history.iter().copied()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn comments(&self) -> &CommentStore {
        &self.comments
    }

    pub fn comment(&self, address: u64) -> Option<&str> {
        self.comments.get(address)
    }

    pub fn subscribe(&mut self, observer: Observer) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// A jump target must lie within `[codeVirtAddr, fileSize + codeVirtAddr]`.
    pub fn is_valid_target(&self, target: u64) -> bool {
        let lower = self.file.code_virt_addr();
        let upper = self.file.file_size().saturating_add(lower);
        (lower..=upper).contains(&target)
    }

    fn plan(&self, kind: FetchKind, position: usize, address: u64) -> FetchRequest {
        let file_offset = self.file.virtual_to_file_offset(address);
        if file_offset.is_none() {
            warn!(
                address = %format_args!("{:#x}", address),
                "Address does not map into the file"
            );
        }
        FetchRequest {
            epoch: self.epoch,
            kind,
            // filling past the write cursor would leave a gap
            position: position.min(self.positions.len()),
            cursor: self.positions.len(),
            virtual_address: address,
            file_offset,
            count: self.config.batch_size,
        }
    }

    /// Plan a fetch that refills from `position` with instructions decoded at
    /// `address`.
    pub fn plan_load(&self, position: usize, address: u64) -> FetchRequest {
        self.plan(FetchKind::Append, position, address)
    }

    /// Plan the next batch after the last filled position.
    pub fn plan_extend(&self) -> Option<FetchRequest> {
        let last = self.positions.last()?;
        let next = self.address_to_item.get(last)?.next_address();
        Some(self.plan_load(self.positions.len(), next))
    }

    /// Plan the first page at the start of the code section.
    pub fn plan_prepare(&self) -> FetchRequest {
        let anchor = self.file.code_virt_addr();
        self.plan(
            FetchKind::Reset {
                history: HistoryStep::Keep,
            },
            0,
            anchor,
        )
    }

    /// Plan a jump, `None` when the target is out of range.
    pub fn plan_jump(&self, target: u64) -> Option<FetchRequest> {
        self.plan_reset(target, HistoryStep::Push)
    }

    /// Plan a return to the most recent history entry. The entry is only
    /// consumed when the fetch commits. `None` when the history is empty.
    pub fn plan_return(&self) -> Option<FetchRequest> {
        let target = *self.history.back()?;
        self.plan_reset(target, HistoryStep::Pop)
    }

    fn plan_reset(&self, target: u64, history: HistoryStep) -> Option<FetchRequest> {
        if !self.is_valid_target(target) {
            return None;
        }
        Some(self.plan(FetchKind::Reset { history }, 0, target))
    }

    // Why a planned request no longer applies, if it doesn't.
    fn staleness(&self, request: &FetchRequest) -> Option<&'static str> {
        if request.epoch != self.epoch {
            return Some("planned in a previous epoch");
        }
        match request.kind {
            FetchKind::Append if request.cursor != self.positions.len() => {
                Some("write cursor moved since planning")
            }
            FetchKind::Reset {
                history: HistoryStep::Pop,
            } if self.history.back() != Some(&request.virtual_address) => {
                Some("history changed since planning")
            }
            _ => None,
        }
    }

    /// Apply a fetched batch. Returns false, changing nothing, when the
    /// request no longer matches the index state it was planned against.
    pub fn commit(&mut self, outcome: FetchOutcome) -> bool {
        let FetchOutcome { request, items } = outcome;
        if let Some(reason) = self.staleness(&request) {
            debug!(
                planned_epoch = request.epoch,
                epoch = self.epoch,
                reason,
                "Discarding stale fetch"
            );
            return false;
        }

        let count_before = self.positions.len();
        let current_before = self.current_address;
        let mut reset = None;

        match request.kind {
            FetchKind::Reset { history } => {
                match history {
                    HistoryStep::Keep => {}
                    HistoryStep::Push => self.push_history(self.current_address),
                    HistoryStep::Pop => {
                        self.history.pop_back();
                    }
                }
                self.address_to_item.clear();
                self.positions.clear();
                self.epoch += 1;
                self.current_address = request.virtual_address;
                reset = Some(IndexEvent::EpochReset {
                    epoch: self.epoch,
                    anchor: request.virtual_address,
                });
            }
            FetchKind::Append => self.positions.truncate(request.position),
        }

        for mut item in items {
            self.comments.apply(&mut item);
            self.positions.push(item.address);
            self.address_to_item.insert(item.address, item);
        }

        if let Some(event) = reset {
            self.observers.notify(&event);
        }
        if self.current_address != current_before {
            self.observers
                .notify(&IndexEvent::CurrentAddressChanged(self.current_address));
        }
        if self.positions.len() != count_before {
            self.observers
                .notify(&IndexEvent::ItemCountChanged(self.positions.len()));
        }
        true
    }

    fn push_history(&mut self, address: u64) {
        self.history.push_back(address);
        while self.history.len() > self.config.max_history {
            self.history.pop_front();
        }
    }

    // Decode first so a provider error leaves the index untouched.
    fn run(&mut self, request: FetchRequest) -> Result<usize> {
        let outcome = request.execute(self.provider.as_ref(), &self.file)?;
        let decoded = outcome.items.len();
        self.commit(outcome);
        Ok(decoded)
    }

    /// Seed the index with the first page at the start of the code section.
    pub fn prepare(&mut self) -> Result<usize> {
        let request = self.plan_prepare();
        let span = span_trace!(
            "prepare",
            anchor = %format_args!("{:#x}", request.virtual_address)
        );
        let _guard = span.enter();
        let decoded = self.run(request)?;
        debug!(decoded, "Prepared index");
        Ok(decoded)
    }

    /// Refill from `position` with a batch decoded at `address`. Positions
    /// past `position` are dropped first. Returns the number of items decoded.
    pub fn load_more(&mut self, position: usize, address: u64) -> Result<usize> {
        let request = self.plan_load(position, address);
        self.run(request)
    }

    /// Scroll-triggered fetch: make sure `last_visible` is filled, then
    /// decode the next batch after the filled range.
    pub fn load_more_after(&mut self, last_visible: usize) -> Result<usize> {
        if self.positions.is_empty() {
            return Ok(0);
        }
        self.get_item(last_visible)?;
        match self.plan_extend() {
            Some(request) => self.run(request),
            None => Ok(0),
        }
    }

    /// Item at a filled position, without fetching.
    pub fn item_at(&self, position: usize) -> Option<&DisassemblyItem> {
        let address = self.positions.get(position)?;
        self.address_to_item.get(address)
    }

    /// Item at `position`, filling forward from the last filled position
    /// when needed. Filled positions are contiguous, so the last one is the
    /// nearest filled position below any unfilled one.
    ///
    /// Returns a placeholder when nothing is filled or the data runs out
    /// before `position`.
    pub fn get_item(&mut self, position: usize) -> Result<DisassemblyItem> {
        while position >= self.positions.len() {
            let before = self.positions.len();
            let Some(request) = self.plan_extend() else {
                break;
            };
            self.run(request)?;
            if self.positions.len() <= before {
                break;
            }
        }
        Ok(match self.item_at(position) {
            Some(item) => item.clone(),
            None => {
                debug!(position, "No item at position, returning placeholder");
                DisassemblyItem::placeholder()
            }
        })
    }

    /// Discard the caches and restart at `target`, remembering the current
    /// address. Returns false, changing nothing, for an out-of-range target.
    pub fn jump_to(&mut self, target: u64) -> Result<bool> {
        let span = span_trace!("jump", target = %format_args!("{:#x}", target));
        let _guard = span.enter();
        let Some(request) = self.plan_jump(target) else {
            warn!("Jump target out of range");
            return Ok(false);
        };
        self.run(request)?;
        info!(epoch = self.epoch, items = self.positions.len(), "Jumped");
        Ok(true)
    }

    /// Jump back to the most recently remembered address. False when the
    /// history is empty.
    pub fn return_jump(&mut self) -> Result<bool> {
        let Some(request) = self.plan_return() else {
            return Ok(false);
        };
        let target = request.virtual_address;
        self.run(request)?;
        info!(
            target = %format_args!("{:#x}", target),
            "Returned from jump"
        );
        Ok(true)
    }

    /// Jump to the branch target of the item at `position`, if it has one.
    pub fn follow_branch(&mut self, position: usize) -> Result<bool> {
        match self.branch_target_at(position) {
            Some(target) => self.jump_to(target),
            None => Ok(false),
        }
    }

    pub fn branch_target_at(&self, position: usize) -> Option<u64> {
        self.item_at(position)?.branch_target
    }

    /// Mark the address at `position` as current. False when the position is
    /// not filled.
    pub fn set_current_address(&mut self, position: usize) -> bool {
        let Some(address) = self.address_at(position) else {
            return false;
        };
        if address != self.current_address {
            self.current_address = address;
            self.observers
                .notify(&IndexEvent::CurrentAddressChanged(address));
        }
        true
    }

    /// Record a comment. It is kept across jumps and shown on the item
    /// whenever the address is decoded. Returns whether a cached item was
    /// updated right away.
    pub fn set_comment(&mut self, address: u64, text: impl Into<String>) -> bool {
        let text = text.into();
        self.comments.set(address, text.clone());
        match self.address_to_item.get_mut(&address) {
            Some(item) => {
                item.comment = text;
                true
            }
            None => false,
        }
    }

    /// Flat-line rendering of the cached item at `address`.
    pub fn to_code_string(&self, address: u64, mask: &ColumnMask) -> Option<String> {
        self.address_to_item
            .get(&address)
            .map(|item| item.to_code_string(mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item::Column;
    use crate::core::machine::MachineType;
    use crate::disasm::{code_window, DisassemblerError};
    use crate::formats::CodeLayout;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Two-byte "instructions" whose operand is their file offset.
    #[derive(Default)]
    struct Pairs {
        fail: AtomicBool,
    }

    impl AssemblyProvider for Pairs {
        fn decode_batch(
            &self,
            buffer: &[u8],
            file_offset: u64,
            file_length: u64,
            virtual_base: u64,
            count: usize,
        ) -> DisassemblerResult<Vec<DisassemblyItem>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DisassemblerError::Backend("boom".to_string()));
            }
            let code = code_window(buffer, file_offset, file_length);
            Ok(code
                .chunks(2)
                .take(count)
                .enumerate()
                .map(|(i, chunk)| {
                    let step = 2 * i as u64;
                    DisassemblyItem::new(virtual_base + step, chunk.to_vec(), "op")
                        .with_operands(format!("{:#x}", file_offset + step))
                })
                .collect())
        }

        fn machine_type(&self) -> MachineType {
            MachineType::Unknown
        }
    }

    fn file() -> Arc<BinaryFile> {
        let file = BinaryFile::raw("t.bin", Bytes::from(vec![0u8; 0x1000]))
            .with_manual_layout(CodeLayout {
                base: 0x80,
                limit: 0xf80,
                entry: 0,
                virt_addr: 0x1000,
            })
            .unwrap();
        Arc::new(file)
    }

    fn index_with(provider: Arc<Pairs>, max_history: usize) -> DisassemblyIndex<Pairs> {
        let config = IndexConfig {
            batch_size: 8,
            max_history,
            ..IndexConfig::default()
        };
        DisassemblyIndex::with_config(file(), provider, config)
    }

    fn index() -> DisassemblyIndex<Pairs> {
        index_with(Arc::new(Pairs::default()), 16)
    }

    #[test]
    fn test_prepare_reads_code_start() {
        let mut idx = index();
        assert_eq!(idx.prepare().unwrap(), 8);
        let first = idx.get_item(0).unwrap();
        assert_eq!(first.address, 0x1000);
        assert_eq!(first.operands, "0x80");
        assert_eq!(idx.current_address(), 0x1000);
        assert_eq!(idx.item_count(), 8);
    }

    #[test]
    fn test_get_item_fills_forward() {
        let mut idx = index();
        idx.prepare().unwrap();
        let item = idx.get_item(20).unwrap();
        assert_eq!(item.address, 0x1000 + 40);
        assert_eq!(idx.item_count(), 24);
    }

    #[test]
    fn test_get_item_placeholders() {
        let mut idx = index();
        assert!(idx.get_item(0).unwrap().is_placeholder());
        idx.prepare().unwrap();
        assert!(idx.get_item(100_000).unwrap().is_placeholder());
        // 0xf80 bytes of two-byte instructions
        assert_eq!(idx.item_count(), 0x7c0);
    }

    #[test]
    fn test_load_more_after_is_contiguous() {
        let mut idx = index();
        idx.prepare().unwrap();
        for _ in 0..5 {
            let last = idx.item_count() - 1;
            idx.load_more_after(last).unwrap();
        }
        assert_eq!(idx.item_count(), 48);
        assert!(idx.positions().windows(2).all(|w| w[0] < w[1]));
        assert!(idx.positions().windows(2).all(|w| w[1] - w[0] == 2));
    }

    #[test]
    fn test_load_more_truncates_at_position() {
        let mut idx = index();
        idx.prepare().unwrap();
        idx.load_more(4, 0x1008).unwrap();
        assert_eq!(idx.item_count(), 12);
        assert_eq!(idx.address_at(4), Some(0x1008));
    }

    #[test]
    fn test_failed_jump_changes_nothing() {
        let mut idx = index();
        idx.prepare().unwrap();
        let epoch = idx.epoch();
        assert!(!idx.jump_to(0x2001).unwrap());
        assert!(!idx.jump_to(0x10).unwrap());
        assert_eq!(idx.current_address(), 0x1000);
        assert_eq!(idx.item_count(), 8);
        assert_eq!(idx.epoch(), epoch);
        assert_eq!(idx.history_len(), 0);
    }

    #[test]
    fn test_jump_and_return_round_trip() {
        let mut idx = index();
        idx.prepare().unwrap();
        idx.set_current_address(3);
        assert!(idx.jump_to(0x1100).unwrap());
        assert_eq!(idx.get_item(0).unwrap().operands, "0x180");
        assert_eq!(idx.current_address(), 0x1100);
        assert_eq!(idx.history_len(), 1);

        assert!(idx.return_jump().unwrap());
        assert_eq!(idx.current_address(), 0x1006);
        assert_eq!(idx.history_len(), 0);
        assert!(!idx.return_jump().unwrap());
    }

    #[test]
    fn test_history_is_capped() {
        let mut idx = index_with(Arc::new(Pairs::default()), 2);
        idx.prepare().unwrap();
        for target in [0x1100, 0x1200, 0x1300] {
            assert!(idx.jump_to(target).unwrap());
        }
        assert_eq!(idx.history().collect::<Vec<_>>(), vec![0x1100, 0x1200]);
    }

    #[test]
    fn test_decoder_error_leaves_state() {
        let provider = Arc::new(Pairs::default());
        let mut idx = index_with(provider.clone(), 16);
        idx.prepare().unwrap();
        provider.fail.store(true, Ordering::SeqCst);
        assert!(idx.jump_to(0x1100).is_err());
        assert!(idx.load_more_after(7).is_err());
        assert_eq!(idx.current_address(), 0x1000);
        assert_eq!(idx.item_count(), 8);
        assert_eq!(idx.history_len(), 0);
    }

    #[test]
    fn test_stale_commit_is_discarded() {
        let mut idx = index();
        idx.prepare().unwrap();
        let request = idx.plan_extend().unwrap();
        let outcome = request.execute(idx.provider().as_ref(), idx.file()).unwrap();
        idx.jump_to(0x1200).unwrap();
        assert!(!idx.commit(outcome));
        assert_eq!(idx.item_count(), 8);
        assert_eq!(idx.address_at(0), Some(0x1200));
    }

    #[test]
    fn test_jump_bounds() {
        let mut idx = index();
        idx.prepare().unwrap();
        // maps into the file header, but lies below the code section
        assert!(!idx.is_valid_target(0xf90));
        assert!(!idx.jump_to(0xf90).unwrap());
        assert!(!idx.jump_to(0xfff).unwrap());
        assert_eq!(idx.current_address(), 0x1000);
        assert_eq!(idx.history_len(), 0);

        // fileSize + codeVirtAddr is inclusive
        assert!(idx.jump_to(0x2000).unwrap());
        assert_eq!(idx.current_address(), 0x2000);
        assert_eq!(idx.item_count(), 0);
        assert!(idx.get_item(0).unwrap().is_placeholder());
    }

    #[test]
    fn test_append_after_cursor_moved_is_discarded() {
        let mut idx = index();
        idx.prepare().unwrap();
        let request = idx.plan_extend().unwrap();
        let outcome = request.execute(idx.provider().as_ref(), idx.file()).unwrap();
        idx.get_item(30).unwrap();
        assert_eq!(idx.item_count(), 32);

        assert!(!idx.commit(outcome));
        assert_eq!(idx.item_count(), 32);
        assert_eq!(idx.address_at(31), Some(0x1000 + 62));
    }

    #[test]
    fn test_return_consumes_history_on_commit() {
        let provider = Arc::new(Pairs::default());
        let mut idx = index_with(provider.clone(), 16);
        idx.prepare().unwrap();
        idx.jump_to(0x1100).unwrap();

        let request = idx.plan_return().unwrap();
        assert_eq!(request.virtual_address, 0x1000);
        assert_eq!(idx.history_len(), 1);

        provider.fail.store(true, Ordering::SeqCst);
        assert!(idx.return_jump().is_err());
        assert_eq!(idx.history_len(), 1);
        assert_eq!(idx.current_address(), 0x1100);

        provider.fail.store(false, Ordering::SeqCst);
        let outcome = request.execute(idx.provider().as_ref(), idx.file()).unwrap();
        assert!(idx.commit(outcome));
        assert_eq!(idx.history_len(), 0);
        assert_eq!(idx.current_address(), 0x1000);
        assert!(idx.plan_return().is_none());
    }

    #[test]
    fn test_comments_survive_jumps() {
        let mut idx = index();
        idx.prepare().unwrap();
        assert!(idx.set_comment(0x1002, "hello"));
        assert!(!idx.set_comment(0x1400, "later"));

        let all = ColumnMask::all();
        let text = idx.to_code_string(0x1002, &all).unwrap();
        assert!(text.ends_with(";hello"));
        let without = all.with(Column::Comment, false);
        assert!(!idx.to_code_string(0x1002, &without).unwrap().contains("hello"));

        idx.jump_to(0x1400).unwrap();
        assert_eq!(idx.get_item(0).unwrap().comment, "later");
        idx.return_jump().unwrap();
        assert_eq!(idx.get_item(1).unwrap().comment, "hello");
        assert_eq!(idx.comment(0x1002), Some("hello"));
        assert_eq!(idx.comments().len(), 2);
    }

    #[test]
    fn test_observers_see_changes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut idx = index();
        let sink = seen.clone();
        idx.subscribe(Box::new(move |e: &IndexEvent| sink.lock().unwrap().push(*e)));

        idx.prepare().unwrap();
        idx.set_current_address(0);
        idx.set_current_address(1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                IndexEvent::EpochReset {
                    epoch: 1,
                    anchor: 0x1000
                },
                IndexEvent::CurrentAddressChanged(0x1000),
                IndexEvent::ItemCountChanged(8),
                IndexEvent::CurrentAddressChanged(0x1002),
            ]
        );
    }

    #[test]
    fn test_follow_branch() {
        let mut idx = index();
        idx.prepare().unwrap();
        assert!(!idx.follow_branch(0).unwrap());
        assert_eq!(idx.branch_target_at(0), None);
    }
}
