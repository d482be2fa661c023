//! User comments keyed by virtual address.
//!
//! Lives beside the windowing cache with its own lifecycle, so a comment
//! survives the cache reset a jump performs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::item::DisassemblyItem;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentStore {
    comments: BTreeMap<u64, String>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comment at `address`. Empty text removes it.
    pub fn set(&mut self, address: u64, text: impl Into<String>) -> Option<String> {
        let text = text.into();
        if text.is_empty() {
            self.comments.remove(&address)
        } else {
            self.comments.insert(address, text)
        }
    }

    pub fn get(&self, address: u64) -> Option<&str> {
        self.comments.get(&address).map(String::as_str)
    }

    pub fn remove(&mut self, address: u64) -> Option<String> {
        self.comments.remove(&address)
    }

    /// Comments in ascending address order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.comments.iter().map(|(a, c)| (*a, c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Copy the stored comment, if any, onto a freshly decoded item.
    pub fn apply(&self, item: &mut DisassemblyItem) {
        if let Some(text) = self.comments.get(&item.address) {
            item.comment.clone_from(text);
        }
    }
}
