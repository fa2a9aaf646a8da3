//! Per-sender ordering of deferred chat work.
//!
//! Every chat message, command and chat-session update from a sender is
//! appended here in arrival order. Entries that wait for the content
//! filter are completed out of order as results arrive; [`ChatChain::release`]
//! only ever hands back a prefix of the queue, so a later entry can never
//! overtake an earlier one.

use std::collections::VecDeque;

use super::filter::FilteredText;

#[derive(Debug)]
enum Slot {
    NotNeeded,
    Waiting(u64),
    Done(FilteredText),
}

#[derive(Debug)]
struct Entry<T> {
    payload: T,
    slot: Slot,
}

/// An entry released from the chain, with its filter result if it had one.
#[derive(Debug)]
pub struct Released<T> {
    /// The queued work.
    pub payload: T,
    /// Filter result for entries pushed with [`ChatChain::push_filtered`].
    pub filtered: Option<FilteredText>,
}

/// FIFO of pending chat work for one sender.
#[derive(Debug)]
pub struct ChatChain<T> {
    entries: VecDeque<Entry<T>>,
}

impl<T> Default for ChatChain<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> ChatChain<T> {
    /// Append work that waits for filter `ticket`.
    pub fn push_filtered(&mut self, ticket: u64, payload: T) {
        self.entries.push_back(Entry {
            payload,
            slot: Slot::Waiting(ticket),
        });
    }

    /// Append work that only needs to keep its place in line.
    pub fn push_immediate(&mut self, payload: T) {
        self.entries.push_back(Entry {
            payload,
            slot: Slot::NotNeeded,
        });
    }

    /// Attach a filter result. Unknown tickets are ignored.
    pub fn complete(&mut self, ticket: u64, text: FilteredText) -> bool {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| matches!(e.slot, Slot::Waiting(t) if t == ticket));
        match slot {
            Some(entry) => {
                entry.slot = Slot::Done(text);
                true
            }
            None => false,
        }
    }

    /// Pop the ready prefix of the queue.
    pub fn release(&mut self) -> Vec<Released<T>> {
        let mut out = Vec::new();
        while self
            .entries
            .front()
            .is_some_and(|e| !matches!(e.slot, Slot::Waiting(_)))
        {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            let filtered = match entry.slot {
                Slot::Done(text) => Some(text),
                _ => None,
            };
            out.push(Released {
                payload: entry.payload,
                filtered,
            });
        }
        out
    }

    /// Entries still queued.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
