use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::Mutex;

use crate::models::conversation::{Conversation, Transition};

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    state: Conversation,
    /// Bumped whenever `state` actually changes.
    epoch: u64,
}

/// Per-chat conversation slots, kept in memory for the life of the process.
///
/// Each method holds the lock for a single read-modify-write, so a handler
/// that `take`s a state is the only one that will ever see it.
#[derive(Clone, Default)]
pub struct ConversationStore {
    slots: Arc<Mutex<HashMap<ChatId, Slot>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn get(&self, chat: ChatId) -> Conversation {
        self.slots
            .lock()
            .await
            .get(&chat)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Applies `transition` and returns the resulting state. An explicit
    /// `Reset` always moves the epoch, even from Idle, so work started from a
    /// state that was already taken still sees the cancellation.
    pub async fn apply(&self, chat: ChatId, transition: Transition) -> Conversation {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(chat).or_default();
        let next = slot.state.apply(transition);
        if transition == Transition::Reset {
            slot.state = next;
            slot.epoch += 1;
        } else {
            Self::store(slot, next);
        }
        next
    }

    /// Clears the chat's state and hands back what it was, along with the
    /// epoch right after the clear.
    pub async fn take_with_epoch(&self, chat: ChatId) -> (Conversation, u64) {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(&chat) {
            Some(slot) => {
                let previous = slot.state;
                Self::store(slot, Conversation::Idle);
                (previous, slot.epoch)
            }
            None => (Conversation::Idle, 0),
        }
    }

    /// Puts a state back after a `take_with_epoch`, e.g. when the input has to be re-prompted.
    pub async fn restore(&self, chat: ChatId, state: Conversation) {
        let mut slots = self.slots.lock().await;
        Self::store(slots.entry(chat).or_default(), state);
    }

    /// Changes whenever the chat moves to a different flow. Long-running work
    /// compares epochs to tell whether its result is still wanted.
    pub async fn epoch(&self, chat: ChatId) -> u64 {
        self.slots
            .lock()
            .await
            .get(&chat)
            .map(|s| s.epoch)
            .unwrap_or_default()
    }

    fn store(slot: &mut Slot, next: Conversation) {
        if slot.state != next {
            slot.state = next;
            slot.epoch += 1;
        }
    }
}
