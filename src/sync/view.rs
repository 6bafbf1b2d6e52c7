use std::collections::HashSet;

use chat_backend::{Author, Message};

/// How a poll's window is merged with messages this client just sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    /// Every poll replaces the view wholesale. A just-sent message can
    /// disappear until a later window includes it.
    #[default]
    ReplaceWindow,
    /// Sent messages missing from a poll stay at the end of the view until
    /// `grace_polls` successful polls have omitted them.
    RetainPending { grace_polls: u32 },
}

/// Ordered messages in server order plus the inferred actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationView {
    messages: Vec<Message>,
    actor: Option<Author>,
}

impl ConversationView {
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn actor(&self) -> Option<&Author> {
        self.actor.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.messages.iter().any(|message| message.id == id)
    }

    /// Whether `message` was written by the inferred actor.
    #[must_use]
    pub fn is_own(&self, message: &Message) -> bool {
        match (&self.actor, message.author_id()) {
            (Some(actor), Some(author_id)) => actor.id == author_id,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingMessage {
    message: Message,
    misses: u32,
}

/// What a merge changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct MergeOutcome {
    pub(crate) actor: Option<Author>,
}

/// The view plus the bookkeeping the reconcile policy needs.
#[derive(Debug, Default)]
pub(crate) struct Conversation {
    view: ConversationView,
    pending: Vec<PendingMessage>,
    policy: ReconcilePolicy,
}

impl Conversation {
    pub(crate) fn new(policy: ReconcilePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub(crate) fn view(&self) -> &ConversationView {
        &self.view
    }

    #[cfg(test)]
    fn pending_ids(&self) -> Vec<u64> {
        self.pending.iter().map(|pending| pending.message.id).collect()
    }

    /// Replaces the view with a fetched window, first occurrence of an id winning.
    ///
    /// `infer_actor` gates adopting the first author in the batch when the
    /// actor is still unknown.
    pub(crate) fn replace(&mut self, fetched: Vec<Message>, infer_actor: bool) -> MergeOutcome {
        let mut seen = HashSet::with_capacity(fetched.len());
        let mut messages: Vec<Message> = fetched
            .into_iter()
            .filter(|message| seen.insert(message.id))
            .collect();

        match self.policy {
            ReconcilePolicy::ReplaceWindow => self.pending.clear(),
            ReconcilePolicy::RetainPending { grace_polls } => {
                self.pending.retain_mut(|pending| {
                    if seen.contains(&pending.message.id) {
                        return false;
                    }
                    pending.misses += 1;
                    pending.misses < grace_polls
                });
                messages.extend(self.pending.iter().map(|pending| pending.message.clone()));
            }
        }

        self.view.messages = messages;

        let mut outcome = MergeOutcome::default();
        if infer_actor && self.view.actor.is_none() {
            if let Some(author) = self
                .view
                .messages
                .iter()
                .find_map(|message| message.author.clone())
            {
                self.view.actor = Some(author.clone());
                outcome.actor = Some(author);
            }
        }
        outcome
    }

    /// Appends a message this client sent. Returns `None` when the id is already shown.
    pub(crate) fn append_sent(&mut self, message: Message) -> Option<MergeOutcome> {
        if self.view.contains(message.id) {
            return None;
        }

        let mut outcome = MergeOutcome::default();
        if self.view.actor.is_none() {
            if let Some(author) = message.author.clone() {
                self.view.actor = Some(author.clone());
                outcome.actor = Some(author);
            }
        }

        if let ReconcilePolicy::RetainPending { grace_polls } = self.policy {
            if grace_polls > 0 {
                self.pending.push(PendingMessage {
                    message: message.clone(),
                    misses: 0,
                });
            }
        }
        self.view.messages.push(message);
        Some(outcome)
    }
}
