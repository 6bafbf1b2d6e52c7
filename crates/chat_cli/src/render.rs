use std::collections::HashSet;

use chat_backend::{Message, Profile};
use chat_sync::ConversationView;

/// One transcript line: `HH:MM [AN] ann (you): text`.
#[must_use]
pub fn format_message(view: &ConversationView, message: &Message) -> String {
    let author = message
        .author
        .as_ref()
        .map_or("unknown", |author| author.username.as_str());
    let own = if view.is_own(message) { " (you)" } else { "" };
    format!(
        "{:02}:{:02} [{}] {author}{own}: {}",
        message.created_at.hour(),
        message.created_at.minute(),
        message.author_initials(),
        message.text,
    )
}

#[must_use]
pub fn format_profile(profile: &Profile) -> String {
    format!(
        "id:       {}\nusername: {}\nemail:    {}\njoined:   {}",
        profile.id,
        profile.username,
        profile.email.as_deref().unwrap_or("-"),
        profile.created_at.date(),
    )
}

/// Tracks which message ids were already printed so each is printed once.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: HashSet<u64>,
}

impl Transcript {
    /// Lines for messages in `view` not printed before, in view order.
    pub fn new_lines(&mut self, view: &ConversationView) -> Vec<String> {
        view.messages()
            .iter()
            .filter(|message| self.printed.insert(message.id))
            .map(|message| format_message(view, message))
            .collect()
    }
}
