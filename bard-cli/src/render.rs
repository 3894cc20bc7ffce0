//! Plain-text rendering of threads and messages.

use shared::models::{Message, SessionIdentity, ThreadSummary};

/// The line shown above an empty thread.
pub fn greeting(username: &str) -> String {
    format!("Hi {username}, how may I help you today?")
}

/// One thread list row. `*` marks the open thread; unsaved threads say so.
pub fn thread_line(thread: &ThreadSummary, current: Option<SessionIdentity>) -> String {
    let marker = if Some(thread.id) == current { '*' } else { ' ' };
    let suffix = if thread.is_pending_local {
        " (not saved yet)"
    } else {
        ""
    };
    format!("{marker} {}  {}{suffix}", thread.id, thread.title)
}

/// A message as a header line (author and time) followed by its content.
pub fn message_block(message: &Message) -> String {
    format!(
        "{} [{}]\n{}\n",
        message.display_name, message.created_at, message.content
    )
}

/// Turns successive message log snapshots into the text to append to the terminal.
///
/// Follows the first assistant message that appears after the first `skip` entries. The
/// prefix is emitted once, when that message shows up; after that only the part of its
/// content not printed yet is yielded.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    skip: usize,
    prefix: String,
    id: Option<String>,
    printed: usize,
}

impl ReplyPrinter {
    /// Ignores the first `skip` entries, which were in the log before the submission.
    pub fn new(skip: usize, prefix: impl Into<String>) -> Self {
        Self {
            skip,
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Whether the reply has appeared, and with it the prefix.
    pub fn started(&self) -> bool {
        self.id.is_some()
    }

    /// Text to print for this snapshot, or `None` when nothing changed.
    pub fn observe(&mut self, log: &[Message]) -> Option<String> {
        let mut out = String::new();
        if self.id.is_none() {
            self.id = log
                .get(self.skip..)?
                .iter()
                .find(|message| !message.is_user())
                .map(|message| message.id.clone());
            if self.id.is_none() {
                return None;
            }
            out.push_str(&self.prefix);
        }

        let content = self
            .id
            .as_deref()
            .and_then(|id| log.iter().find(|message| message.id == id))
            .map(|message| message.content.as_str());
        if let Some(content) = content
            && let Some(delta) = content.get(self.printed..)
            && !delta.is_empty()
        {
            out.push_str(delta);
            self.printed = content.len();
        }

        (!out.is_empty()).then_some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_content(mut message: Message, content: &str) -> Message {
        message.content = content.to_string();
        message
    }

    #[test]
    fn greeting_names_the_user() {
        assert_eq!(greeting("Ada"), "Hi Ada, how may I help you today?");
    }

    #[test]
    fn thread_line_marks_current_and_pending() {
        let id = SessionIdentity::generate();
        let pending = ThreadSummary::pending(id, "Ada");

        let line = thread_line(&pending, Some(id));

        assert!(line.starts_with('*'));
        assert!(line.contains("New Thread (not saved yet)"));
        assert!(line.contains(&id.to_string()));
        assert!(thread_line(&pending, None).starts_with(' '));
    }

    const PREFIX: &str = "Bard: ";

    #[test]
    fn printer_emits_only_new_text() {
        let user = Message::user("Hello", "Ada");
        let placeholder = Message::assistant_placeholder();
        let mut printer = ReplyPrinter::new(0, PREFIX);

        assert_eq!(printer.observe(&[user.clone()]), None);
        assert!(!printer.started());
        assert_eq!(
            printer.observe(&[user.clone(), placeholder.clone()]),
            Some(PREFIX.to_string())
        );
        assert!(printer.started());
        assert_eq!(printer.observe(&[user.clone(), placeholder.clone()]), None);
        assert_eq!(
            printer.observe(&[user.clone(), with_content(placeholder.clone(), "Hi")]),
            Some("Hi".to_string())
        );
        assert_eq!(
            printer.observe(&[user.clone(), with_content(placeholder.clone(), "Hi there")]),
            Some(" there".to_string())
        );
        assert_eq!(
            printer.observe(&[user, with_content(placeholder, "Hi there")]),
            None
        );
    }

    #[test]
    fn printer_ignores_earlier_history() {
        let old_reply = with_content(Message::assistant_placeholder(), "old");
        let user = Message::user("Hello", "Ada");
        let placeholder = with_content(Message::assistant_placeholder(), "new");
        let mut printer = ReplyPrinter::new(1, PREFIX);

        let delta = printer.observe(&[old_reply, user, placeholder]);

        assert_eq!(delta.as_deref(), Some("Bard: new"));
    }

    #[test]
    fn printer_stops_when_reply_disappears() {
        let user = Message::user("Hello", "Ada");
        let placeholder = with_content(Message::assistant_placeholder(), "Hi");
        let mut printer = ReplyPrinter::new(0, PREFIX);
        printer.observe(&[user.clone(), placeholder]);

        assert_eq!(printer.observe(&[user]), None);
    }

    #[test]
    fn printer_stays_silent_without_a_reply() {
        let user = Message::user("Hello", "Ada");
        let mut printer = ReplyPrinter::new(0, PREFIX);

        assert_eq!(printer.observe(&[]), None);
        assert_eq!(printer.observe(&[user]), None);
        assert!(!printer.started());
    }
}
