//! Terminal rendering of transcripts and streamed replies.

use agent_host::{SessionContext, StreamObserver};
use shared::conversation::Exchange;
use std::io::Write;

/// Prints streamed text as it arrives, plus a one-line thinking indicator
pub struct TerminalObserver<W: Write> {
    out: W,
    printed: usize,
    indicator_visible: bool,
}

impl<W: Write> TerminalObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            indicator_visible: false,
        }
    }

    /// Whether any reply text was written
    pub fn wrote_text(&self) -> bool {
        self.printed > 0
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StreamObserver for TerminalObserver<W> {
    fn on_partial(&mut self, text: &str, _thinking: bool) {
        // The visible buffer only ever grows, so print the new tail
        if let Some(delta) = text.get(self.printed..) {
            if !delta.is_empty() {
                let _ = write!(self.out, "{}", delta);
                let _ = self.out.flush();
                self.printed = text.len();
            }
        }
    }

    fn on_thinking_started(&mut self) {
        if self.printed > 0 {
            let _ = writeln!(self.out);
        }
        let _ = write!(self.out, "⏳ Thinking...");
        let _ = self.out.flush();
        self.indicator_visible = true;
    }

    fn on_thinking_finished(&mut self) {
        if self.indicator_visible {
            // Clear the indicator line
            let _ = write!(self.out, "\r\x1b[2K");
            let _ = self.out.flush();
            self.indicator_visible = false;
        }
    }
}

pub fn format_history(exchanges: &[Exchange]) -> String {
    if exchanges.is_empty() {
        return "No messages in this conversation yet.".to_string();
    }
    exchanges
        .iter()
        .map(|e| format!("You: {}\nChatbot: {}\n---", e.user, e.bot))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Marks `current` in a list of names
pub fn format_names(names: &[String], current: &str) -> String {
    names
        .iter()
        .map(|n| {
            if n == current {
                format!("* {}", n)
            } else {
                format!("  {}", n)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn prompt_label(context: &SessionContext) -> String {
    match &context.username {
        Some(user) => format!("[{} · {} / {}] > ", user, context.folder, context.conversation),
        None => "[not logged in] > ".to_string(),
    }
}
