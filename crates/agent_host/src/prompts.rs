//! Turns a user message (and, in history-aware mode, the conversation so far)
//! into a model request.

use shared::agent_api::{ChatMessage, InferenceRequest};
use shared::conversation::Exchange;
use shared::settings::{ChatSettings, PromptMode};

/// Flattened prompt used with `/api/generate`
pub fn single_shot_prompt(system_prompt: &str, message: &str) -> String {
    format!("System: {}\nUser: {}\nAssistant:", system_prompt, message)
}

/// System instruction, the last `window` exchanges, then the new message
pub fn history_messages(
    system_prompt: &str,
    history: &[Exchange],
    message: &str,
    window: usize,
) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(window);
    let mut messages = Vec::with_capacity(2 + 2 * (history.len() - start));
    messages.push(ChatMessage::system(system_prompt));
    for exchange in &history[start..] {
        messages.push(ChatMessage::user(exchange.user.clone()));
        messages.push(ChatMessage::assistant(exchange.bot.clone()));
    }
    messages.push(ChatMessage::user(message));
    messages
}

pub fn build_request(settings: &ChatSettings, history: &[Exchange], message: &str) -> InferenceRequest {
    match settings.prompt_mode {
        PromptMode::SingleShot => {
            InferenceRequest::Prompt(single_shot_prompt(&settings.system_prompt, message))
        }
        PromptMode::HistoryAware => InferenceRequest::Chat(history_messages(
            &settings.system_prompt,
            history,
            message,
            settings.history_window,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shot_prompt_format() {
        assert_eq!(
            single_shot_prompt("Be brief.", "hello"),
            "System: Be brief.\nUser: hello\nAssistant:"
        );
    }

    #[test]
    fn test_history_messages_order() {
        let history = vec![Exchange::new("q1", "a1"), Exchange::new("q2", "a2")];
        let messages = history_messages("sys", &history, "q3", 10);
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "user", "assistant", "user"]
        );
        assert_eq!(messages[1].content, "q1");
        assert_eq!(messages[4].content, "a2");
        assert_eq!(messages[5].content, "q3");
    }

    #[test]
    fn test_history_window_keeps_latest() {
        let history: Vec<_> = (0..5)
            .map(|i| Exchange::new(format!("q{}", i), format!("a{}", i)))
            .collect();
        let messages = history_messages("sys", &history, "next", 2);
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[1].content, "q3");
    }

    #[test]
    fn test_build_request_by_mode() {
        let history = vec![Exchange::new("q", "a")];
        let mut settings = ChatSettings {
            prompt_mode: PromptMode::SingleShot,
            system_prompt: "sys".into(),
            ..ChatSettings::default()
        };
        assert_eq!(
            build_request(&settings, &history, "hi"),
            InferenceRequest::Prompt("System: sys\nUser: hi\nAssistant:".into())
        );

        settings.prompt_mode = PromptMode::HistoryAware;
        match build_request(&settings, &history, "hi") {
            InferenceRequest::Chat(messages) => assert_eq!(messages.len(), 4),
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
