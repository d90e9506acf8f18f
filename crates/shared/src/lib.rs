pub mod error;

pub use error::{ChatError, ChatResult};

pub mod settings {
    use serde::{Deserialize, Serialize};
    use std::env;

    fn default_true() -> bool {
        true
    }

    fn default_base_url() -> String {
        "http://127.0.0.1:11434".to_string()
    }

    fn default_model() -> String {
        "deepseek-r1:1.5b".to_string()
    }

    fn default_system_prompt() -> String {
        "You are a helpful assistant.".to_string()
    }

    fn default_history_window() -> usize {
        20
    }

    fn default_timeout_secs() -> u64 {
        120
    }

    /// How a user message is turned into a model request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "kebab-case")]
    pub enum PromptMode {
        /// One flattened prompt string per message, no history (`/api/generate`)
        SingleShot,
        /// System instruction plus the conversation so far (`/api/chat`)
        #[default]
        HistoryAware,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatSettings {
        #[serde(default = "default_base_url")]
        pub base_url: String,
        #[serde(default = "default_model")]
        pub model: String, // e.g., "deepseek-r1:1.5b"
        #[serde(default)]
        pub prompt_mode: PromptMode,
        #[serde(default = "default_true")]
        pub stream: bool,
        #[serde(default = "default_system_prompt")]
        pub system_prompt: String,
        /// Most recent exchanges replayed in history-aware mode
        #[serde(default = "default_history_window")]
        pub history_window: usize,
        #[serde(default = "default_timeout_secs")]
        pub request_timeout_secs: u64,
        /// Overrides the location of the persisted conversation blob
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub store_path: Option<String>,
    }

    impl ChatSettings {
        /// Apply environment overrides (`OLLAMA_BASE_URL`, `OLLAMA_MODEL`)
        pub fn with_env_overrides(mut self) -> Self {
            if let Ok(base) = env::var("OLLAMA_BASE_URL") {
                if !base.trim().is_empty() {
                    self.base_url = base.trim().trim_end_matches('/').to_string();
                }
            }
            if let Ok(model) = env::var("OLLAMA_MODEL") {
                if !model.trim().is_empty() {
                    self.model = model.trim().to_string();
                }
            }
            self
        }
    }

    impl Default for ChatSettings {
        fn default() -> Self {
            Self {
                base_url: default_base_url(),
                model: default_model(),
                prompt_mode: PromptMode::default(),
                stream: true,
                system_prompt: default_system_prompt(),
                history_window: default_history_window(),
                request_timeout_secs: default_timeout_secs(),
                store_path: None,
            }
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".to_string(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".to_string(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".to_string(),
                content: content.into(),
            }
        }
    }

    /// What gets sent to the inference endpoint
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum InferenceRequest {
        /// Flattened prompt for `/api/generate`
        Prompt(String),
        /// Role-tagged message list for `/api/chat`
        Chat(Vec<ChatMessage>),
    }

    /// One item of a streamed reply
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StreamChunk {
        Text(String),
        Done,
        Error(String),
    }
}

pub mod conversation {
    use serde::{Deserialize, Serialize};

    /// Name of the folder every user always has
    pub const GENERAL_FOLDER: &str = "General";

    /// Name given to the conversation auto-created inside a new folder
    pub const DEFAULT_CONVERSATION: &str = "New conversation";

    /// One user turn and the visible (filtered) model reply
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Exchange {
        pub user: String,
        pub bot: String,
    }

    impl Exchange {
        pub fn new(user: impl Into<String>, bot: impl Into<String>) -> Self {
            Self {
                user: user.into(),
                bot: bot.into(),
            }
        }
    }
}
