//! Client configuration from the environment

use crate::session::SessionConfig;

const DEFAULT_API_URL: &str = "https://api.dify.ai/v1";
const DEFAULT_USER: &str = "phoenix-chat";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub app_id: Option<String>,
    /// End-user identifier sent with every request
    pub user: String,
    pub db_path: String,
    pub greeting: Option<String>,
    /// Print the prompt variables and introduction at startup
    pub show_prompt: bool,
    pub conversation_limit: u32,
    pub rename_threshold: u32,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| {
            lookup(&format!("PHOENIX_CHAT_{name}")).filter(|value| !value.trim().is_empty())
        };
        let db_path = var("DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.phoenix-chat/state.db")
        });
        let defaults = SessionConfig::default();

        Self {
            api_url: var("API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: var("API_KEY"),
            app_id: var("APP_ID"),
            user: var("USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            db_path,
            greeting: var("GREETING"),
            show_prompt: var("SHOW_PROMPT").is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            conversation_limit: var("CONVERSATION_LIMIT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.conversation_limit),
            rename_threshold: var("RENAME_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rename_threshold),
        }
    }

    /// Why the app cannot start, if it cannot
    pub fn unavailable_reason(&self) -> Option<String> {
        let missing: Vec<&str> = [
            ("PHOENIX_CHAT_API_KEY", self.api_key.is_none()),
            ("PHOENIX_CHAT_APP_ID", self.app_id.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();
        (!missing.is_empty()).then(|| format!("Missing configuration: {}", missing.join(", ")))
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            app_id: self.app_id.clone().unwrap_or_default(),
            greeting: self.greeting.clone().unwrap_or(defaults.greeting),
            conversation_limit: self.conversation_limit,
            rename_threshold: self.rename_threshold,
            ..defaults
        }
    }
}
