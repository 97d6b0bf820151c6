//! Telegram delivery and the admin chat.

use super::{VarSource, process_env, read_string};

#[derive(Debug, Clone)]
pub struct NotifierEnvConfig {
    /// Unset means notifications are only logged
    pub bot_token: Option<String>,
    pub api_url: String,
    /// Unset means admin alerts are only logged
    pub admin_chat_id: Option<i64>,
}

impl Default for NotifierEnvConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: "https://api.telegram.org".to_string(),
            admin_chat_id: None,
        }
    }
}

impl NotifierEnvConfig {
    pub fn from_env() -> Self {
        Self::from_vars(&process_env)
    }

    pub(crate) fn from_vars(vars: VarSource<'_>) -> Self {
        let d = Self::default();
        Self {
            bot_token: vars("TELEGRAM_BOT_TOKEN")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            api_url: read_string(vars, "TELEGRAM_API_URL", &d.api_url),
            admin_chat_id: vars("ADMIN_CHAT_ID").and_then(|raw| raw.trim().parse::<i64>().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::vars;

    #[test]
    fn test_blank_token_is_unset() {
        let config = NotifierEnvConfig::from_vars(&vars(&[
            ("TELEGRAM_BOT_TOKEN", "  "),
            ("ADMIN_CHAT_ID", "-100123"),
        ]));
        assert!(config.bot_token.is_none());
        assert_eq!(config.admin_chat_id, Some(-100123));
    }
}
