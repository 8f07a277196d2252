//! Generation settings commands and backend listings

use super::CommandResult;
use neethi_api::{GenerationOptions, ModelInfo, ProviderStatus, SystemPrompt};
use neethi_chat::{ChatSession, Preferences};

pub struct ModelCommand;

impl ModelCommand {
    pub fn set_model(args: &str, session: &ChatSession) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!(
                "Current model: {}\nUse /models to list available models",
                session.options().model
            ));
        }
        update(session, |prefs| prefs.model = Some(args.to_string()));
        CommandResult::Message(format!("Switched to: {}", args))
    }

    pub fn set_provider(args: &str, session: &ChatSession) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!(
                "Current provider: {}",
                session.options().provider
            ));
        }
        update(session, |prefs| prefs.provider = Some(args.to_string()));
        CommandResult::Message(format!("Provider set to: {}", args))
    }

    pub fn set_temperature(args: &str, session: &ChatSession) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!(
                "Temperature: {}",
                session.options().temperature
            ));
        }
        match args.parse::<f32>() {
            Ok(value) if value.is_finite() && value >= 0.0 => {
                update(session, |prefs| prefs.temperature = Some(value));
                CommandResult::Message(format!("Temperature set to: {}", value))
            }
            _ => CommandResult::Message(format!("Invalid temperature '{}'", args)),
        }
    }

    pub fn set_max_tokens(args: &str, session: &ChatSession) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(format!(
                "Max tokens: {}",
                session.options().max_tokens
            ));
        }
        match args.parse::<u32>() {
            Ok(value) if value > 0 => {
                update(session, |prefs| prefs.max_tokens = Some(value));
                CommandResult::Message(format!("Max tokens set to: {}", value))
            }
            _ => CommandResult::Message(format!("Invalid token limit '{}'", args)),
        }
    }

    pub fn set_prompt(args: &str, session: &ChatSession) -> CommandResult {
        match args {
            "" => CommandResult::Message(format!(
                "System prompt: {}",
                session
                    .options()
                    .system_prompt_id
                    .unwrap_or_else(|| "none".to_string())
            )),
            "none" => {
                update(session, |prefs| prefs.system_prompt_id = None);
                CommandResult::Message("System prompt cleared".to_string())
            }
            id => {
                update(session, |prefs| prefs.system_prompt_id = Some(id.to_string()));
                CommandResult::Message(format!("System prompt set to: {}", id))
            }
        }
    }

    /// List models as text, marking the one in use
    pub fn list_models_text(current: &GenerationOptions, models: &[ModelInfo]) -> String {
        if models.is_empty() {
            return "No models available".to_string();
        }

        let mut output = String::from("Available models:\n");

        // Group by provider, keeping the backend's order
        let mut providers: Vec<&str> = Vec::new();
        for model in models {
            if !providers.contains(&model.provider.as_str()) {
                providers.push(&model.provider);
            }
        }

        for provider in providers {
            output.push_str(&format!("\n{}:\n", provider));
            for model in models.iter().filter(|m| m.provider == provider) {
                let marker = if model.name == current.model && model.provider == current.provider {
                    " *"
                } else {
                    ""
                };
                let unavailable = if model.available { "" } else { " (unavailable)" };
                output.push_str(&format!("  {}{}{}\n", model.name, marker, unavailable));
            }
        }

        output.push_str("\nSwitch with: /model <name>");
        output
    }

    pub fn provider_status_text(statuses: &[ProviderStatus]) -> String {
        if statuses.is_empty() {
            return "No providers reported".to_string();
        }
        let mut output = String::from("Providers:\n");
        for status in statuses {
            let state = if status.available { "up" } else { "down" };
            output.push_str(&format!(
                "  {:<12} {:<4} {} model(s)",
                status.provider,
                state,
                status.models.len()
            ));
            if let Some(ref error) = status.error {
                output.push_str(&format!(" - {}", error));
            }
            output.push('\n');
        }
        output.trim_end().to_string()
    }

    pub fn list_prompts_text(current: Option<&str>, prompts: &[SystemPrompt]) -> String {
        if prompts.is_empty() {
            return "No system prompts".to_string();
        }
        let mut output = String::from("System prompts:\n");
        for prompt in prompts {
            let id = prompt.id.as_deref().unwrap_or("-");
            let marker = if prompt.id.as_deref() == current { " *" } else { "" };
            let default = if prompt.is_default { " (default)" } else { "" };
            output.push_str(&format!("  {:<16} {}{}{}\n", id, prompt.name, default, marker));
        }
        output.push_str("\nSelect with: /prompt <id>");
        output
    }
}

fn update(session: &ChatSession, change: impl FnOnce(&mut Preferences)) {
    let mut preferences = session.preferences();
    change(&mut preferences);
    session.set_preferences(preferences);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{execute_command, tests::offline_session};

    fn model(name: &str, provider: &str, available: bool) -> ModelInfo {
        ModelInfo {
            name: name.into(),
            provider: provider.into(),
            description: None,
            context_length: None,
            available,
        }
    }

    #[test]
    fn test_settings_update_preferences() {
        let session = offline_session();
        execute_command("/model llama3", &session);
        execute_command("/provider ollama", &session);
        execute_command("/temp 0.2", &session);
        execute_command("/tokens 256", &session);
        execute_command("/prompt coder", &session);

        let options = session.options();
        assert_eq!(options.model, "llama3");
        assert_eq!(options.provider, "ollama");
        assert_eq!(options.temperature, 0.2);
        assert_eq!(options.max_tokens, 256);
        assert_eq!(options.system_prompt_id.as_deref(), Some("coder"));

        execute_command("/prompt none", &session);
        assert!(session.options().system_prompt_id.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let session = offline_session();
        let before = session.options();
        execute_command("/temp hot", &session);
        execute_command("/temp -1", &session);
        execute_command("/tokens 0", &session);
        assert_eq!(session.options(), before);
    }

    #[test]
    fn test_list_models_marks_current() {
        let current = GenerationOptions::default();
        let models = vec![
            model("qwen/qwen3-4b", "llamacpp", true),
            model("llama3", "ollama", false),
        ];
        let text = ModelCommand::list_models_text(&current, &models);
        assert!(text.contains("llamacpp:\n  qwen/qwen3-4b *\n"));
        assert!(text.contains("llama3 (unavailable)"));
        assert_eq!(
            ModelCommand::list_models_text(&current, &[]),
            "No models available"
        );
    }

    #[test]
    fn test_provider_status_text() {
        let statuses = vec![ProviderStatus {
            provider: "ollama".into(),
            available: false,
            models: vec![],
            error: Some("connection refused".into()),
        }];
        let text = ModelCommand::provider_status_text(&statuses);
        assert!(text.contains("ollama"));
        assert!(text.contains("down"));
        assert!(text.ends_with("connection refused"));
    }

    #[test]
    fn test_list_prompts_marks_selected() {
        let mut prompt = SystemPrompt::new("Coder", "You write code.");
        prompt.id = Some("coder".into());
        let text = ModelCommand::list_prompts_text(Some("coder"), &[prompt]);
        assert!(text.contains("Coder *"));
    }
}
