//! Slash commands for interactive mode

mod conversation;
mod model;

pub use conversation::ConversationCommand;
pub use model::ModelCommand;

use neethi_chat::ChatSession;

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Show a message to the user (not sent to the backend)
    Message(String),
    /// Regenerate the last reply
    Regenerate,
    /// Fetch and list the backend's models
    ListModels,
    /// Fetch and list the backend's system prompts
    ListPrompts,
    /// Fetch and show provider availability
    ProviderStatus,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command.
///
/// Commands that only touch local state run here; the rest are returned
/// for the caller to run against the backend.
pub fn execute_command(input: &str, session: &ChatSession) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "new" | "n" => ConversationCommand::new_conversation(session),

        "list" | "ls" | "l" => ConversationCommand::list(session),

        "switch" | "s" => ConversationCommand::switch(args, session),

        "delete" | "del" | "d" => ConversationCommand::delete(args, session),

        "rename" | "r" => ConversationCommand::rename(args, session),

        "clear" => ConversationCommand::clear(args, session),

        "info" | "i" => ConversationCommand::info(session),

        "regen" | "regenerate" => CommandResult::Regenerate,

        "models" => CommandResult::ListModels,

        "providers" => CommandResult::ProviderStatus,

        "prompts" => CommandResult::ListPrompts,

        "model" | "m" => ModelCommand::set_model(args, session),

        "provider" => ModelCommand::set_provider(args, session),

        "temp" | "temperature" | "t" => ModelCommand::set_temperature(args, session),

        "tokens" => ModelCommand::set_max_tokens(args, session),

        "prompt" => ModelCommand::set_prompt(args, session),

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

pub fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /new, /n               Start a new conversation
  /list, /l              List conversations
  /switch, /s <n|id>     Switch to a conversation by number or id prefix
  /delete, /d [n|id]     Delete a conversation (the active one by default)
  /rename, /r <title>    Rename the active conversation
  /clear all             Delete every conversation and stored preference
  /info, /i              Show the active conversation and generation settings
  /regen                 Regenerate the last reply
  /models                List models offered by the backend
  /providers             Show provider availability
  /prompts               List system prompts known to the backend
  /model, /m <name>      Use a model for new requests
  /provider <name>       Use a provider for new requests
  /temp, /t <value>      Set the sampling temperature
  /tokens <n>            Set the response length limit
  /prompt <id|none>      Request a system prompt by id
  /quit, /exit, /q       Exit neethi

Ctrl-C aborts a reply that is still streaming."#
        .to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use neethi_api::{ChatClient, GenerationOptions};
    use neethi_chat::LocalStorage;
    use std::sync::Arc;

    /// A session whose transport is never reached by local commands
    pub(crate) fn offline_session() -> ChatSession {
        ChatSession::new(
            Arc::new(ChatClient::new("http://127.0.0.1:9")),
            LocalStorage::in_memory(),
            GenerationOptions::default(),
        )
    }

    #[test]
    fn test_non_commands_pass_through() {
        let session = offline_session();
        assert!(execute_command("hello there", &session).is_none());
        assert!(execute_command("  what is /help?", &session).is_none());
    }

    #[test]
    fn test_command_parsing() {
        let session = offline_session();
        assert_eq!(execute_command("/quit", &session), Some(CommandResult::Exit));
        assert_eq!(execute_command("  /Q  ", &session), Some(CommandResult::Exit));
        assert_eq!(execute_command("/regen", &session), Some(CommandResult::Regenerate));
        assert_eq!(execute_command("/models", &session), Some(CommandResult::ListModels));
        assert_eq!(
            execute_command("/frobnicate now", &session),
            Some(CommandResult::Unknown("frobnicate".into()))
        );
    }

    #[test]
    fn test_help_lists_commands() {
        let session = offline_session();
        let Some(CommandResult::Message(text)) = execute_command("/help", &session) else {
            panic!("expected help text");
        };
        assert!(text.contains("/regen"));
        assert!(text.contains("/switch"));
    }
}
