//! Conversation commands - new, list, switch, delete, rename, clear, info

use super::CommandResult;
use crate::utils::{preview, short_id};
use neethi_chat::{ChatSession, Conversation};

pub struct ConversationCommand;

impl ConversationCommand {
    pub fn new_conversation(session: &ChatSession) -> CommandResult {
        let id = session.create_new_conversation();
        CommandResult::Message(format!("Started a new conversation ({})", short_id(&id)))
    }

    pub fn list(session: &ChatSession) -> CommandResult {
        CommandResult::Message(list_conversations(
            &session.conversations(),
            session.active_id().as_deref(),
        ))
    }

    pub fn switch(args: &str, session: &ChatSession) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /switch <number|id>".to_string());
        }
        let conversations = session.conversations();
        match resolve(args, &conversations) {
            Some(conversation) if session.switch_conversation(&conversation.id) => {
                CommandResult::Message(format!("Switched to: {}", conversation.title))
            }
            _ => not_found(args),
        }
    }

    pub fn delete(args: &str, session: &ChatSession) -> CommandResult {
        let conversations = session.conversations();
        let target = if args.is_empty() {
            session
                .active_id()
                .and_then(|id| conversations.iter().find(|c| c.id == id))
        } else {
            resolve(args, &conversations)
        };
        let Some(conversation) = target else {
            return if args.is_empty() {
                CommandResult::Message("No active conversation".to_string())
            } else {
                not_found(args)
            };
        };

        session.delete_conversation(&conversation.id);
        CommandResult::Message(format!("Deleted: {}", conversation.title))
    }

    pub fn rename(args: &str, session: &ChatSession) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message("Usage: /rename <title>".to_string());
        }
        match session.active_id() {
            Some(id) if session.rename_conversation(&id, args) => {
                CommandResult::Message(format!("Renamed to: {}", args))
            }
            _ => CommandResult::Message("No active conversation".to_string()),
        }
    }

    /// Requires an explicit `all` so a stray `/clear` cannot wipe history
    pub fn clear(args: &str, session: &ChatSession) -> CommandResult {
        if args != "all" {
            return CommandResult::Message(
                "This deletes every conversation. Confirm with: /clear all".to_string(),
            );
        }
        session.clear_conversations();
        CommandResult::Message("All conversations cleared".to_string())
    }

    pub fn info(session: &ChatSession) -> CommandResult {
        let options = session.options();
        let mut output = String::new();

        match session.active_conversation() {
            Some(conversation) => {
                output.push_str(&format!(
                    "Conversation: {} ({})\n",
                    conversation.title,
                    short_id(&conversation.id)
                ));
                output.push_str(&format!(
                    "Messages:     {}\n",
                    conversation.messages.len()
                ));
                output.push_str(&format!(
                    "Updated:      {}\n",
                    conversation.updated_at.format("%Y-%m-%d %H:%M")
                ));
            }
            None => output.push_str("Conversation: none\n"),
        }
        output.push('\n');
        output.push_str(&format!("Model:        {}\n", options.model));
        output.push_str(&format!("Provider:     {}\n", options.provider));
        output.push_str(&format!("Temperature:  {}\n", options.temperature));
        output.push_str(&format!("Max tokens:   {}\n", options.max_tokens));
        if let Some(ref prompt) = options.system_prompt_id {
            output.push_str(&format!("Prompt:       {}\n", prompt));
        }
        if let Some(error) = session.last_error() {
            output.push_str(&format!("\nLast error:   {}\n", error));
        }

        CommandResult::Message(output.trim_end().to_string())
    }
}

/// Find a conversation by its 1-based position in the listing or an id prefix
fn resolve<'a>(arg: &str, conversations: &'a [Conversation]) -> Option<&'a Conversation> {
    if let Ok(index) = arg.parse::<usize>() {
        return index.checked_sub(1).and_then(|i| conversations.get(i));
    }
    let mut matches = conversations.iter().filter(|c| c.id.starts_with(arg));
    let first = matches.next()?;
    // Ambiguous prefixes match nothing
    matches.next().is_none().then_some(first)
}

fn not_found(arg: &str) -> CommandResult {
    CommandResult::Message(format!(
        "No conversation matching '{}'\nUse /list to see conversations",
        arg
    ))
}

fn list_conversations(conversations: &[Conversation], active: Option<&str>) -> String {
    if conversations.is_empty() {
        return "No conversations yet".to_string();
    }

    let mut output = String::from("Conversations:\n");
    for (i, conversation) in conversations.iter().enumerate() {
        let marker = if Some(conversation.id.as_str()) == active {
            "*"
        } else {
            " "
        };
        output.push_str(&format!(
            "{} {:>2}. {} [{}] {} message(s)",
            marker,
            i + 1,
            conversation.title,
            short_id(&conversation.id),
            conversation.messages.len()
        ));
        if let Some(last) = conversation.messages.last() {
            output.push_str(&format!(" - {}", preview(&last.content, 40)));
        }
        output.push('\n');
    }
    output.push_str("\nSwitch with: /switch <number>");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{execute_command, tests::offline_session};

    fn message(result: Option<CommandResult>) -> String {
        match result {
            Some(CommandResult::Message(text)) => text,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn test_new_and_list() {
        let session = offline_session();
        assert_eq!(message(execute_command("/list", &session)), "No conversations yet");

        execute_command("/new", &session);
        execute_command("/new", &session);
        let listing = message(execute_command("/list", &session));
        assert!(listing.contains(" 1. New Chat"));
        assert!(listing.contains("*  2. New Chat"));
    }

    #[test]
    fn test_switch_by_number_and_prefix() {
        let session = offline_session();
        let first = session.create_new_conversation();
        session.create_new_conversation();

        message(execute_command("/switch 1", &session));
        assert_eq!(session.active_id().as_deref(), Some(first.as_str()));

        let second = session.conversations()[1].id.clone();
        message(execute_command(&format!("/s {}", &second[..8]), &session));
        assert_eq!(session.active_id().as_deref(), Some(second.as_str()));

        let reply = message(execute_command("/switch 9", &session));
        assert!(reply.starts_with("No conversation matching"));
        assert_eq!(session.active_id().as_deref(), Some(second.as_str()));
    }

    #[test]
    fn test_delete_defaults_to_active() {
        let session = offline_session();
        let first = session.create_new_conversation();
        session.create_new_conversation();

        message(execute_command("/delete", &session));
        assert_eq!(session.conversations().len(), 1);
        assert_eq!(session.active_id().as_deref(), Some(first.as_str()));

        message(execute_command("/d 1", &session));
        assert!(session.conversations().is_empty());
        assert_eq!(
            message(execute_command("/delete", &session)),
            "No active conversation"
        );
    }

    #[test]
    fn test_rename_active() {
        let session = offline_session();
        assert_eq!(
            message(execute_command("/rename Physics", &session)),
            "No active conversation"
        );

        session.create_new_conversation();
        message(execute_command("/rename Quantum notes", &session));
        assert_eq!(session.active_conversation().unwrap().title, "Quantum notes");
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let session = offline_session();
        session.create_new_conversation();

        message(execute_command("/clear", &session));
        assert_eq!(session.conversations().len(), 1);

        message(execute_command("/clear all", &session));
        assert!(session.conversations().is_empty());
    }

    #[test]
    fn test_info_shows_settings() {
        let session = offline_session();
        let info = message(execute_command("/info", &session));
        assert!(info.contains("Conversation: none"));
        assert!(info.contains("qwen/qwen3-4b"));
    }
}
