use std::sync::{Mutex, PoisonError};

use crate::models::{Conversation, MessagePatch, Role};
use crate::services::chat::IgnoreReason;
use crate::services::{ChatError, ChatService, SubmitOutcome};

pub const HELP: &str = "\
Type a message and press Enter to send it. Commands:
  /new                 start a new chat
  /list [query]        list chats, optionally filtered by title
  /select <n>          switch to chat number n from /list
  /show                print the current chat
  /rename <title>      rename the current chat
  /pin                 pin or unpin the current chat
  /delete              delete the current chat
  /edit <n>            remove message n and everything after it, then print it for resending
  /fix <n> <text>      replace the text of message n in place
  /rm <n>              delete message n
  /theme               switch between dark and light
  /font +|-            change the font size
  /sidebar             show or hide the sidebar
  /help                show this help
  /quit                exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMsg {
    NewChat,
    ListConversations(String),
    ConversationSelected(usize),
    ShowConversation,
    RenameConversation(String),
    TogglePin,
    DeleteConversation,
    EditMessage(usize),
    UpdateMessage(usize, String),
    DeleteMessage(usize),
    ToggleTheme,
    IncreaseFontSize,
    DecreaseFontSize,
    ToggleSidebar,
    ShowHelp,
    Quit,
    SendMessage(String),
}

impl AppMsg {
    /// Parse one input line. Lines not starting with `/` are messages.
    pub fn parse(line: &str) -> Result<Self, String> {
        let trimmed = line.trim();
        let Some(command) = trimmed.strip_prefix('/') else {
            return Ok(AppMsg::SendMessage(line.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        let msg = match name {
            "new" => AppMsg::NewChat,
            "list" => AppMsg::ListConversations(arg.to_string()),
            "select" => AppMsg::ConversationSelected(parse_position(arg)?),
            "show" => AppMsg::ShowConversation,
            "rename" if !arg.is_empty() => AppMsg::RenameConversation(arg.to_string()),
            "rename" => return Err("Usage: /rename <title>".to_string()),
            "pin" => AppMsg::TogglePin,
            "delete" => AppMsg::DeleteConversation,
            "edit" => AppMsg::EditMessage(parse_position(arg)?),
            "fix" => {
                let usage = || "Usage: /fix <n> <text>".to_string();
                let (position, text) = arg.split_once(char::is_whitespace).ok_or_else(usage)?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(usage());
                }
                AppMsg::UpdateMessage(parse_position(position)?, text.to_string())
            }
            "rm" => AppMsg::DeleteMessage(parse_position(arg)?),
            "theme" => AppMsg::ToggleTheme,
            "font" => match arg {
                "+" => AppMsg::IncreaseFontSize,
                "-" => AppMsg::DecreaseFontSize,
                _ => return Err("Usage: /font +|-".to_string()),
            },
            "sidebar" => AppMsg::ToggleSidebar,
            "help" => AppMsg::ShowHelp,
            "quit" | "exit" => AppMsg::Quit,
            other => return Err(format!("Unknown command: /{}", other)),
        };
        Ok(msg)
    }
}

fn parse_position(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("Expected a number starting at 1, got '{}'", arg)),
    }
}

/// Terminal front end over the chat service.
pub struct App {
    service: ChatService,
    /// Conversation ids in the order the last `/list` printed them.
    last_listing: Mutex<Option<Vec<String>>>,
}

impl App {
    pub fn new(service: ChatService) -> Self {
        Self {
            service,
            last_listing: Mutex::new(None),
        }
    }

    /// Handle everything except sending, which is asynchronous. Returns the
    /// lines to print.
    pub fn update(&self, msg: AppMsg) -> Vec<String> {
        let store = self.service.store();
        match msg {
            AppMsg::NewChat => {
                store.create_conversation();
                vec!["Started a new chat.".to_string()]
            }
            AppMsg::ListConversations(query) => {
                let sections = store.sidebar_sections(&query);
                *self.last_listing.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(sections.iter().map(|row| row.id.clone()).collect());
                if sections.is_empty() {
                    return vec!["No chats found".to_string()];
                }
                let mut lines = Vec::new();
                let mut position = 0;
                for (heading, rows) in [("Pinned", &sections.pinned), ("Recent", &sections.recent)] {
                    if rows.is_empty() {
                        continue;
                    }
                    lines.push(format!("{}:", heading));
                    for row in rows {
                        position += 1;
                        let marker = if row.is_current { '*' } else { ' ' };
                        lines.push(format!(
                            "{} {:>2}. {} ({} messages, {})",
                            marker,
                            position,
                            row.title,
                            row.message_count,
                            row.created_at.format("%b %d, %Y")
                        ));
                        if let Some(preview) = row
                            .last_message_preview
                            .as_deref()
                            .and_then(|p| p.lines().next())
                        {
                            lines.push(format!("       {}", preview));
                        }
                    }
                }
                lines
            }
            AppMsg::ConversationSelected(position) => {
                let target = position.checked_sub(1).and_then(|i| self.listed_id(i));
                match target {
                    Some(id) if store.select_conversation(&id) => {
                        let title = store.conversation(&id).map(|c| c.title).unwrap_or_default();
                        vec![format!("Switched to \"{}\"", title)]
                    }
                    _ => vec![format!("No chat number {}", position)],
                }
            }
            AppMsg::ShowConversation => match store.current_conversation() {
                Some(conv) => render_conversation(&conv),
                None => vec!["No chat selected".to_string()],
            },
            AppMsg::RenameConversation(title) => self.with_current(|id| {
                store.set_title(id, &title);
                format!("Renamed to \"{}\"", title)
            }),
            AppMsg::TogglePin => self.with_current(|id| match store.toggle_pin(id) {
                Some(true) => "Pinned".to_string(),
                _ => "Unpinned".to_string(),
            }),
            AppMsg::DeleteConversation => self.with_current(|id| {
                self.service.delete_conversation(id);
                match store.current_conversation() {
                    Some(conv) => format!("Deleted. Now in \"{}\"", conv.title),
                    None => "Deleted. Use /new to start a chat".to_string(),
                }
            }),
            AppMsg::EditMessage(position) => match self.message_id_at(position) {
                Some(message_id) => match self.service.begin_edit(&message_id) {
                    Some(draft) => vec![
                        "Removed the message and everything after it. Resend:".to_string(),
                        draft,
                    ],
                    None => vec![format!("No message number {}", position)],
                },
                None => vec![format!("No message number {}", position)],
            },
            AppMsg::UpdateMessage(position, text) => match self.message_id_at(position) {
                Some(message_id) => self.with_current(|id| {
                    store.update_message(id, &message_id, &MessagePatch::content(text.as_str()));
                    format!("Message {} updated", position)
                }),
                None => vec![format!("No message number {}", position)],
            },
            AppMsg::DeleteMessage(position) => match self.message_id_at(position) {
                Some(message_id) => self.with_current(|id| {
                    store.delete_message(id, &message_id);
                    "Message deleted".to_string()
                }),
                None => vec![format!("No message number {}", position)],
            },
            AppMsg::ToggleTheme => vec![format!("Theme: {}", store.toggle_theme().as_str())],
            AppMsg::IncreaseFontSize => vec![format!("Font size: {}", store.increase_font_size())],
            AppMsg::DecreaseFontSize => vec![format!("Font size: {}", store.decrease_font_size())],
            AppMsg::ToggleSidebar => {
                let open = store.toggle_sidebar();
                vec![format!("Sidebar {}", if open { "shown" } else { "hidden" })]
            }
            AppMsg::ShowHelp => HELP.lines().map(str::to_string).collect(),
            AppMsg::Quit => Vec::new(),
            AppMsg::SendMessage(text) => {
                let pending = store
                    .current_conversation_id()
                    .is_some_and(|id| self.service.is_pending(&id));
                if pending {
                    return vec!["Still waiting for the last reply in this chat".to_string()];
                }
                self.send_message(text);
                Vec::new()
            }
        }
    }

    /// Submit in the background so the store stays usable while the reply
    /// is pending.
    fn send_message(&self, text: String) {
        let service = self.service.clone();
        tokio::spawn(async move {
            let result = service.submit(&text).await;
            match &result {
                Ok(SubmitOutcome::Replied {
                    conversation_id,
                    user_message_id,
                    assistant_message_id,
                    ..
                }) => tracing::debug!(
                    conversation_id = %conversation_id,
                    user_message_id = %user_message_id,
                    assistant_message_id = %assistant_message_id,
                    "Reply received"
                ),
                Ok(SubmitOutcome::Cancelled { conversation_id }) => tracing::debug!(
                    conversation_id = %conversation_id,
                    "Reply dropped, chat was deleted"
                ),
                _ => {}
            }
            for line in describe_outcome(result) {
                println!("{}", line);
            }
        });
    }

    /// Id at `index` of the last `/list` output, or of the full sidebar
    /// when nothing has been listed yet.
    fn listed_id(&self, index: usize) -> Option<String> {
        let listing = self
            .last_listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match listing {
            Some(ids) => ids.get(index).cloned(),
            None => self
                .service
                .store()
                .sidebar_sections("")
                .iter()
                .nth(index)
                .map(|row| row.id.clone()),
        }
    }

    fn with_current(&self, action: impl FnOnce(&str) -> String) -> Vec<String> {
        match self.service.store().current_conversation_id() {
            Some(id) => vec![action(&id)],
            None => vec!["No chat selected".to_string()],
        }
    }

    fn message_id_at(&self, position: usize) -> Option<String> {
        let conv = self.service.store().current_conversation()?;
        let index = position.checked_sub(1)?;
        conv.messages.get(index).map(|m| m.id.clone())
    }
}

fn render_conversation(conv: &Conversation) -> Vec<String> {
    let mut lines = vec![format!("== {} ==", conv.title)];
    for (i, message) in conv.messages.iter().enumerate() {
        let speaker = match message.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        lines.push(format!(
            "[{}] {} ({}):",
            i + 1,
            speaker,
            message.timestamp.format("%H:%M")
        ));
        lines.extend(message.content.lines().map(|l| format!("    {}", l)));
    }
    lines
}

pub fn describe_outcome(result: Result<SubmitOutcome, ChatError>) -> Vec<String> {
    match result {
        Ok(SubmitOutcome::Replied { reply, .. }) => reply.lines().map(str::to_string).collect(),
        Ok(SubmitOutcome::Ignored(IgnoreReason::NoConversation)) => {
            vec!["No chat selected. Use /new to start one".to_string()]
        }
        Ok(SubmitOutcome::Ignored(IgnoreReason::EmptyInput)) => Vec::new(),
        Ok(SubmitOutcome::Cancelled { .. }) => Vec::new(),
        Err(ChatError::Exchange(e)) if e.status() == Some(404) => vec![
            format!("Could not get a reply: {}", e),
            "No webhook at that address. Check CHATAI_CHAT_ENDPOINT".to_string(),
        ],
        Err(e) => vec![format!("Could not get a reply: {}", e)],
    }
}
