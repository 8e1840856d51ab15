mod app;
mod config;
mod models;
mod providers;
mod services;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppMsg, HELP};
use crate::config::AppConfig;
use crate::providers::session::SessionStore;
use crate::providers::WebhookProvider;
use crate::services::{ChatService, ChatStore, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let storage = match Storage::open(&config.storage_path()) {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!("Failed to open chat storage, chats will not be saved: {:#}", e);
            Storage::new_in_memory()?
        }
    };

    let store = ChatStore::load(storage.clone());
    store.initialize();
    let state = store.snapshot();
    tracing::info!(
        conversations = state.conversations.len(),
        theme = state.preferences.theme.as_str(),
        font_size = state.preferences.font_size,
        "Chat state ready"
    );

    let mut updates = store.subscribe();
    tokio::spawn(async move {
        let mut was_typing = false;
        while updates.changed().await.is_ok() {
            let is_typing = updates.borrow_and_update().is_typing;
            if is_typing && !was_typing {
                println!("Assistant is typing...");
            }
            was_typing = is_typing;
        }
    });

    let provider = WebhookProvider::new(&config.exchange, SessionStore::new(storage))?;
    tracing::info!(url = %provider.url(), "Using chat webhook");

    let app = App::new(ChatService::new(store, Arc::new(provider)));
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match AppMsg::parse(&line) {
            Ok(AppMsg::Quit) => break,
            Ok(msg) => {
                for out in app.update(msg) {
                    println!("{}", out);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}
