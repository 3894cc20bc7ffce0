use anyhow::{Context, Result};
use client::SessionController;

use crate::render;

/// Prints every message of the thread `session_id`.
///
/// # Errors
/// Fails when `session_id` is not a UUIDv4. An unreachable backend prints an empty thread.
pub async fn print_history(controller: &SessionController, session_id: &str) -> Result<()> {
    let summary = controller
        .open_thread(session_id)
        .await
        .context("cannot open thread")?;

    if let Some(summary) = summary {
        println!("# {}\n", summary.title);
    }

    let messages = controller.messages();
    if messages.is_empty() {
        println!("(no messages)");
    }
    for message in messages.iter() {
        println!("{}", render::message_block(message));
    }
    Ok(())
}
