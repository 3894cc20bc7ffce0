use anyhow::Result;
use client::SessionController;

use crate::render;

/// Prints the reconciled thread list. An unreachable backend prints only the pending entry.
pub async fn list_threads(controller: &SessionController) -> Result<()> {
    let current = controller.session_id();
    for thread in controller.threads().await {
        println!("{}", render::thread_line(&thread, Some(current)));
    }
    Ok(())
}
