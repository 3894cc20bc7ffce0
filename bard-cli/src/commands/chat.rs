//! Interactive chat loop.

use anyhow::{Context, Result};
use client::{
    ModelAvailability, ModelsChecker, RefreshScheduler, SessionController, SubmitError,
    SubmitOutcome,
};
use shared::{config::ClientConfig, models::ASSISTANT_DISPLAY_NAME};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::models::{model_line, warn_no_models};
use crate::render::{self, ReplyPrinter};

const HELP: &str = "\
Commands:
  /new           start a new thread
  /threads       list your threads
  /open <id>     switch to an existing thread
  /models        list available models
  /model <name>  use a different model
  /help          show this help
  /quit          leave (Ctrl-D works too)
Press Ctrl-C while a reply is streaming to stop it.";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Message(&'a str),
    Command(Command<'a>),
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    New,
    Threads,
    Open(&'a str),
    Models,
    Model(&'a str),
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(line.trim_end_matches(['\r', '\n']));
    };

    let (name, argument) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(name, rest)| (name, rest.trim()));
    Input::Command(match name {
        "new" => Command::New,
        "threads" => Command::Threads,
        "open" => Command::Open(argument),
        "models" => Command::Models,
        "model" => Command::Model(argument),
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(trimmed),
    })
}

/// Runs the interactive loop until `/quit`, end of input, or Ctrl-C at the prompt.
///
/// # Errors
/// Fails if `session` is not a valid thread id or the terminal cannot be read or written.
pub async fn run_chat(
    controller: &SessionController,
    config: &ClientConfig,
    session: Option<&str>,
) -> Result<()> {
    if let Some(session) = session {
        open(controller, session).await?;
    }

    let models = controller.models().await;
    let mut model = match ModelsChecker::check(&models) {
        ModelAvailability::NoneFound => {
            warn_no_models();
            None
        }
        ModelAvailability::Available(_) => {
            ModelsChecker::select(&models, &config.default_model).map(str::to_string)
        }
    };

    let scheduler = controller.spawn_refresh(config.refresh_interval());
    if controller.messages().is_empty() {
        println!("{}", render::greeting(&controller.settings().owner_name));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Message(content) => send(controller, content, model.as_deref()).await?,
            Input::Command(Command::Quit) => break,
            Input::Command(Command::Help) => println!("{HELP}"),
            Input::Command(Command::New) => {
                controller.new_thread();
                println!("{}", render::greeting(&controller.settings().owner_name));
            }
            Input::Command(Command::Threads) => print_threads(controller, &scheduler).await,
            Input::Command(Command::Open(id)) => {
                if let Err(err) = open(controller, id).await {
                    eprintln!("error: {err:#}");
                }
            }
            Input::Command(Command::Models) => {
                let models = controller.models().await;
                if models.is_empty() {
                    warn_no_models();
                }
                for entry in models.iter() {
                    println!("{}", model_line(entry, model.as_deref()));
                }
            }
            Input::Command(Command::Model(name)) => {
                if name.is_empty() {
                    eprintln!("usage: /model <name>");
                } else {
                    model = Some(name.to_string());
                    println!("Using model {name}.");
                }
            }
            Input::Command(Command::Unknown(text)) => {
                eprintln!("unknown command {text}; type /help for the list");
            }
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

async fn open(controller: &SessionController, id: &str) -> Result<()> {
    let summary = controller
        .open_thread(id)
        .await
        .context("cannot open thread")?;
    let title = summary.map_or_else(|| "untitled".to_string(), |summary| summary.title);
    println!("Opened {title} ({id}).");
    for message in controller.messages().iter() {
        println!("{}", render::message_block(message));
    }
    Ok(())
}

async fn print_threads(controller: &SessionController, scheduler: &RefreshScheduler) {
    let mut threads = scheduler.latest().to_vec();
    if threads.is_empty() {
        threads = controller.threads().await;
    }
    let current = controller.session_id();
    for thread in &threads {
        println!("{}", render::thread_line(thread, Some(current)));
    }
}

/// Submits one message and prints the reply as it streams in.
async fn send(controller: &SessionController, content: &str, model: Option<&str>) -> Result<()> {
    let mut messages = controller.subscribe_messages();
    let mut printer = ReplyPrinter::new(
        controller.messages().len(),
        format!("{ASSISTANT_DISPLAY_NAME}: "),
    );
    let mut stdout = io::stdout();
    let mut watching = true;

    let submit = controller.submit(content, model);
    tokio::pin!(submit);

    let outcome = loop {
        tokio::select! {
            outcome = &mut submit => break outcome,
            changed = messages.changed(), if watching => {
                if changed.is_err() {
                    watching = false;
                    continue;
                }
                let delta = printer.observe(&messages.borrow_and_update());
                if let Some(delta) = delta {
                    print!("{delta}");
                    stdout.flush()?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupt received, cancelling reply");
                controller.cancel();
            }
        }
    };

    if let Some(delta) = printer.observe(&controller.messages()) {
        print!("{delta}");
    }
    if printer.started() {
        println!();
    }

    match outcome {
        Ok(SubmitOutcome::Completed { .. }) => {}
        Ok(SubmitOutcome::Cancelled) => eprintln!("(reply stopped)"),
        Err(SubmitError::Validation(err)) => eprintln!("error: {err}"),
        Err(SubmitError::Busy) => eprintln!("error: wait for the current reply to finish"),
        Err(err) => eprintln!("error: failed to send message: {err}"),
    }
    Ok(())
}
