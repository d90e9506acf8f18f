use agent_host::{SessionController, SubmitOutcome};
use providers::{InferenceClient, OllamaClient};
use services::FileBlobStore;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;
mod utils;

use commands::{parse_command, Command, HELP};
use render::{format_history, format_names, prompt_label, TerminalObserver};

fn print_result<T>(result: Result<T, shared::ChatError>, ok: impl FnOnce(T) -> String) {
    match result {
        Ok(value) => println!("{}", ok(value)),
        Err(e) if e.is_user_error() => println!("⚠ {}", e),
        Err(e) => println!("✖ {}", e),
    }
}

/// Execute one driver command. Returns `false` when the user wants to quit.
fn run_command<C: InferenceClient>(
    runtime: &tokio::runtime::Runtime,
    session: &mut SessionController<C>,
    command: Command,
) -> bool {
    match command {
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
        Command::Login(name) => print_result(session.login(&name), |_| {
            format!("Welcome, {}", name.trim())
        }),
        Command::Logout => {
            session.logout();
            println!("Logged out.");
        }
        Command::Users => {
            let users = session.known_users();
            if users.is_empty() {
                println!("No saved users yet.");
            } else {
                println!("{}", users.join("\n"));
            }
        }
        Command::Folders => {
            let current = session.context().folder.clone();
            print_result(session.folders(), |names| format_names(&names, &current));
        }
        Command::UseFolder(name) => print_result(session.select_folder(&name), |_| {
            format!("Switched to folder '{}'", name.trim())
        }),
        Command::NewFolder(name) => print_result(session.create_folder(&name), |created| {
            format!("Folder '{}' created", created)
        }),
        Command::RenameFolder { old, new } => {
            print_result(session.rename_folder(&old, &new), |renamed| {
                format!("Folder '{}' renamed to '{}'", old, renamed)
            })
        }
        Command::Conversations => {
            let current = session.context().conversation.clone();
            print_result(session.conversations(), |names| format_names(&names, &current));
        }
        Command::UseConversation(name) => {
            print_result(session.select_conversation(&name), |_| {
                format!("Switched to conversation '{}'", name.trim())
            })
        }
        Command::NewConversation(name) => {
            print_result(session.create_conversation(&name), |created| {
                format!("Conversation '{}' created", created)
            })
        }
        Command::RenameConversation { old, new } => {
            print_result(session.rename_conversation(&old, &new), |renamed| {
                format!("Conversation '{}' renamed to '{}'", old, renamed)
            })
        }
        Command::History => print_result(session.history(), |h| format_history(&h)),
        Command::Message(text) => {
            let mut observer = TerminalObserver::new(io::stdout());
            // Blocks until the whole cycle (including persistence) is done
            let outcome = runtime.block_on(session.submit(&text, &mut observer));
            if observer.wrote_text() {
                println!();
            }
            match outcome {
                SubmitOutcome::Replied { persist_error, .. } => {
                    if let Some(err) = persist_error {
                        println!("⚠ Reply kept in memory but not saved: {}", err);
                    }
                }
                SubmitOutcome::Warning(msg) => println!("⚠ {}", msg),
                SubmitOutcome::Failed(msg) => println!("✖ {}", msg),
            }
        }
    }
    true
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let (settings, found) = utils::load_settings_or_default();
    if !found {
        utils::save_settings(&settings);
    }
    let settings = settings.with_env_overrides();

    let store_path = settings
        .store_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(FileBlobStore::default_path);
    tracing::info!(
        model = %settings.model,
        base_url = %settings.base_url,
        store = %store_path.display(),
        "starting thinkchat"
    );

    let blobs = FileBlobStore::new(store_path);
    if let Some(saved) = blobs.last_saved() {
        tracing::info!(saved_at = %saved.to_rfc3339(), "found saved conversations");
    }

    let client = OllamaClient::new(&settings)?;
    println!("Chatbot with {}. Type /help for commands.", client.model());

    let runtime = tokio::runtime::Runtime::new()?;
    let mut session = SessionController::new(client, Box::new(blobs), settings);

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", prompt_label(session.context()));
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };
        if !run_command(&runtime, &mut session, command) {
            break;
        }
    }

    Ok(())
}
