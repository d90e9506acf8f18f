//! Slash commands understood by the terminal driver.
//!
//! Anything that does not start with `/` is a chat message.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Login(String),
    Logout,
    Users,
    Folders,
    UseFolder(String),
    NewFolder(String),
    RenameFolder { old: String, new: String },
    Conversations,
    UseConversation(String),
    NewConversation(String),
    RenameConversation { old: String, new: String },
    History,
    Quit,
    Message(String),
}

pub const HELP: &str = "\
Commands:
  /login NAME                  log in (creates your history on first use)
  /logout                      log out
  /users                       list users with saved history
  /folders                     list folders
  /folder NAME                 switch folder
  /new-folder NAME             create a folder and switch to it
  /rename-folder OLD -> NEW    rename a folder
  /convs                       list conversations in the current folder
  /conv NAME                   switch conversation
  /new-conv NAME               create a conversation and switch to it
  /rename-conv OLD -> NEW      rename a conversation
  /history                     show the current conversation
  /help                        show this help
  /quit                        exit
Anything else is sent to the model.";

fn required(arg: &str, usage: &str) -> Result<String, String> {
    let arg = arg.trim();
    if arg.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(arg.to_string())
    }
}

fn rename_args(arg: &str, usage: &str) -> Result<(String, String), String> {
    match arg.split_once("->") {
        Some((old, new)) if !old.trim().is_empty() => {
            Ok((old.trim().to_string(), new.trim().to_string()))
        }
        _ => Err(format!("Usage: {}", usage)),
    }
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let trimmed = line.trim_start();
    let Some(body) = trimmed.strip_prefix('/') else {
        return Ok(Command::Message(line.to_string()));
    };

    let (name, arg) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let command = match name {
        "help" | "h" | "?" => Command::Help,
        "login" => Command::Login(required(arg, "/login NAME")?),
        "logout" => Command::Logout,
        "users" => Command::Users,
        "folders" => Command::Folders,
        "folder" => Command::UseFolder(required(arg, "/folder NAME")?),
        "new-folder" => Command::NewFolder(arg.trim().to_string()),
        "rename-folder" => {
            let (old, new) = rename_args(arg, "/rename-folder OLD -> NEW")?;
            Command::RenameFolder { old, new }
        }
        "convs" => Command::Conversations,
        "conv" => Command::UseConversation(required(arg, "/conv NAME")?),
        "new-conv" => Command::NewConversation(arg.trim().to_string()),
        "rename-conv" => {
            let (old, new) = rename_args(arg, "/rename-conv OLD -> NEW")?;
            Command::RenameConversation { old, new }
        }
        "history" => Command::History,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("Unknown command '/{}'. Type /help.", other)),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            parse_command("  what is rust?"),
            Ok(Command::Message("  what is rust?".into()))
        );
    }

    #[test]
    fn test_commands_with_names() {
        assert_eq!(parse_command("/login ana"), Ok(Command::Login("ana".into())));
        assert_eq!(
            parse_command("/folder  Work stuff "),
            Ok(Command::UseFolder("Work stuff".into()))
        );
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(parse_command("/users"), Ok(Command::Users));
        assert!(parse_command("/login").is_err());
    }

    #[test]
    fn test_blank_create_is_left_to_the_store() {
        // Blank names are rejected by the store with a proper message
        assert_eq!(
            parse_command("/new-folder"),
            Ok(Command::NewFolder(String::new()))
        );
    }

    #[test]
    fn test_rename_arguments() {
        assert_eq!(
            parse_command("/rename-folder General -> Old chats"),
            Ok(Command::RenameFolder {
                old: "General".into(),
                new: "Old chats".into()
            })
        );
        assert_eq!(
            parse_command("/rename-conv Plan ->"),
            Ok(Command::RenameConversation {
                old: "Plan".into(),
                new: String::new()
            })
        );
        assert!(parse_command("/rename-folder General").is_err());
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse_command("/dance").unwrap_err().contains("/dance"));
    }
}
