//! Nested conversation store: user → folder → conversation → exchanges.
//!
//! Folders and conversations keep their creation order. Every user always
//! owns a `"General"` folder and every folder always holds at least one
//! conversation; the operations below never break either rule.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shared::conversation::{Exchange, DEFAULT_CONVERSATION, GENERAL_FOLDER};
use shared::{ChatError, ChatResult};

/// Conversations of one folder, keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Folder {
    pub(crate) conversations: IndexMap<String, Vec<Exchange>>,
}

impl Folder {
    /// A folder holding one empty default conversation
    pub fn with_default() -> Self {
        let mut conversations = IndexMap::new();
        conversations.insert(DEFAULT_CONVERSATION.to_string(), Vec::new());
        Self { conversations }
    }

    pub fn conversation_names(&self) -> Vec<String> {
        self.conversations.keys().cloned().collect()
    }

    pub(crate) fn ensure_default(&mut self) {
        if self.conversations.is_empty() {
            self.conversations
                .insert(DEFAULT_CONVERSATION.to_string(), Vec::new());
        }
    }
}

/// Folders of one user, keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHistory {
    pub(crate) folders: IndexMap<String, Folder>,
}

impl UserHistory {
    pub fn new() -> Self {
        let mut folders = IndexMap::new();
        folders.insert(GENERAL_FOLDER.to_string(), Folder::with_default());
        Self { folders }
    }

    /// Re-establish the folder invariants after loading external data
    pub(crate) fn normalize(&mut self) {
        if !self.folders.contains_key(GENERAL_FOLDER) {
            self.folders
                .shift_insert(0, GENERAL_FOLDER.to_string(), Folder::with_default());
        }
        for folder in self.folders.values_mut() {
            folder.ensure_default();
        }
    }
}

impl Default for UserHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationStore {
    pub(crate) users: IndexMap<String, UserHistory>,
}

fn clean_name(kind: &'static str, name: &str) -> ChatResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(ChatError::BlankName { kind })
    } else {
        Ok(trimmed.to_string())
    }
}

fn insert_new<V>(
    map: &mut IndexMap<String, V>,
    kind: &'static str,
    name: &str,
    value: V,
) -> ChatResult<String> {
    let name = clean_name(kind, name)?;
    if map.contains_key(&name) {
        return Err(ChatError::duplicate(kind, name));
    }
    map.insert(name.clone(), value);
    Ok(name)
}

/// Move `old` to `new`, keeping its position
fn rename_entry<V>(
    map: &mut IndexMap<String, V>,
    kind: &'static str,
    old: &str,
    new: &str,
) -> ChatResult<String> {
    let new = clean_name(kind, new)?;
    let old = old.trim();
    let Some(index) = map.get_index_of(old) else {
        return Err(ChatError::not_found(kind, old));
    };
    if map.contains_key(&new) {
        return Err(ChatError::duplicate(kind, new));
    }
    if let Some(value) = map.shift_remove(old) {
        map.shift_insert(index, new.clone(), value);
    }
    Ok(new)
}

/// `Ok(false)` for the rejections a create call reports as a plain refusal
fn created(result: ChatResult<String>) -> ChatResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(ChatError::DuplicateName { .. }) | Err(ChatError::BlankName { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    fn user(&self, username: &str) -> ChatResult<&UserHistory> {
        self.users
            .get(username.trim())
            .ok_or_else(|| ChatError::not_found("user", username.trim()))
    }

    fn user_mut(&mut self, username: &str) -> ChatResult<&mut UserHistory> {
        self.users
            .get_mut(username.trim())
            .ok_or_else(|| ChatError::not_found("user", username.trim()))
    }

    fn folder(&self, username: &str, folder: &str) -> ChatResult<&Folder> {
        self.user(username)?
            .folders
            .get(folder.trim())
            .ok_or_else(|| ChatError::not_found("folder", folder.trim()))
    }

    fn folder_mut(&mut self, username: &str, folder: &str) -> ChatResult<&mut Folder> {
        self.user_mut(username)?
            .folders
            .get_mut(folder.trim())
            .ok_or_else(|| ChatError::not_found("folder", folder.trim()))
    }

    /// Create the user's history on first login. Returns `true` if it was created.
    pub fn ensure_user(&mut self, username: &str) -> ChatResult<bool> {
        let username = clean_name("user", username)?;
        if self.users.contains_key(&username) {
            return Ok(false);
        }
        tracing::info!(user = %username, "creating conversation history");
        self.users.insert(username, UserHistory::new());
        Ok(true)
    }

    pub fn list_folders(&self, username: &str) -> ChatResult<Vec<String>> {
        Ok(self.user(username)?.folders.keys().cloned().collect())
    }

    /// Create a folder with one empty default conversation, reporting why it was refused
    pub fn try_create_folder(&mut self, username: &str, name: &str) -> ChatResult<String> {
        let user = self.user_mut(username)?;
        insert_new(&mut user.folders, "folder", name, Folder::with_default())
    }

    /// `Ok(false)` (and no change) if the name is taken or blank
    pub fn create_folder(&mut self, username: &str, name: &str) -> ChatResult<bool> {
        created(self.try_create_folder(username, name))
    }

    /// Rename a folder with all its conversations. Renaming `"General"` away
    /// leaves a fresh, empty `"General"` at the top of the list.
    pub fn rename_folder(&mut self, username: &str, old: &str, new: &str) -> ChatResult<String> {
        let user = self.user_mut(username)?;
        let new = rename_entry(&mut user.folders, "folder", old, new)?;
        if old.trim() == GENERAL_FOLDER {
            user.folders
                .shift_insert(0, GENERAL_FOLDER.to_string(), Folder::with_default());
        }
        Ok(new)
    }

    pub fn list_conversations(&self, username: &str, folder: &str) -> ChatResult<Vec<String>> {
        Ok(self.folder(username, folder)?.conversation_names())
    }

    pub fn try_create_conversation(
        &mut self,
        username: &str,
        folder: &str,
        name: &str,
    ) -> ChatResult<String> {
        let folder = self.folder_mut(username, folder)?;
        insert_new(&mut folder.conversations, "conversation", name, Vec::new())
    }

    pub fn create_conversation(
        &mut self,
        username: &str,
        folder: &str,
        name: &str,
    ) -> ChatResult<bool> {
        created(self.try_create_conversation(username, folder, name))
    }

    pub fn rename_conversation(
        &mut self,
        username: &str,
        folder: &str,
        old: &str,
        new: &str,
    ) -> ChatResult<String> {
        let folder = self.folder_mut(username, folder)?;
        rename_entry(&mut folder.conversations, "conversation", old, new)
    }

    /// Append to the end of an existing conversation
    pub fn append_exchange(
        &mut self,
        username: &str,
        folder: &str,
        conversation: &str,
        exchange: Exchange,
    ) -> ChatResult<()> {
        let folder = self.folder_mut(username, folder)?;
        let exchanges = folder
            .conversations
            .get_mut(conversation.trim())
            .ok_or_else(|| ChatError::not_found("conversation", conversation.trim()))?;
        exchanges.push(exchange);
        Ok(())
    }

    pub fn get_exchanges(
        &self,
        username: &str,
        folder: &str,
        conversation: &str,
    ) -> ChatResult<&[Exchange]> {
        self.folder(username, folder)?
            .conversations
            .get(conversation.trim())
            .map(|v| v.as_slice())
            .ok_or_else(|| ChatError::not_found("conversation", conversation.trim()))
    }

    pub(crate) fn normalize(&mut self) {
        for user in self.users.values_mut() {
            user.normalize();
        }
    }
}
