//! Application settings: endpoint config, contacts, global lore and the
//! sticker library.
//!
//! The store hands out immutable [`AppSettings`] snapshots. Each mutation
//! clones the current snapshot, edits the clone, swaps it in and persists it.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::database::AppDatabase;
use crate::error::ChatResult;
use crate::llm_client::AiEndpointConfig;
use crate::persona::{
    generate_id, ContactPatch, ContactProfile, LoreBook, LoreEntry, NewContact, Sticker,
    StickerFormat, StickerGroup, StoredContactProfile, StoredLoreBook, DEFAULT_CONTACT_ID,
    UNTITLED_LORE_ENTRY,
};

pub const SETTINGS_KEY: &str = "settings_v1";
pub const UNTITLED_GLOBAL_LORE_BOOK: &str = "未命名世界";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppSettings {
    pub ai_config: AiEndpointConfig,
    /// Shared lore books, not tied to any contact.
    pub global_lore_books: Vec<LoreBook>,
    /// Stored profiles in creation order.
    pub contacts: Vec<ContactProfile>,
    pub sticker_groups: Vec<StickerGroup>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            ai_config: AiEndpointConfig::default(),
            global_lore_books: Vec::new(),
            contacts: vec![ContactProfile::default_companion()],
            sticker_groups: Vec::new(),
        }
    }
}

impl AppSettings {
    pub fn contact(&self, id: &str) -> ContactProfile {
        self.contacts
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .unwrap_or_else(|| ContactProfile::default_for(id))
    }

    fn contact_mut(&mut self, id: &str) -> &mut ContactProfile {
        let index = match self.contacts.iter().position(|c| c.id == id) {
            Some(index) => index,
            None => {
                self.contacts.push(ContactProfile::default_for(id));
                self.contacts.len() - 1
            }
        };
        &mut self.contacts[index]
    }

    fn sticker_group_mut(&mut self, group_id: &str) -> Option<&mut StickerGroup> {
        self.sticker_groups.iter_mut().find(|g| g.id == group_id)
    }
}

/// The on-disk shape, tolerant of older builds.
#[derive(Debug, Default, Deserialize)]
struct StoredSettings {
    #[serde(default)]
    ai_config: AiEndpointConfig,
    #[serde(default)]
    global_lore_books: Vec<StoredLoreBook>,
    #[serde(default)]
    contacts: Option<Vec<StoredContactProfile>>,
    #[serde(default)]
    sticker_groups: Vec<StickerGroup>,
}

impl StoredSettings {
    fn normalize(self) -> AppSettings {
        let global_lore_books = self
            .global_lore_books
            .into_iter()
            .enumerate()
            .map(|(idx, book)| book.normalize(format!("wb-{}", idx)))
            .collect();

        let contacts = match self.contacts {
            Some(stored) => stored
                .into_iter()
                .enumerate()
                .map(|(idx, profile)| profile.normalize(&format!("contact-{}", idx)))
                .collect(),
            None => AppSettings::default().contacts,
        };

        AppSettings {
            ai_config: self.ai_config,
            global_lore_books,
            contacts,
            sticker_groups: self.sticker_groups,
        }
    }
}

/// Field-wise patch for the endpoint config.
#[derive(Debug, Clone, Default)]
pub struct AiConfigPatch {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

pub struct SettingsStore {
    db: Arc<AppDatabase>,
    current: RwLock<Arc<AppSettings>>,
}

impl SettingsStore {
    /// Loads persisted settings, falling back to defaults when they are
    /// missing or unreadable.
    pub fn load(db: Arc<AppDatabase>) -> Self {
        let settings = match db.get_state(SETTINGS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<StoredSettings>(&raw) {
                Ok(stored) => {
                    let settings = stored.normalize();
                    tracing::info!(
                        "Loaded settings with {} contact(s), {} sticker group(s)",
                        settings.contacts.len(),
                        settings.sticker_groups.len()
                    );
                    settings
                }
                Err(e) => {
                    tracing::warn!("Unreadable settings, using defaults: {}", e);
                    AppSettings::default()
                }
            },
            Ok(None) => AppSettings::default(),
            Err(e) => {
                tracing::warn!("Failed to read settings, using defaults: {:#}", e);
                AppSettings::default()
            }
        };

        Self {
            db,
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<AppSettings> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut AppSettings) -> T) -> (Arc<AppSettings>, T) {
        let mut current = match self.current.write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = AppSettings::clone(&current);
        let output = f(&mut next);
        let next = Arc::new(next);
        *current = next.clone();
        drop(current);

        self.persist(&next);
        (next, output)
    }

    fn persist(&self, settings: &AppSettings) {
        let result = serde_json::to_string(settings)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.db.set_state(SETTINGS_KEY, &json));
        if let Err(e) = result {
            tracing::warn!("Failed to persist settings: {:#}", e);
        }
    }

    pub fn update_ai_config(&self, patch: AiConfigPatch) -> Arc<AppSettings> {
        self.mutate(|s| {
            if let Some(base_url) = patch.base_url {
                s.ai_config.base_url = base_url;
            }
            if let Some(api_key) = patch.api_key {
                s.ai_config.api_key = api_key;
            }
            if let Some(model) = patch.model {
                s.ai_config.model = model;
            }
        })
        .0
    }

    /// Adds a one-entry global lore book. Blank content adds nothing.
    pub fn add_global_lore_book(&self, title: &str, content: &str) -> Option<String> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let title = match title.trim() {
            "" => UNTITLED_GLOBAL_LORE_BOOK,
            t => t,
        };
        let id = generate_id();
        let book = LoreBook {
            id: id.clone(),
            title: title.to_string(),
            entries: vec![LoreEntry {
                id: generate_id(),
                title: title.to_string(),
                content: content.to_string(),
            }],
        };
        self.mutate(|s| s.global_lore_books.push(book));
        Some(id)
    }

    pub fn update_global_lore_book(
        &self,
        id: &str,
        title: Option<String>,
        entries: Option<Vec<LoreEntry>>,
    ) -> bool {
        self.mutate(|s| match s.global_lore_books.iter_mut().find(|b| b.id == id) {
            Some(book) => {
                if let Some(title) = title {
                    book.title = title;
                }
                if let Some(entries) = entries {
                    book.entries = entries;
                }
                true
            }
            None => false,
        })
        .1
    }

    pub fn remove_global_lore_book(&self, id: &str) -> bool {
        self.mutate(|s| {
            let before = s.global_lore_books.len();
            s.global_lore_books.retain(|b| b.id != id);
            s.global_lore_books.len() != before
        })
        .1
    }

    /// The global lore collection rendered as `【title】` blocks.
    pub fn global_lore_text(&self) -> String {
        self.snapshot()
            .global_lore_books
            .iter()
            .map(|book| {
                let items: Vec<String> = book
                    .entries
                    .iter()
                    .map(|entry| {
                        let title = match entry.title.as_str() {
                            "" => UNTITLED_LORE_ENTRY,
                            t => t,
                        };
                        format!("- {}：{}", title, entry.content)
                    })
                    .collect();
                format!("【{}】\n{}", book.title, items.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn create_contact(&self, input: NewContact) -> ChatResult<ContactProfile> {
        let profile = input.into_profile()?;
        tracing::info!("Created contact '{}' ({})", profile.display_name, profile.id);
        self.mutate(|s| s.contacts.push(profile.clone()));
        Ok(profile)
    }

    /// Applies `patch`; an unknown id starts from the default profile shape.
    pub fn update_contact(&self, id: &str, patch: ContactPatch) -> ContactProfile {
        self.mutate(|s| {
            let contact = s.contact_mut(id);
            contact.apply(patch);
            contact.clone()
        })
        .1
    }

    /// Edits a contact's lore books in place.
    pub fn edit_contact_lore<T>(&self, id: &str, f: impl FnOnce(&mut ContactProfile) -> T) -> T {
        self.mutate(|s| f(s.contact_mut(id))).1
    }

    pub fn contact(&self, id: &str) -> ContactProfile {
        self.snapshot().contact(id)
    }

    /// The default companion first, then the rest in creation order.
    pub fn contacts(&self) -> Vec<ContactProfile> {
        let settings = self.snapshot();
        let mut contacts = vec![settings.contact(DEFAULT_CONTACT_ID)];
        contacts.extend(
            settings
                .contacts
                .iter()
                .filter(|c| c.id != DEFAULT_CONTACT_ID)
                .cloned(),
        );
        contacts
    }

    pub fn add_sticker_group(&self, name: &str) -> String {
        let id = generate_id();
        let group = StickerGroup {
            id: id.clone(),
            name: name.trim().to_string(),
            stickers: Vec::new(),
        };
        self.mutate(|s| s.sticker_groups.push(group));
        id
    }

    pub fn rename_sticker_group(&self, group_id: &str, name: &str) -> bool {
        self.mutate(|s| match s.sticker_group_mut(group_id) {
            Some(group) => {
                group.name = name.trim().to_string();
                true
            }
            None => false,
        })
        .1
    }

    pub fn remove_sticker_group(&self, group_id: &str) -> bool {
        self.mutate(|s| {
            let before = s.sticker_groups.len();
            s.sticker_groups.retain(|g| g.id != group_id);
            s.sticker_groups.len() != before
        })
        .1
    }

    pub fn add_sticker(
        &self,
        group_id: &str,
        name: &str,
        url: &str,
        format: StickerFormat,
    ) -> Option<String> {
        let id = generate_id();
        let sticker = Sticker {
            id: id.clone(),
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            format,
        };
        self.mutate(|s| {
            s.sticker_group_mut(group_id)
                .map(|group| group.stickers.push(sticker))
        })
        .1
        .map(|_| id)
    }

    pub fn rename_sticker(&self, group_id: &str, sticker_id: &str, name: &str) -> bool {
        self.mutate(|s| {
            match s
                .sticker_group_mut(group_id)
                .and_then(|g| g.stickers.iter_mut().find(|st| st.id == sticker_id))
            {
                Some(sticker) => {
                    sticker.name = name.trim().to_string();
                    true
                }
                None => false,
            }
        })
        .1
    }

    pub fn remove_sticker(&self, group_id: &str, sticker_id: &str) -> bool {
        self.mutate(|s| match s.sticker_group_mut(group_id) {
            Some(group) => {
                let before = group.stickers.len();
                group.stickers.retain(|st| st.id != sticker_id);
                group.stickers.len() != before
            }
            None => false,
        })
        .1
    }

    /// Every sticker across all groups, in group order.
    pub fn sticker_library(&self) -> Vec<Sticker> {
        self.snapshot()
            .sticker_groups
            .iter()
            .flat_map(|g| g.stickers.iter().cloned())
            .collect()
    }
}
