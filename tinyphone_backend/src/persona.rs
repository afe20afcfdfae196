//! Contact personas, lore books and the sticker library.
//!
//! A contact profile is the roleplay card for one chat: who the companion is,
//! who the user plays, how the companion speaks, and which lore books it must
//! respect. Profiles are plain data; the settings store owns mutation.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// Id of the built-in companion every install starts with.
pub const DEFAULT_CONTACT_ID: &str = "default_companion";

pub const DEFAULT_DISPLAY_NAME: &str = "软糯糯·AI 好友";
pub const DEFAULT_AVATAR: &str = "🌙";
pub const DEFAULT_ADDRESSING_FORM: &str = "你";
pub const DEFAULT_CHARACTER_ROLE: &str = "温柔的乙女游戏 AI 陪伴角色";
pub const DEFAULT_STYLE: &str = "软糯糯、温柔、像恋爱游戏里的角色那样和玩家聊天";
pub const DEFAULT_OPENING_LINE: &str =
    "嗨～我是软糯糯小手机里的陪伴 AI，以后就由我来陪你聊天啦。";

/// Shown for a lore book without a title.
pub const UNTITLED_LORE_BOOK: &str = "未命名世界书";
/// Shown for a lore entry without a title.
pub const UNTITLED_LORE_ENTRY: &str = "条目";
/// Title used when a legacy lore book had none.
pub const LEGACY_LORE_BOOK_TITLE: &str = "默认世界";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoreBook {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub entries: Vec<LoreEntry>,
}

impl LoreBook {
    /// Renders the book as a titled block of `- title：content` lines.
    pub fn render(&self) -> String {
        let title = if self.title.trim().is_empty() {
            UNTITLED_LORE_BOOK
        } else {
            self.title.as_str()
        };
        let items: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                let entry_title = if entry.title.trim().is_empty() {
                    UNTITLED_LORE_ENTRY
                } else {
                    entry.title.as_str()
                };
                format!("- {}：{}", entry_title, entry.content)
            })
            .collect();
        format!("【{}】\n{}", title, items.join("\n"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    pub id: String,
    pub display_name: String,
    pub avatar: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// How the companion addresses the user.
    pub addressing_form: String,
    pub user_role_in_world: String,
    pub character_role_in_world: String,
    pub style_description: String,
    #[serde(default)]
    pub opening_line: Option<String>,
    #[serde(default)]
    pub lore_books: Vec<LoreBook>,
}

impl ContactProfile {
    /// The built-in profile shape, re-keyed to `id`.
    ///
    /// Any contact id without a stored profile resolves to this.
    pub fn default_for(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            avatar_url: None,
            addressing_form: DEFAULT_ADDRESSING_FORM.to_string(),
            user_role_in_world: String::new(),
            character_role_in_world: DEFAULT_CHARACTER_ROLE.to_string(),
            style_description: DEFAULT_STYLE.to_string(),
            opening_line: Some(DEFAULT_OPENING_LINE.to_string()),
            lore_books: Vec::new(),
        }
    }

    pub fn default_companion() -> Self {
        Self::default_for(DEFAULT_CONTACT_ID)
    }

    /// Trimmed opening line, if one is set and non-blank.
    pub fn opening_line(&self) -> Option<&str> {
        self.opening_line
            .as_deref()
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }

    pub fn apply(&mut self, patch: ContactPatch) {
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }
        if let Some(avatar) = patch.avatar {
            self.avatar = avatar;
        }
        if let Some(avatar_url) = patch.avatar_url {
            self.avatar_url = avatar_url;
        }
        if let Some(addressing_form) = patch.addressing_form {
            self.addressing_form = addressing_form;
        }
        if let Some(role) = patch.user_role_in_world {
            self.user_role_in_world = role;
        }
        if let Some(role) = patch.character_role_in_world {
            self.character_role_in_world = role;
        }
        if let Some(style) = patch.style_description {
            self.style_description = style;
        }
        if let Some(opening_line) = patch.opening_line {
            self.opening_line = opening_line;
        }
        if let Some(lore_books) = patch.lore_books {
            self.lore_books = lore_books;
        }
    }

    pub fn add_lore_book(&mut self, title: &str) -> String {
        let id = generate_id();
        self.lore_books.push(LoreBook {
            id: id.clone(),
            title: title.trim().to_string(),
            entries: Vec::new(),
        });
        id
    }

    pub fn rename_lore_book(&mut self, book_id: &str, title: &str) -> bool {
        match self.lore_books.iter_mut().find(|b| b.id == book_id) {
            Some(book) => {
                book.title = title.to_string();
                true
            }
            None => false,
        }
    }

    pub fn remove_lore_book(&mut self, book_id: &str) -> bool {
        let before = self.lore_books.len();
        self.lore_books.retain(|b| b.id != book_id);
        self.lore_books.len() != before
    }

    /// Appends an entry to a book; returns the new entry id.
    pub fn add_lore_entry(&mut self, book_id: &str, title: &str, content: &str) -> Option<String> {
        let book = self.lore_books.iter_mut().find(|b| b.id == book_id)?;
        let id = generate_id();
        book.entries.push(LoreEntry {
            id: id.clone(),
            title: title.to_string(),
            content: content.to_string(),
        });
        Some(id)
    }

    pub fn update_lore_entry(
        &mut self,
        book_id: &str,
        entry_id: &str,
        title: Option<String>,
        content: Option<String>,
    ) -> bool {
        let Some(entry) = self
            .lore_books
            .iter_mut()
            .find(|b| b.id == book_id)
            .and_then(|b| b.entries.iter_mut().find(|e| e.id == entry_id))
        else {
            return false;
        };
        if let Some(title) = title {
            entry.title = title;
        }
        if let Some(content) = content {
            entry.content = content;
        }
        true
    }

    pub fn remove_lore_entry(&mut self, book_id: &str, entry_id: &str) -> bool {
        match self.lore_books.iter_mut().find(|b| b.id == book_id) {
            Some(book) => {
                let before = book.entries.len();
                book.entries.retain(|e| e.id != entry_id);
                book.entries.len() != before
            }
            None => false,
        }
    }
}

/// Field-wise patch for a profile. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct ContactPatch {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub addressing_form: Option<String>,
    pub user_role_in_world: Option<String>,
    pub character_role_in_world: Option<String>,
    pub style_description: Option<String>,
    pub opening_line: Option<Option<String>>,
    pub lore_books: Option<Vec<LoreBook>>,
}

/// User input of the "create contact" form.
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub display_name: String,
    pub addressing_form: String,
    pub user_role_in_world: String,
    pub character_role_in_world: String,
    pub style_description: String,
    pub opening_line: String,
}

impl NewContact {
    /// Validates the required fields and builds a fresh profile.
    pub fn into_profile(self) -> ChatResult<ContactProfile> {
        let display_name = self.display_name.trim();
        let user_role = self.user_role_in_world.trim();
        let character_role = self.character_role_in_world.trim();
        if display_name.is_empty() || user_role.is_empty() || character_role.is_empty() {
            return Err(ChatError::InvalidContact(
                "display name, your role and the character's role are required".to_string(),
            ));
        }

        let addressing_form = match self.addressing_form.trim() {
            "" => DEFAULT_ADDRESSING_FORM,
            form => form,
        };
        let opening_line = Some(self.opening_line.trim().to_string()).filter(|l| !l.is_empty());

        Ok(ContactProfile {
            id: format!("friend_{}", uuid::Uuid::new_v4().simple()),
            display_name: display_name.to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            avatar_url: None,
            addressing_form: addressing_form.to_string(),
            user_role_in_world: user_role.to_string(),
            character_role_in_world: character_role.to_string(),
            style_description: self.style_description.trim().to_string(),
            opening_line,
            lore_books: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StickerFormat {
    #[default]
    Static,
    Gif,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub format: StickerFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
}

pub(crate) fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ---------------------------------------------------------------------------
// Legacy shapes
// ---------------------------------------------------------------------------

/// Lore book as older builds stored it: either with entries, or as a single
/// `content` string without entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StoredLoreBook {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    entries: Option<Vec<LoreEntry>>,
}

impl StoredLoreBook {
    pub(crate) fn normalize(self, fallback_id: String) -> LoreBook {
        let id = self.id.unwrap_or_else(|| fallback_id.clone());
        let title = self
            .title
            .clone()
            .unwrap_or_else(|| LEGACY_LORE_BOOK_TITLE.to_string());
        let entries = match self.entries {
            Some(entries) => entries,
            None => vec![LoreEntry {
                id: format!("{}-0", fallback_id),
                title: self.title.unwrap_or_else(|| UNTITLED_LORE_ENTRY.to_string()),
                content: self.content.unwrap_or_default(),
            }],
        };
        LoreBook { id, title, entries }
    }
}

/// Profile as any earlier build may have stored it. Missing fields take the
/// defaults; a lone `worldbook` string becomes one lore book.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct StoredContactProfile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    addressing_form: Option<String>,
    #[serde(default)]
    user_role_in_world: Option<String>,
    #[serde(default)]
    character_role_in_world: Option<String>,
    #[serde(default)]
    style_description: Option<String>,
    #[serde(default, deserialize_with = "present_field")]
    opening_line: Option<Option<String>>,
    #[serde(default)]
    lore_books: Vec<StoredLoreBook>,
    #[serde(default)]
    worldbook: Option<String>,
}

/// Distinguishes an explicit `null` (user cleared the field) from an absent
/// field (older build, take the default).
fn present_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl StoredContactProfile {
    pub(crate) fn normalize(self, key: &str) -> ContactProfile {
        let defaults = ContactProfile::default_for(key);
        let mut lore_books: Vec<LoreBook> = self
            .lore_books
            .into_iter()
            .enumerate()
            .map(|(idx, book)| book.normalize(format!("wb-{}-{}", key, idx)))
            .collect();

        if lore_books.is_empty() {
            if let Some(legacy) = self.worldbook.filter(|w| !w.trim().is_empty()) {
                lore_books.push(LoreBook {
                    id: format!("wb-{}-legacy", key),
                    title: LEGACY_LORE_BOOK_TITLE.to_string(),
                    entries: vec![LoreEntry {
                        id: format!("e-{}-0", key),
                        title: UNTITLED_LORE_ENTRY.to_string(),
                        content: legacy,
                    }],
                });
            }
        }

        ContactProfile {
            id: self.id.unwrap_or_else(|| key.to_string()),
            display_name: self.display_name.unwrap_or(defaults.display_name),
            avatar: self.avatar.unwrap_or(defaults.avatar),
            avatar_url: self.avatar_url.filter(|u| !u.trim().is_empty()),
            addressing_form: self.addressing_form.unwrap_or(defaults.addressing_form),
            user_role_in_world: self
                .user_role_in_world
                .unwrap_or(defaults.user_role_in_world),
            character_role_in_world: self
                .character_role_in_world
                .unwrap_or(defaults.character_role_in_world),
            style_description: self.style_description.unwrap_or(defaults.style_description),
            opening_line: self.opening_line.unwrap_or(defaults.opening_line),
            lore_books,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_contact_requires_name_and_both_roles() {
        let missing_role = NewContact {
            display_name: "阿澈".to_string(),
            user_role_in_world: "  ".to_string(),
            character_role_in_world: "学长".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            missing_role.into_profile(),
            Err(ChatError::InvalidContact(_))
        ));

        let profile = NewContact {
            display_name: " 阿澈 ".to_string(),
            user_role_in_world: "学妹".to_string(),
            character_role_in_world: "学长".to_string(),
            opening_line: "   ".to_string(),
            ..Default::default()
        }
        .into_profile()
        .expect("valid contact");
        assert!(profile.id.starts_with("friend_"));
        assert_eq!(profile.display_name, "阿澈");
        assert_eq!(profile.addressing_form, DEFAULT_ADDRESSING_FORM);
        assert_eq!(profile.opening_line, None);
    }

    #[test]
    fn opening_line_ignores_blank_text() {
        let mut profile = ContactProfile::default_companion();
        assert_eq!(profile.opening_line(), Some(DEFAULT_OPENING_LINE));
        profile.opening_line = Some("  \n".to_string());
        assert_eq!(profile.opening_line(), None);
    }

    #[test]
    fn lore_book_renders_default_titles() {
        let book = LoreBook {
            id: "b".to_string(),
            title: String::new(),
            entries: vec![
                LoreEntry {
                    id: "1".to_string(),
                    title: "城市".to_string(),
                    content: "樱花小镇".to_string(),
                },
                LoreEntry {
                    id: "2".to_string(),
                    title: String::new(),
                    content: "冬天会下雪".to_string(),
                },
            ],
        };
        assert_eq!(
            book.render(),
            "【未命名世界书】\n- 城市：樱花小镇\n- 条目：冬天会下雪"
        );
    }

    #[test]
    fn lore_entry_helpers_edit_in_place() {
        let mut profile = ContactProfile::default_companion();
        let book_id = profile.add_lore_book("魔法学院");
        let entry_id = profile
            .add_lore_entry(&book_id, "校规", "禁止夜游")
            .expect("book exists");
        assert!(profile.update_lore_entry(&book_id, &entry_id, None, Some("允许夜游".to_string())));
        assert_eq!(profile.lore_books[0].entries[0].content, "允许夜游");
        assert!(profile.remove_lore_entry(&book_id, &entry_id));
        assert!(profile.lore_books[0].entries.is_empty());
        assert!(profile.add_lore_entry("missing", "x", "y").is_none());
        assert!(profile.remove_lore_book(&book_id));
    }

    #[test]
    fn legacy_profile_gains_defaults_and_single_worldbook() {
        let stored: StoredContactProfile = serde_json::from_value(serde_json::json!({
            "display_name": "旧好友",
            "worldbook": "这里一直在下雨"
        }))
        .expect("parse legacy profile");
        let profile = stored.normalize("friend_old");

        assert_eq!(profile.id, "friend_old");
        assert_eq!(profile.display_name, "旧好友");
        assert_eq!(profile.character_role_in_world, DEFAULT_CHARACTER_ROLE);
        assert_eq!(profile.lore_books.len(), 1);
        assert_eq!(profile.lore_books[0].title, LEGACY_LORE_BOOK_TITLE);
        assert_eq!(profile.lore_books[0].entries[0].content, "这里一直在下雨");
        assert_eq!(profile.opening_line(), Some(DEFAULT_OPENING_LINE));
    }

    #[test]
    fn cleared_opening_line_survives_reload() {
        let mut profile = ContactProfile::default_companion();
        profile.opening_line = None;
        let json = serde_json::to_value(&profile).expect("serialize");
        let stored: StoredContactProfile = serde_json::from_value(json).expect("parse");
        assert_eq!(stored.normalize(DEFAULT_CONTACT_ID).opening_line, None);
    }

    #[test]
    fn legacy_lore_book_without_entries_becomes_one_entry() {
        let stored: StoredLoreBook = serde_json::from_value(serde_json::json!({
            "title": "冬日咖啡馆",
            "content": "店长是猫"
        }))
        .expect("parse legacy book");
        let book = stored.normalize("wb-0".to_string());
        assert_eq!(book.id, "wb-0");
        assert_eq!(book.title, "冬日咖啡馆");
        assert_eq!(book.entries.len(), 1);
        assert_eq!(book.entries[0].content, "店长是猫");
    }
}
