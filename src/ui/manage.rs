use tinyphone_backend::persona::{ContactProfile, LoreEntry, StickerFormat};
use tinyphone_backend::settings::SettingsStore;

use super::commands::{LoreCommand, ProfileField, StickerCommand, WorldbookCommand};

const NOT_FOUND: &str = "找不到这个序号";

pub fn render_profile(profile: &ContactProfile) -> String {
    let rows = [
        (ProfileField::DisplayName, profile.display_name.as_str()),
        (ProfileField::Avatar, profile.avatar.as_str()),
        (
            ProfileField::AvatarUrl,
            profile.avatar_url.as_deref().unwrap_or_default(),
        ),
        (ProfileField::AddressingForm, profile.addressing_form.as_str()),
        (ProfileField::UserRole, profile.user_role_in_world.as_str()),
        (ProfileField::CharacterRole, profile.character_role_in_world.as_str()),
        (ProfileField::Style, profile.style_description.as_str()),
        (ProfileField::OpeningLine, profile.opening_line().unwrap_or_default()),
    ];
    let mut lines = vec![format!("[{}]", profile.id)];
    lines.extend(
        rows.iter()
            .map(|(field, value)| format!("  {}: {}", field.label(), value)),
    );
    lines.join("\n")
}

pub fn edit_profile(
    settings: &SettingsStore,
    contact_id: &str,
    field: ProfileField,
    value: String,
) -> String {
    let profile = settings.update_contact(contact_id, field.patch(value));
    format!("已更新{}\n{}", field.label(), render_profile(&profile))
}

fn render_lore_books(profile: &ContactProfile) -> String {
    if profile.lore_books.is_empty() {
        return "（还没有世界书）".to_string();
    }
    profile
        .lore_books
        .iter()
        .enumerate()
        .map(|(i, book)| {
            let mut lines = vec![format!("{}. 【{}】", i + 1, book.title)];
            lines.extend(
                book.entries
                    .iter()
                    .enumerate()
                    .map(|(j, e)| format!("   {}. {}：{}", j + 1, e.title, e.content)),
            );
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs a lore command against one contact's books.
pub fn run_lore(settings: &SettingsStore, contact_id: &str, command: LoreCommand) -> String {
    let profile = settings.contact(contact_id);
    let find_book = |n: usize| profile.lore_books.get(n.checked_sub(1)?).map(|b| b.id.clone());
    let find_entry = |n: usize, m: usize| {
        profile
            .lore_books
            .get(n.checked_sub(1)?)
            .and_then(|b| b.entries.get(m.checked_sub(1)?))
            .map(|e| e.id.clone())
    };

    let done = match command {
        LoreCommand::List => return render_lore_books(&profile),
        LoreCommand::AddBook(title) => {
            settings.edit_contact_lore(contact_id, |p| p.add_lore_book(&title));
            true
        }
        LoreCommand::RenameBook { book, title } => match find_book(book) {
            Some(id) => settings.edit_contact_lore(contact_id, |p| p.rename_lore_book(&id, &title)),
            None => false,
        },
        LoreCommand::RemoveBook(book) => match find_book(book) {
            Some(id) => settings.edit_contact_lore(contact_id, |p| p.remove_lore_book(&id)),
            None => false,
        },
        LoreCommand::AddEntry {
            book,
            title,
            content,
        } => match find_book(book) {
            Some(id) => settings
                .edit_contact_lore(contact_id, |p| p.add_lore_entry(&id, &title, &content))
                .is_some(),
            None => false,
        },
        LoreCommand::EditEntry {
            book,
            entry,
            title,
            content,
        } => match (find_book(book), find_entry(book, entry)) {
            (Some(book_id), Some(entry_id)) => {
                let title = Some(title).filter(|t| !t.is_empty());
                let content = Some(content).filter(|c| !c.is_empty());
                settings.edit_contact_lore(contact_id, |p| {
                    p.update_lore_entry(&book_id, &entry_id, title, content)
                })
            }
            _ => false,
        },
        LoreCommand::RemoveEntry { book, entry } => match (find_book(book), find_entry(book, entry)) {
            (Some(book_id), Some(entry_id)) => settings
                .edit_contact_lore(contact_id, |p| p.remove_lore_entry(&book_id, &entry_id)),
            _ => false,
        },
    };

    if done {
        render_lore_books(&settings.contact(contact_id))
    } else {
        NOT_FOUND.to_string()
    }
}

pub fn run_worldbook(settings: &SettingsStore, command: WorldbookCommand) -> String {
    let snapshot = settings.snapshot();
    let done = match command {
        WorldbookCommand::List => {
            if snapshot.global_lore_books.is_empty() {
                return "（还没有全局世界书）".to_string();
            }
            return snapshot
                .global_lore_books
                .iter()
                .enumerate()
                .map(|(i, book)| format!("{}. 【{}】", i + 1, book.title))
                .collect::<Vec<_>>()
                .join("\n");
        }
        WorldbookCommand::Show => return settings.global_lore_text(),
        WorldbookCommand::Add { title, content } => {
            return match settings.add_global_lore_book(&title, &content) {
                Some(_) => "已添加".to_string(),
                None => "内容不能为空".to_string(),
            };
        }
        WorldbookCommand::Edit {
            book,
            title,
            content,
        } => match book.checked_sub(1).and_then(|i| snapshot.global_lore_books.get(i)) {
            Some(existing) => {
                let mut entries = existing.entries.clone();
                if !content.is_empty() {
                    match entries.first_mut() {
                        Some(first) => first.content = content,
                        None => entries.push(LoreEntry {
                            id: format!("{}_entry", existing.id),
                            title: existing.title.clone(),
                            content,
                        }),
                    }
                }
                let title = Some(title).filter(|t| !t.is_empty());
                settings.update_global_lore_book(&existing.id, title, Some(entries))
            }
            None => false,
        },
        WorldbookCommand::Remove(book) => match book
            .checked_sub(1)
            .and_then(|i| snapshot.global_lore_books.get(i))
        {
            Some(existing) => settings.remove_global_lore_book(&existing.id),
            None => false,
        },
    };

    if done {
        "已保存".to_string()
    } else {
        NOT_FOUND.to_string()
    }
}

fn render_stickers(settings: &SettingsStore) -> String {
    let snapshot = settings.snapshot();
    if snapshot.sticker_groups.is_empty() {
        return "（还没有表情包，用 /sticker group <名字> 新建分组）".to_string();
    }
    snapshot
        .sticker_groups
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let mut lines = vec![format!("{}. {}", i + 1, group.name)];
            lines.extend(group.stickers.iter().enumerate().map(|(j, s)| {
                let gif = match s.format {
                    StickerFormat::Gif => " (gif)",
                    StickerFormat::Static => "",
                };
                format!("   {}. {}{}  {}", j + 1, s.name, gif, s.url)
            }));
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn run_sticker(settings: &SettingsStore, command: StickerCommand) -> String {
    let snapshot = settings.snapshot();
    let find_group = |n: usize| snapshot.sticker_groups.get(n.checked_sub(1)?).map(|g| g.id.clone());
    let find_sticker = |n: usize, m: usize| {
        snapshot
            .sticker_groups
            .get(n.checked_sub(1)?)
            .and_then(|g| g.stickers.get(m.checked_sub(1)?))
            .map(|s| s.id.clone())
    };

    let done = match command {
        StickerCommand::List => return render_stickers(settings),
        StickerCommand::AddGroup(name) => {
            settings.add_sticker_group(&name);
            true
        }
        StickerCommand::RenameGroup { group, name } => match find_group(group) {
            Some(id) => settings.rename_sticker_group(&id, &name),
            None => false,
        },
        StickerCommand::RemoveGroup(group) => match find_group(group) {
            Some(id) => settings.remove_sticker_group(&id),
            None => false,
        },
        StickerCommand::Add {
            group,
            name,
            url,
            format,
        } => match find_group(group) {
            Some(id) => settings.add_sticker(&id, &name, &url, format).is_some(),
            None => false,
        },
        StickerCommand::Rename {
            group,
            sticker,
            name,
        } => match (find_group(group), find_sticker(group, sticker)) {
            (Some(group_id), Some(sticker_id)) => {
                settings.rename_sticker(&group_id, &sticker_id, &name)
            }
            _ => false,
        },
        StickerCommand::Remove { group, sticker } => {
            match (find_group(group), find_sticker(group, sticker)) {
                (Some(group_id), Some(sticker_id)) => {
                    settings.remove_sticker(&group_id, &sticker_id)
                }
                _ => false,
            }
        }
    };

    if done {
        render_stickers(settings)
    } else {
        NOT_FOUND.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tinyphone_backend::database::AppDatabase;
    use tinyphone_backend::persona::DEFAULT_CONTACT_ID;

    fn settings() -> SettingsStore {
        SettingsStore::load(Arc::new(AppDatabase::in_memory().expect("db")))
    }

    #[test]
    fn lore_commands_edit_the_contact_books() {
        let settings = settings();
        let id = DEFAULT_CONTACT_ID;

        run_lore(&settings, id, LoreCommand::AddBook("星港".to_string()));
        run_lore(
            &settings,
            id,
            LoreCommand::AddEntry {
                book: 1,
                title: "城市".to_string(),
                content: "海边的小城".to_string(),
            },
        );
        run_lore(
            &settings,
            id,
            LoreCommand::RenameBook {
                book: 1,
                title: "雾港".to_string(),
            },
        );
        let listing = run_lore(
            &settings,
            id,
            LoreCommand::EditEntry {
                book: 1,
                entry: 1,
                title: String::new(),
                content: "起雾的小城".to_string(),
            },
        );
        assert!(listing.contains("【雾港】"));
        assert!(listing.contains("城市：起雾的小城"));

        let books = settings.contact(id).lore_books;
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].entries[0].title, "城市");

        assert_eq!(
            run_lore(&settings, id, LoreCommand::RemoveEntry { book: 1, entry: 9 }),
            NOT_FOUND
        );
        run_lore(&settings, id, LoreCommand::RemoveBook(1));
        assert!(settings.contact(id).lore_books.is_empty());
    }

    #[test]
    fn sticker_commands_fill_the_matching_library() {
        let settings = settings();
        run_sticker(&settings, StickerCommand::AddGroup("日常".to_string()));
        run_sticker(
            &settings,
            StickerCommand::Add {
                group: 1,
                name: "抱抱".to_string(),
                url: "https://img.test/hug.gif".to_string(),
                format: StickerFormat::Gif,
            },
        );
        let listing = run_sticker(
            &settings,
            StickerCommand::Rename {
                group: 1,
                sticker: 1,
                name: "贴贴".to_string(),
            },
        );
        assert!(listing.contains("贴贴 (gif)"));

        let library = settings.sticker_library();
        assert_eq!(library.len(), 1);
        assert_eq!(library[0].name, "贴贴");

        assert_eq!(
            run_sticker(
                &settings,
                StickerCommand::Add {
                    group: 2,
                    name: "x".to_string(),
                    url: "u".to_string(),
                    format: StickerFormat::Static,
                },
            ),
            NOT_FOUND
        );
        run_sticker(&settings, StickerCommand::Remove { group: 1, sticker: 1 });
        assert!(settings.sticker_library().is_empty());
        run_sticker(&settings, StickerCommand::RemoveGroup(1));
        assert!(settings.snapshot().sticker_groups.is_empty());
    }

    #[test]
    fn worldbook_commands_manage_global_lore() {
        let settings = settings();
        assert_eq!(
            run_worldbook(
                &settings,
                WorldbookCommand::Add {
                    title: "大陆".to_string(),
                    content: "  ".to_string(),
                },
            ),
            "内容不能为空"
        );
        run_worldbook(
            &settings,
            WorldbookCommand::Add {
                title: "大陆".to_string(),
                content: "魔法与蒸汽并存".to_string(),
            },
        );
        run_worldbook(
            &settings,
            WorldbookCommand::Edit {
                book: 1,
                title: "新大陆".to_string(),
                content: "蒸汽时代".to_string(),
            },
        );
        assert_eq!(run_worldbook(&settings, WorldbookCommand::List), "1. 【新大陆】");
        assert!(run_worldbook(&settings, WorldbookCommand::Show).contains("蒸汽时代"));

        run_worldbook(&settings, WorldbookCommand::Remove(1));
        assert!(settings.snapshot().global_lore_books.is_empty());
    }

    #[test]
    fn profile_edits_apply_to_the_open_contact() {
        let settings = settings();
        let out = edit_profile(
            &settings,
            DEFAULT_CONTACT_ID,
            ProfileField::Style,
            "说话带点小傲娇".to_string(),
        );
        assert!(out.contains("说话带点小傲娇"));
        assert_eq!(
            settings.contact(DEFAULT_CONTACT_ID).style_description,
            "说话带点小傲娇"
        );

        edit_profile(
            &settings,
            DEFAULT_CONTACT_ID,
            ProfileField::OpeningLine,
            String::new(),
        );
        assert!(settings.contact(DEFAULT_CONTACT_ID).opening_line().is_none());
    }
}
