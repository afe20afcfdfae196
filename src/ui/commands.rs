use tinyphone_backend::persona::{ContactPatch, NewContact, StickerFormat};

pub const HELP: &str = "\
命令:
  /contacts                      联系人列表
  /open <序号|id>                打开聊天
  /back                          返回联系人列表
  /new 名字|我的身份|TA的身份[|称呼|风格|开场白]
  /profile [字段 值]             查看或修改当前联系人
                                 字段: name avatar avatar_url address me role style opening
  /lore                          当前联系人的世界书
  /lore book <标题>              新建世界书
  /lore rename <书> <标题>       重命名世界书
  /lore rmbook <书>              删除世界书
  /lore add <书> <标题>|<内容>   添加条目
  /lore edit <书> <条目> <标题>|<内容>
  /lore rm <书> <条目>           删除条目
  /worldbook [show]              全局世界书列表（show 显示全文）
  /worldbook add <标题>|<内容>
  /worldbook edit <序号> <标题>|<内容>
  /worldbook rm <序号>
  /sticker                       表情包列表
  /sticker group <名字>          新建分组
  /sticker regroup <组> <名字>   重命名分组
  /sticker rmgroup <组>          删除分组
  /sticker add <组> <名字> <url> [gif]
  /sticker rename <组> <序号> <名字>
  /sticker rm <组> <序号>
  /clear                         清空当前聊天
  /voice <秒数> <文字>           发一条语音消息（排队）
  /send [文字]                   发送并等待回复
  /models                        列出可用模型
  /set url|key|model <值>        设置 AI 接口
  /help                          帮助
  /quit                          退出
其他输入会作为一条消息排队，/send 时一起发送。序号从 1 开始。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointField {
    BaseUrl,
    ApiKey,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    DisplayName,
    Avatar,
    AvatarUrl,
    AddressingForm,
    UserRole,
    CharacterRole,
    Style,
    OpeningLine,
}

impl ProfileField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "name" => ProfileField::DisplayName,
            "avatar" => ProfileField::Avatar,
            "avatar_url" => ProfileField::AvatarUrl,
            "address" => ProfileField::AddressingForm,
            "me" => ProfileField::UserRole,
            "role" => ProfileField::CharacterRole,
            "style" => ProfileField::Style,
            "opening" => ProfileField::OpeningLine,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            ProfileField::DisplayName => "名字",
            ProfileField::Avatar => "头像",
            ProfileField::AvatarUrl => "头像图片",
            ProfileField::AddressingForm => "称呼",
            ProfileField::UserRole => "我的身份",
            ProfileField::CharacterRole => "TA的身份",
            ProfileField::Style => "风格",
            ProfileField::OpeningLine => "开场白",
        }
    }

    /// A patch touching only this field. Blank values clear the optional
    /// fields.
    pub fn patch(self, value: String) -> ContactPatch {
        let optional = Some(value.clone()).filter(|v| !v.trim().is_empty());
        let mut patch = ContactPatch::default();
        match self {
            ProfileField::DisplayName => patch.display_name = Some(value),
            ProfileField::Avatar => patch.avatar = Some(value),
            ProfileField::AvatarUrl => patch.avatar_url = Some(optional),
            ProfileField::AddressingForm => patch.addressing_form = Some(value),
            ProfileField::UserRole => patch.user_role_in_world = Some(value),
            ProfileField::CharacterRole => patch.character_role_in_world = Some(value),
            ProfileField::Style => patch.style_description = Some(value),
            ProfileField::OpeningLine => patch.opening_line = Some(optional),
        }
        patch
    }
}

/// Lore books of the open contact. Book and entry numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoreCommand {
    List,
    AddBook(String),
    RenameBook { book: usize, title: String },
    RemoveBook(usize),
    AddEntry { book: usize, title: String, content: String },
    EditEntry { book: usize, entry: usize, title: String, content: String },
    RemoveEntry { book: usize, entry: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldbookCommand {
    List,
    Show,
    Add { title: String, content: String },
    Edit { book: usize, title: String, content: String },
    Remove(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StickerCommand {
    List,
    AddGroup(String),
    RenameGroup { group: usize, name: String },
    RemoveGroup(usize),
    Add { group: usize, name: String, url: String, format: StickerFormat },
    Rename { group: usize, sticker: usize, name: String },
    Remove { group: usize, sticker: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Contacts,
    Open(String),
    Back,
    New(NewContactInput),
    ShowProfile,
    EditProfile(ProfileField, String),
    Lore(LoreCommand),
    Worldbook(WorldbookCommand),
    Sticker(StickerCommand),
    Clear,
    Voice { seconds: u32, text: String },
    Send(Option<String>),
    Models,
    Set(EndpointField, String),
    Help,
    Quit,
    Say(String),
    Empty,
    Invalid(String),
}

/// Fields of `/new`, kept as typed so validation happens in one place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewContactInput {
    pub display_name: String,
    pub user_role_in_world: String,
    pub character_role_in_world: String,
    pub addressing_form: String,
    pub style_description: String,
    pub opening_line: String,
}

impl From<NewContactInput> for NewContact {
    fn from(input: NewContactInput) -> Self {
        NewContact {
            display_name: input.display_name,
            addressing_form: input.addressing_form,
            user_role_in_world: input.user_role_in_world,
            character_role_in_world: input.character_role_in_world,
            style_description: input.style_description,
            opening_line: input.opening_line,
        }
    }
}

fn parse_new_contact(rest: &str) -> NewContactInput {
    let mut fields = rest.split('|').map(|f| f.trim().to_string());
    let mut next = || fields.next().unwrap_or_default();
    NewContactInput {
        display_name: next(),
        user_role_in_world: next(),
        character_role_in_world: next(),
        addressing_form: next(),
        style_description: next(),
        opening_line: next(),
    }
}

/// First whitespace-separated word and the trimmed remainder.
fn split_word(input: &str) -> (&str, &str) {
    match input.trim().split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input.trim(), ""),
    }
}

/// A 1-based position.
fn position(word: &str) -> Option<usize> {
    word.parse::<usize>().ok().filter(|n| *n > 0)
}

/// `title|content`; without a `|` the whole input is the content.
fn title_and_content(input: &str) -> (String, String) {
    match input.split_once('|') {
        Some((title, content)) => (title.trim().to_string(), content.trim().to_string()),
        None => (String::new(), input.trim().to_string()),
    }
}

fn parse_profile(rest: &str) -> Command {
    if rest.is_empty() {
        return Command::ShowProfile;
    }
    let (field, value) = split_word(rest);
    match ProfileField::parse(field) {
        Some(field) => Command::EditProfile(field, value.to_string()),
        None => Command::Invalid(
            "用法: /profile <name|avatar|avatar_url|address|me|role|style|opening> <值>"
                .to_string(),
        ),
    }
}

fn parse_lore(rest: &str) -> Option<LoreCommand> {
    let (action, args) = split_word(rest);
    Some(match action {
        "" | "list" => LoreCommand::List,
        "book" if !args.is_empty() => LoreCommand::AddBook(args.to_string()),
        "rename" => {
            let (book, title) = split_word(args);
            LoreCommand::RenameBook {
                book: position(book)?,
                title: Some(title.to_string()).filter(|t| !t.is_empty())?,
            }
        }
        "rmbook" => LoreCommand::RemoveBook(position(args)?),
        "add" => {
            let (book, body) = split_word(args);
            let (title, content) = title_and_content(body);
            if content.is_empty() {
                return None;
            }
            LoreCommand::AddEntry {
                book: position(book)?,
                title,
                content,
            }
        }
        "edit" => {
            let (book, rest) = split_word(args);
            let (entry, body) = split_word(rest);
            let (title, content) = title_and_content(body);
            LoreCommand::EditEntry {
                book: position(book)?,
                entry: position(entry)?,
                title,
                content,
            }
        }
        "rm" => {
            let (book, entry) = split_word(args);
            LoreCommand::RemoveEntry {
                book: position(book)?,
                entry: position(entry)?,
            }
        }
        _ => return None,
    })
}

fn parse_worldbook(rest: &str) -> Option<WorldbookCommand> {
    let (action, args) = split_word(rest);
    Some(match action {
        "" | "list" => WorldbookCommand::List,
        "show" => WorldbookCommand::Show,
        "add" => {
            let (title, content) = title_and_content(args);
            WorldbookCommand::Add { title, content }
        }
        "edit" => {
            let (book, body) = split_word(args);
            let (title, content) = title_and_content(body);
            WorldbookCommand::Edit {
                book: position(book)?,
                title,
                content,
            }
        }
        "rm" => WorldbookCommand::Remove(position(args)?),
        _ => return None,
    })
}

fn parse_sticker(rest: &str) -> Option<StickerCommand> {
    let (action, args) = split_word(rest);
    Some(match action {
        "" | "list" => StickerCommand::List,
        "group" if !args.is_empty() => StickerCommand::AddGroup(args.to_string()),
        "regroup" => {
            let (group, name) = split_word(args);
            StickerCommand::RenameGroup {
                group: position(group)?,
                name: Some(name.to_string()).filter(|n| !n.is_empty())?,
            }
        }
        "rmgroup" => StickerCommand::RemoveGroup(position(args)?),
        "add" => {
            let words: Vec<&str> = args.split_whitespace().collect();
            let format = match words.get(3).copied() {
                None => StickerFormat::Static,
                Some("gif") => StickerFormat::Gif,
                Some(_) => return None,
            };
            if words.len() < 3 || words.len() > 4 {
                return None;
            }
            StickerCommand::Add {
                group: position(words[0])?,
                name: words[1].to_string(),
                url: words[2].to_string(),
                format,
            }
        }
        "rename" => {
            let (group, rest) = split_word(args);
            let (sticker, name) = split_word(rest);
            StickerCommand::Rename {
                group: position(group)?,
                sticker: position(sticker)?,
                name: Some(name.to_string()).filter(|n| !n.is_empty())?,
            }
        }
        "rm" => {
            let (group, sticker) = split_word(args);
            StickerCommand::Remove {
                group: position(group)?,
                sticker: position(sticker)?,
            }
        }
        _ => return None,
    })
}

fn parse_voice(rest: &str) -> Command {
    let (seconds, text) = split_word(rest);
    match seconds.parse::<u32>() {
        Ok(seconds) if !text.is_empty() => Command::Voice {
            seconds,
            text: text.to_string(),
        },
        _ => Command::Invalid("用法: /voice <秒数> <文字>".to_string()),
    }
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        match name {
            "contacts" | "list" => Command::Contacts,
            "open" if !rest.is_empty() => Command::Open(rest.to_string()),
            "open" => Command::Invalid("用法: /open <序号|id>".to_string()),
            "back" => Command::Back,
            "new" => Command::New(parse_new_contact(rest)),
            "profile" => parse_profile(rest),
            "lore" => parse_lore(rest)
                .map(Command::Lore)
                .unwrap_or_else(|| Command::Invalid("用法见 /help 中的 /lore".to_string())),
            "worldbook" => parse_worldbook(rest)
                .map(Command::Worldbook)
                .unwrap_or_else(|| Command::Invalid("用法见 /help 中的 /worldbook".to_string())),
            "sticker" => parse_sticker(rest)
                .map(Command::Sticker)
                .unwrap_or_else(|| Command::Invalid("用法见 /help 中的 /sticker".to_string())),
            "clear" => Command::Clear,
            "voice" => parse_voice(rest),
            "send" => Command::Send(Some(rest.to_string()).filter(|r| !r.is_empty())),
            "models" => Command::Models,
            "set" => {
                let (field, value) = match rest.split_once(char::is_whitespace) {
                    Some((field, value)) => (field, value.trim()),
                    None => (rest, ""),
                };
                let field = match field {
                    "url" | "base_url" => EndpointField::BaseUrl,
                    "key" | "api_key" => EndpointField::ApiKey,
                    "model" => EndpointField::Model,
                    _ => return Command::Invalid("用法: /set url|key|model <值>".to_string()),
                };
                Command::Set(field, value.to_string())
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Invalid(format!("未知命令: /{}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(Command::parse("  你好  "), Command::Say("你好".to_string()));
        assert_eq!(Command::parse("   "), Command::Empty);
    }

    #[test]
    fn send_takes_optional_text() {
        assert_eq!(Command::parse("/send"), Command::Send(None));
        assert_eq!(
            Command::parse("/send 晚安"),
            Command::Send(Some("晚安".to_string()))
        );
    }

    #[test]
    fn new_contact_fields_split_on_pipes() {
        let Command::New(input) = Command::parse("/new 阿澈 | 学妹 | 学长 | 小笨蛋") else {
            panic!("expected /new");
        };
        assert_eq!(input.display_name, "阿澈");
        assert_eq!(input.user_role_in_world, "学妹");
        assert_eq!(input.character_role_in_world, "学长");
        assert_eq!(input.addressing_form, "小笨蛋");
        assert!(input.opening_line.is_empty());
    }

    #[test]
    fn voice_takes_seconds_then_text() {
        assert_eq!(
            Command::parse("/voice 5 今天好累呀"),
            Command::Voice {
                seconds: 5,
                text: "今天好累呀".to_string()
            }
        );
        assert!(matches!(Command::parse("/voice 今天"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/voice 5"), Command::Invalid(_)));
    }

    #[test]
    fn profile_edits_name_a_field() {
        assert_eq!(Command::parse("/profile"), Command::ShowProfile);
        assert_eq!(
            Command::parse("/profile style 说话带点小傲娇"),
            Command::EditProfile(ProfileField::Style, "说话带点小傲娇".to_string())
        );
        assert!(matches!(Command::parse("/profile height 180"), Command::Invalid(_)));

        let patch = ProfileField::OpeningLine.patch(String::new());
        assert_eq!(patch.opening_line, Some(None));
        assert!(patch.display_name.is_none());
        let patch = ProfileField::DisplayName.patch("阿澈".to_string());
        assert_eq!(patch.display_name.as_deref(), Some("阿澈"));
    }

    #[test]
    fn lore_commands_use_one_based_positions() {
        assert_eq!(Command::parse("/lore"), Command::Lore(LoreCommand::List));
        assert_eq!(
            Command::parse("/lore book 星港"),
            Command::Lore(LoreCommand::AddBook("星港".to_string()))
        );
        assert_eq!(
            Command::parse("/lore add 1 城市|海边的小城"),
            Command::Lore(LoreCommand::AddEntry {
                book: 1,
                title: "城市".to_string(),
                content: "海边的小城".to_string()
            })
        );
        assert_eq!(
            Command::parse("/lore edit 2 3 规矩|晚上十点后不许出门"),
            Command::Lore(LoreCommand::EditEntry {
                book: 2,
                entry: 3,
                title: "规矩".to_string(),
                content: "晚上十点后不许出门".to_string()
            })
        );
        assert_eq!(
            Command::parse("/lore rm 1 2"),
            Command::Lore(LoreCommand::RemoveEntry { book: 1, entry: 2 })
        );
        assert!(matches!(Command::parse("/lore rmbook 0"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/lore add 1"), Command::Invalid(_)));
    }

    #[test]
    fn worldbook_entries_split_title_and_content() {
        assert_eq!(
            Command::parse("/worldbook add 大陆|魔法与蒸汽并存"),
            Command::Worldbook(WorldbookCommand::Add {
                title: "大陆".to_string(),
                content: "魔法与蒸汽并存".to_string()
            })
        );
        assert_eq!(
            Command::parse("/worldbook add 只有内容"),
            Command::Worldbook(WorldbookCommand::Add {
                title: String::new(),
                content: "只有内容".to_string()
            })
        );
        assert_eq!(
            Command::parse("/worldbook rm 2"),
            Command::Worldbook(WorldbookCommand::Remove(2))
        );
        assert_eq!(
            Command::parse("/worldbook show"),
            Command::Worldbook(WorldbookCommand::Show)
        );
    }

    #[test]
    fn sticker_add_takes_an_optional_format() {
        assert_eq!(
            Command::parse("/sticker add 1 抱抱 https://img.test/hug.gif gif"),
            Command::Sticker(StickerCommand::Add {
                group: 1,
                name: "抱抱".to_string(),
                url: "https://img.test/hug.gif".to_string(),
                format: StickerFormat::Gif
            })
        );
        assert_eq!(
            Command::parse("/sticker add 2 开心 https://img.test/happy.png"),
            Command::Sticker(StickerCommand::Add {
                group: 2,
                name: "开心".to_string(),
                url: "https://img.test/happy.png".to_string(),
                format: StickerFormat::Static
            })
        );
        assert!(matches!(
            Command::parse("/sticker add 1 抱抱 https://img.test/hug.webp webp"),
            Command::Invalid(_)
        ));
        assert_eq!(
            Command::parse("/sticker group 日常"),
            Command::Sticker(StickerCommand::AddGroup("日常".to_string()))
        );
        assert_eq!(
            Command::parse("/sticker rename 1 2 贴贴"),
            Command::Sticker(StickerCommand::Rename {
                group: 1,
                sticker: 2,
                name: "贴贴".to_string()
            })
        );
        assert!(matches!(Command::parse("/sticker rm 1"), Command::Invalid(_)));
    }

    #[test]
    fn set_requires_a_known_field() {
        assert_eq!(
            Command::parse("/set model gpt-4o-mini"),
            Command::Set(EndpointField::Model, "gpt-4o-mini".to_string())
        );
        assert!(matches!(Command::parse("/set colour red"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/dance"), Command::Invalid(_)));
    }
}
