//! Builds the role-tagged prompt for one reply cycle.
//!
//! Segment order is fixed: framing, lore, the user's identity, addressing,
//! character + style, the optional voice rule, history, the new message.
//! Every persona-derived segment is skipped when its source field is blank.

use crate::conversation::{Message, Sender};
use crate::llm_client::ChatMessage;
use crate::persona::ContactProfile;

pub const BASE_FRAMING: &str =
    "你是一位性格温柔、说话软糯糯的乙女游戏 AI 角色，用轻松治愈的语气和玩家聊天。";

const LORE_PREAMBLE: &str =
    "你必须严格遵守下面给出的世界书设定，这些信息高于普通对话内容，不能与之矛盾。";

const VOICE_RULE: &str = "当你的某句话会以语音形式发出时，这句话里只能出现真正说出口的话，\
     以及语气、音量、停顿之类的声音表现描述；不要写内心独白、动作或舞台说明。";

#[derive(Debug, Clone, Copy)]
pub struct PromptOptions {
    /// Emit the spoken-words-only rule for voice messages.
    pub voice_rule: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self { voice_rule: true }
    }
}

pub fn assemble_prompt(
    profile: &ContactProfile,
    history: &[Message],
    new_user_message: Option<&str>,
    options: PromptOptions,
) -> Vec<ChatMessage> {
    let mut prompt = persona_segments(profile, options);

    prompt.extend(history.iter().map(|message| match message.sender {
        Sender::User => ChatMessage::user(message.prompt_content()),
        Sender::Companion => ChatMessage::assistant(message.prompt_content()),
    }));

    if let Some(text) = new_user_message.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push(ChatMessage::user(text));
    }

    prompt
}

/// The system segments derived from the profile alone.
pub fn persona_segments(profile: &ContactProfile, options: PromptOptions) -> Vec<ChatMessage> {
    let mut segments = vec![ChatMessage::system(BASE_FRAMING)];

    if !profile.lore_books.is_empty() {
        let books: Vec<String> = profile.lore_books.iter().map(|b| b.render()).collect();
        segments.push(ChatMessage::system(format!(
            "{}\n{}",
            LORE_PREAMBLE,
            books.join("\n\n")
        )));
    }

    let user_role = profile.user_role_in_world.trim();
    if !user_role.is_empty() {
        segments.push(ChatMessage::system(format!(
            "玩家在这个世界中的身份：{}",
            user_role
        )));
    }

    let addressing = profile.addressing_form.trim();
    if !addressing.is_empty() {
        segments.push(ChatMessage::system(format!(
            "你在对话中称呼玩家为「{}」",
            addressing
        )));
    }

    let character_role = profile.character_role_in_world.trim();
    let style = profile.style_description.trim();
    if !character_role.is_empty() || !style.is_empty() {
        let mut content = format!(
            "你的角色身份：{}",
            if character_role.is_empty() {
                "未设置"
            } else {
                character_role
            }
        );
        if !style.is_empty() {
            content.push_str(&format!("。你的说话风格：{}", style));
        }
        segments.push(ChatMessage::system(content));
    }

    if options.voice_rule {
        segments.push(ChatMessage::system(VOICE_RULE));
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::MessageDraft;
    use crate::llm_client::ChatRole;
    use crate::persona::{LoreBook, LoreEntry};

    fn bare_profile() -> ContactProfile {
        ContactProfile {
            user_role_in_world: String::new(),
            addressing_form: String::new(),
            character_role_in_world: String::new(),
            style_description: String::new(),
            ..ContactProfile::default_companion()
        }
    }

    fn message(id: u64, draft: MessageDraft) -> Message {
        draft.into_message(id, 1_700_000_000_000 + id as i64 * 1000)
    }

    #[test]
    fn blank_fields_emit_no_segments() {
        let prompt = assemble_prompt(
            &bare_profile(),
            &[],
            None,
            PromptOptions { voice_rule: false },
        );
        assert_eq!(prompt, vec![ChatMessage::system(BASE_FRAMING)]);
    }

    #[test]
    fn segments_follow_fixed_order() {
        let mut profile = bare_profile();
        profile.user_role_in_world = "魔法学徒".to_string();
        profile.addressing_form = "小猫咪".to_string();
        profile.style_description = "傲娇".to_string();
        profile.lore_books = vec![LoreBook {
            id: "b1".to_string(),
            title: "魔法学院".to_string(),
            entries: vec![LoreEntry {
                id: "e1".to_string(),
                title: "校规".to_string(),
                content: "禁止夜游".to_string(),
            }],
        }];

        let prompt = persona_segments(&profile, PromptOptions::default());
        let contents: Vec<&str> = prompt.iter().map(|m| m.content.as_str()).collect();

        assert_eq!(contents.len(), 6);
        assert_eq!(contents[0], BASE_FRAMING);
        assert!(contents[1].starts_with(LORE_PREAMBLE));
        assert!(contents[1].contains("【魔法学院】\n- 校规：禁止夜游"));
        assert_eq!(contents[2], "玩家在这个世界中的身份：魔法学徒");
        assert_eq!(contents[3], "你在对话中称呼玩家为「小猫咪」");
        assert_eq!(contents[4], "你的角色身份：未设置。你的说话风格：傲娇");
        assert_eq!(contents[5], VOICE_RULE);
        assert!(prompt.iter().all(|m| m.role == ChatRole::System));
    }

    #[test]
    fn history_maps_roles_and_flattens_payloads() {
        let history = vec![
            message(1, MessageDraft::user_text("在吗")),
            message(2, MessageDraft::companion_voice("在的哦", 1)),
            message(
                3,
                MessageDraft::companion_sticker("https://img/hug.png", "抱抱"),
            ),
        ];

        let prompt = assemble_prompt(
            &bare_profile(),
            &history,
            Some("  今天好累  "),
            PromptOptions { voice_rule: false },
        );

        let tail: Vec<(ChatRole, &str)> = prompt[1..]
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            tail,
            vec![
                (ChatRole::User, "在吗"),
                (ChatRole::Assistant, "在的哦"),
                (ChatRole::Assistant, "抱抱"),
                (ChatRole::User, "今天好累"),
            ]
        );
    }
}
