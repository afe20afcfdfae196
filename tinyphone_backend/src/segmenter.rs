//! Splitting a reply into paced segments and deriving voice transcripts.

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};

pub const MIN_REVEAL_DELAY_MS: u64 = 400;
pub const MAX_REVEAL_DELAY_MS: u64 = 6000;
const DELAY_PER_CHAR_MS: u64 = 35;

const VOICE_CHARS_PER_SECOND: f64 = 3.5;
pub const MAX_VOICE_SECONDS: u32 = 60;

/// Words that mark a parenthesized aside as describing the voice itself.
const VOCAL_KEYWORDS: &[&str] = &[
    "说", "语气", "轻声", "小声", "大声", "低声", "温柔", "笑", "哭腔", "叹气", "哽咽", "撒娇",
    "声音", "said", "tone", "softly", "loudly", "whisper", "sigh", "laugh",
];

/// Blank-line blocks first, then single lines; trimmed, empties dropped.
pub fn split_reply(reply: &str) -> Vec<String> {
    let normalized = reply.replace("\r\n", "\n");
    let mut segments = Vec::new();
    let mut block = String::new();

    let flush = |block: &mut String, segments: &mut Vec<String>| {
        segments.extend(
            block
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        block.clear();
    };

    for line in normalized.split('\n') {
        if line.trim().is_empty() {
            flush(&mut block, &mut segments);
        } else {
            block.push_str(line);
            block.push('\n');
        }
    }
    flush(&mut block, &mut segments);
    segments
}

/// Delay before the segment following one of `char_len` characters.
pub fn reveal_delay_ms(char_len: usize) -> u64 {
    (MIN_REVEAL_DELAY_MS + DELAY_PER_CHAR_MS * char_len as u64)
        .clamp(MIN_REVEAL_DELAY_MS, MAX_REVEAL_DELAY_MS)
}

fn stage_direction_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[[^\]]*\]|\*[^*]*\*|【[^】]*】").ok())
        .as_ref()
}

fn aside_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\([^)]*\)|（[^）]*）").ok())
        .as_ref()
}

fn is_vocal_aside(aside: &str) -> bool {
    let lower = aside.to_lowercase();
    VOCAL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// The words actually spoken in a segment, or `None` when the segment is
/// nothing but stage directions.
///
/// Bracketed stage directions are removed; parenthesized asides survive
/// only when they describe the voice.
pub fn voice_transcript(segment: &str) -> Option<String> {
    let mut text = segment.to_string();

    if let Some(re) = stage_direction_pattern() {
        text = re.replace_all(&text, "").into_owned();
    }
    if let Some(re) = aside_pattern() {
        text = re
            .replace_all(&text, |caps: &Captures| {
                let aside = &caps[0];
                if is_vocal_aside(aside) {
                    aside.to_string()
                } else {
                    String::new()
                }
            })
            .into_owned();
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed).filter(|t| !t.is_empty())
}

/// `ceil(len / 3.5)` seconds, kept within 1..=60.
pub fn voice_duration_seconds(transcript: &str) -> u32 {
    let chars = transcript.chars().count() as f64;
    ((chars / VOICE_CHARS_PER_SECOND).ceil() as u32).clamp(1, MAX_VOICE_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_blocks_then_lines() {
        assert_eq!(
            split_reply("嗨呀\n\n今天也要加油哦"),
            vec!["嗨呀".to_string(), "今天也要加油哦".to_string()]
        );
        assert_eq!(
            split_reply("  一  \r\n二\n\n\n  \n三\n"),
            vec!["一".to_string(), "二".to_string(), "三".to_string()]
        );
        assert!(split_reply(" \n\n \n").is_empty());
    }

    #[test]
    fn clean_single_line_is_one_segment() {
        assert_eq!(split_reply("  晚安  "), vec!["晚安".to_string()]);
    }

    #[test]
    fn reveal_delay_is_clamped() {
        assert_eq!(reveal_delay_ms(0), 400);
        assert_eq!(reveal_delay_ms(10), 750);
        assert_eq!(reveal_delay_ms(160), 6000);
        assert_eq!(reveal_delay_ms(10_000), 6000);
        for len in 0..300 {
            let delay = reveal_delay_ms(len);
            assert!((MIN_REVEAL_DELAY_MS..=MAX_REVEAL_DELAY_MS).contains(&delay));
        }
    }

    #[test]
    fn transcript_drops_stage_directions() {
        assert_eq!(
            voice_transcript("[抱住你] 我好想你 *脸红* 【心跳加速】真的").as_deref(),
            Some("我好想你 真的")
        );
        assert_eq!(voice_transcript("a [b] c [d]").as_deref(), Some("a c"));
    }

    #[test]
    fn transcript_keeps_only_vocal_asides() {
        assert_eq!(
            voice_transcript("（轻声）晚安啦（转身离开）").as_deref(),
            Some("（轻声）晚安啦")
        );
        assert_eq!(
            voice_transcript("(softly) good night (walks away)").as_deref(),
            Some("(softly) good night")
        );
    }

    #[test]
    fn nothing_spoken_yields_no_transcript() {
        assert_eq!(voice_transcript("  *点头*  "), None);
        assert_eq!(voice_transcript("[抱住你]（转身）"), None);
    }

    #[test]
    fn duration_rounds_up_and_clamps() {
        assert_eq!(voice_duration_seconds(""), 1);
        assert_eq!(voice_duration_seconds("一二三"), 1);
        assert_eq!(voice_duration_seconds("一二三四"), 2);
        assert_eq!(voice_duration_seconds(&"字".repeat(7)), 2);
        assert_eq!(voice_duration_seconds(&"字".repeat(1000)), 60);
    }
}
