//! Picking a sticker for a reply segment.

use crate::persona::Sticker;

/// Emotion and action words a segment may carry.
pub const STICKER_KEYWORDS: &[&str] = &[
    "开心", "高兴", "哈哈", "快乐", "难过", "伤心", "哭", "生气", "愤怒", "哼", "惊讶", "震惊",
    "哇", "害羞", "脸红", "累", "困", "晚安", "饿", "吃饭", "喜欢", "爱你", "抱抱", "亲亲",
    "再见", "拜拜", "好的", "可以", "点赞", "加油", "谢谢", "感谢", "对不起", "抱歉",
];

pub trait StickerMatcher: Send + Sync {
    /// A sticker from `library` that fits `text`, if any.
    fn classify(&self, text: &str, library: &[Sticker]) -> Option<Sticker>;
}

/// Keyword lookup followed by fuzzy name matching against the library.
///
/// Full containment (name in keyword or keyword in name) wins over partial
/// overlap; partial overlap tries the longest keyword sub-spans first.
#[derive(Debug, Clone)]
pub struct KeywordStickerMatcher {
    keywords: Vec<String>,
}

impl Default for KeywordStickerMatcher {
    fn default() -> Self {
        Self::new(STICKER_KEYWORDS.iter().map(|k| k.to_string()).collect())
    }
}

impl KeywordStickerMatcher {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }

    fn matched_keywords<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.keywords
            .iter()
            .map(String::as_str)
            .filter(|k| !k.is_empty() && text.contains(k))
            .collect()
    }
}

fn sub_spans(keyword: &str) -> Vec<String> {
    let chars: Vec<char> = keyword.chars().collect();
    let mut spans = Vec::new();
    for len in (1..=chars.len()).rev() {
        for start in 0..=chars.len() - len {
            spans.push(chars[start..start + len].iter().collect());
        }
    }
    spans
}

impl StickerMatcher for KeywordStickerMatcher {
    fn classify(&self, text: &str, library: &[Sticker]) -> Option<Sticker> {
        if library.is_empty() {
            return None;
        }
        let keywords = self.matched_keywords(text);
        if keywords.is_empty() {
            return None;
        }

        let named = || library.iter().filter(|s| !s.name.trim().is_empty());

        for keyword in &keywords {
            if let Some(sticker) = named().find(|s| {
                let name = s.name.trim();
                name.contains(keyword) || keyword.contains(name)
            }) {
                return Some(sticker.clone());
            }
        }

        for keyword in &keywords {
            for span in sub_spans(keyword) {
                if let Some(sticker) = named().find(|s| s.name.contains(span.as_str())) {
                    return Some(sticker.clone());
                }
            }
        }

        None
    }
}
