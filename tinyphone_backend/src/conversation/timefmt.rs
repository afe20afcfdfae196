//! Chat timestamp labels and separator rules.

use chrono::{DateTime, Datelike, Local, TimeZone, Weekday};

use super::Message;

/// Gap after which the view shows a time separator between two messages.
pub const TIME_SEPARATOR_GAP_MS: i64 = 5 * 60 * 1000;

/// `HH:MM` in local time, recorded on every message at creation.
pub fn clock_label(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "星期日",
        Weekday::Mon => "星期一",
        Weekday::Tue => "星期二",
        Weekday::Wed => "星期三",
        Weekday::Thu => "星期四",
        Weekday::Fri => "星期五",
        Weekday::Sat => "星期六",
    }
}

/// Relative label for a message time as seen at `now`.
pub fn format_chat_time_label<Tz>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let hm = at.format("%H:%M").to_string();

    if at.year() < now.year() {
        return format!(
            "{}年{:02}月{:02}日 {}",
            at.year(),
            at.month(),
            at.day(),
            hm
        );
    }

    let day_diff = now
        .date_naive()
        .signed_duration_since(at.date_naive())
        .num_days();

    if day_diff > 7 {
        return format!("{:02}月{:02}日 {}", at.month(), at.day(), hm);
    }

    match day_diff {
        i64::MIN..=0 => hm,
        1 => format!("昨天 {}", hm),
        2 => format!("前天 {} {}", weekday_label(at.weekday()), hm),
        _ => format!("{} {}", weekday_label(at.weekday()), hm),
    }
}

/// Label for a message in the local zone, falling back to the stored clock
/// label when the message has no timestamp.
pub fn message_time_label(message: &Message, now: &DateTime<Local>) -> String {
    message
        .timestamp
        .and_then(|ts| Local.timestamp_millis_opt(ts).single())
        .map(|at| format_chat_time_label(&at, now))
        .unwrap_or_else(|| message.display_time_label.clone())
}

/// The first message always gets a separator; later ones only after a gap.
pub fn needs_time_separator(previous: Option<&Message>, current: &Message) -> bool {
    match previous {
        None => true,
        Some(previous) => {
            current.timestamp.unwrap_or(0) - previous.timestamp.unwrap_or(0)
                > TIME_SEPARATOR_GAP_MS
        }
    }
}
