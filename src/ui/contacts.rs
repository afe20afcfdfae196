use chrono::Local;

use tinyphone_backend::chat::ContactSummary;
use tinyphone_backend::conversation::timefmt::message_time_label;

pub fn render_contact(index: usize, summary: &ContactSummary) -> String {
    let badge = match summary.unread {
        0 => String::new(),
        n if n > 99 => " (99+)".to_string(),
        n => format!(" ({})", n),
    };
    let preview = summary
        .last_message
        .as_ref()
        .map(|m| {
            format!(
                "  {}  · {}",
                m.preview(),
                message_time_label(m, &Local::now())
            )
        })
        .unwrap_or_default();
    format!(
        "{:>2}. {} {}{}  [{}]{}",
        index + 1,
        summary.profile.avatar,
        summary.profile.display_name,
        badge,
        summary.profile.id,
        preview
    )
}

pub fn print_contact_list(contacts: &[ContactSummary]) {
    println!("联系人");
    for (index, summary) in contacts.iter().enumerate() {
        println!("{}", render_contact(index, summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyphone_backend::persona::ContactProfile;

    #[test]
    fn unread_badge_caps_at_99() {
        let mut summary = ContactSummary {
            profile: ContactProfile::default_companion(),
            unread: 0,
            last_message: None,
        };
        assert!(!render_contact(0, &summary).contains('('));
        summary.unread = 3;
        assert!(render_contact(0, &summary).contains("(3)"));
        summary.unread = 120;
        assert!(render_contact(0, &summary).contains("(99+)"));
    }
}
