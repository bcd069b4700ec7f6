//! Date-bucketed transcript view of a message snapshot

use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use tablechat_store::ConversationMessage;

/// Shown instead of a transcript when a conversation has no messages
pub const EMPTY_TRANSCRIPT_NOTICE: &str = "No messages yet";

/// Messages sharing one calendar day in the viewer's time zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGroup<'a> {
    pub label: String,
    pub messages: Vec<&'a ConversationMessage>,
}

/// Bucket messages by local calendar day.
///
/// Input order is kept as is; messages are expected oldest first. Buckets
/// come out in the order their label is first seen, and a label seen again
/// later appends to its existing bucket.
pub fn group_by_date<'a, I, Tz>(messages: I, now: &DateTime<Tz>) -> Vec<DateGroup<'a>>
where
    I: IntoIterator<Item = &'a ConversationMessage>,
    Tz: TimeZone,
{
    let mut groups: Vec<DateGroup<'a>> = Vec::new();

    for message in messages {
        let label = date_label(&message.created_at, now);
        match groups.iter_mut().find(|group| group.label == label) {
            Some(group) => group.messages.push(message),
            None => groups.push(DateGroup {
                label,
                messages: vec![message],
            }),
        }
    }

    groups
}

/// [`group_by_date`] relative to the current local time
pub fn group_local<'a, I>(messages: I) -> Vec<DateGroup<'a>>
where
    I: IntoIterator<Item = &'a ConversationMessage>,
{
    group_by_date(messages, &Local::now())
}

/// "Today", "Yesterday", "Mar 7", or "Dec 31, 2024" when the year differs
pub fn date_label<Tz: TimeZone>(at: &DateTime<Utc>, now: &DateTime<Tz>) -> String {
    let day = at.with_timezone(&now.timezone()).date_naive();
    let today = now.date_naive();

    if day == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(day) {
        "Yesterday".to_string()
    } else if day.year() == today.year() {
        day.format("%b %-d").to_string()
    } else {
        day.format("%b %-d, %Y").to_string()
    }
}

pub fn flatten<'a>(groups: &[DateGroup<'a>]) -> Vec<&'a ConversationMessage> {
    groups
        .iter()
        .flat_map(|group| group.messages.iter().copied())
        .collect()
}
