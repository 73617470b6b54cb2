use serde_json::Value;

use super::super::dispatch::{Event, Sender};

/// One raw Bot API update. `event` is `None` for updates the bot does not act on;
/// their id still has to be acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Update {
    pub(crate) id: i64,
    pub(crate) event: Option<Event>,
}

pub(crate) fn parse_updates(result: &Value) -> Vec<Update> {
    let Some(items) = result.as_array() else {
        return Vec::new();
    };
    items.iter().filter_map(parse_update).collect()
}

pub(crate) fn parse_update(value: &Value) -> Option<Update> {
    let id = value.get("update_id")?.as_i64()?;
    let event = if let Some(message) = value.get("message") {
        parse_message(message)
    } else if let Some(query) = value.get("callback_query") {
        parse_callback(query)
    } else {
        None
    };
    Some(Update { id, event })
}

fn parse_message(message: &Value) -> Option<Event> {
    let chat = message.pointer("/chat/id")?.as_i64()?;
    let message_id = message.get("message_id")?.as_i64()?;
    let sender = parse_sender(message.get("from")?)?;

    if let Some(filename) = media_filename(message) {
        return Some(Event::File {
            chat,
            message_id,
            sender,
            filename,
        });
    }

    let text = message.get("text")?.as_str()?;
    let (name, args) = parse_command(text)?;
    Some(Event::Command {
        chat,
        sender,
        name,
        args,
    })
}

fn parse_callback(query: &Value) -> Option<Event> {
    let callback_id = query.get("id")?.as_str()?.to_string();
    let sender = parse_sender(query.get("from")?)?;
    let message = query.get("message")?;
    let chat = message.pointer("/chat/id")?.as_i64()?;
    let message_id = message.get("message_id")?.as_i64()?;
    let reply_to = message
        .pointer("/reply_to_message/message_id")
        .and_then(Value::as_i64);
    let data = query
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(Event::Callback {
        callback_id,
        chat,
        message_id,
        reply_to,
        sender,
        data,
    })
}

fn parse_sender(from: &Value) -> Option<Sender> {
    let id = from.get("id")?.as_i64()?;
    let first_name = from
        .get("first_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("there")
        .to_string();
    Some(Sender { id, first_name })
}

/// File name of an attached document, video or audio. Attachments without a
/// name are still accepted as `"Unknown"`.
fn media_filename(message: &Value) -> Option<String> {
    ["document", "video", "audio"].iter().find_map(|kind| {
        let media = message.get(*kind)?;
        let name = media
            .get("file_name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("Unknown");
        Some(name.to_string())
    })
}

/// Splits `/name@bot rest of line` into a lower-cased `name` and the trimmed rest.
pub(crate) fn parse_command(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim_start();
    let body = trimmed.strip_prefix('/')?;
    let (head, args) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_lowercase(), args.to_string()))
}
