mod api;
mod updates;

pub(crate) use api::TelegramClient;
#[cfg(test)]
pub(crate) use api::{keyboard_markup, parse_api_response};
#[cfg(test)]
pub(crate) use updates::{Update, parse_command, parse_update};
