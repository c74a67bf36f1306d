use std::sync::LazyLock;

use regex::Regex;

static SHORTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https?://(www\.)?(youtube\.com/shorts/|youtu\.be/)\S+$")
        .expect("static regex compile")
});

pub const DOWNLOAD_COMMAND: &str = "download";

/// A bot command split into name and argument text.
#[derive(Debug, PartialEq, Eq)]
pub struct BotCommand<'a> {
    pub name: &'a str,
    pub args: &'a str,
}

/// Splits `/name[@bot] args`. Returns `None` for anything that is not a command.
#[must_use]
pub fn parse_command(text: &str) -> Option<BotCommand<'_>> {
    let rest = text.trim().strip_prefix('/')?;
    let (head, args) = rest
        .split_once(char::is_whitespace)
        .unwrap_or((rest, ""));
    let name = head.split_once('@').map_or(head, |(name, _)| name);
    if name.is_empty() {
        return None;
    }
    Some(BotCommand {
        name,
        args: args.trim(),
    })
}

#[must_use]
pub fn is_shorts_url(url: &str) -> bool {
    SHORTS_RE.is_match(url)
}
