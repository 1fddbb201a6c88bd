//! Mention command parser.
//!
//! An app mention arrives as `<@U…> --model gpt-4o --temperature 0.2 hi`.
//! The first whitespace-delimited token is assumed to be the bot mention and
//! is discarded. Recognized `--flag value` (or `--flag=value`) pairs are
//! consumed from the front; everything from the first non-flag token onward
//! is the completion content, with its internal spacing preserved. Values
//! may be double- or single-quoted so they can contain spaces.
//!
//! ```rust
//! use chatrelay::channels::command::parse_mention;
//!
//! let cmd = parse_mention("<@U02AB> --model gpt-4o-mini what is a monad?");
//! // cmd is MentionCommand::Complete { content: "what is a monad?", … }
//! ```

use crate::error::CommandError;
use crate::options::schema::{self, OptionsPatch};

/// Flag that turns a mention into a channel-defaults update.
const SET_DEFAULTS_FLAG: &str = "--set-as-channel-defaults";

/// What a mention asks the bot to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MentionCommand {
    /// Bare mention, or flags with nothing to complete: show the usage text.
    Help,
    /// `--set-as-channel-defaults` was given: persist the inline overrides
    /// as the channel's defaults instead of requesting a completion.
    SetChannelDefaults { overrides: OptionsPatch },
    /// Request a completion for `content` with the inline overrides.
    Complete {
        content: String,
        overrides: OptionsPatch,
    },
}

/// Parse the text of an app mention into a [`MentionCommand`].
///
/// Flags are only recognized before the content starts; a `--` token later
/// in the content is part of the content. When the same flag appears twice
/// the later occurrence wins.
pub fn parse_mention(text: &str) -> Result<MentionCommand, CommandError> {
    let after_mention = match text.trim_start().split_once(char::is_whitespace) {
        Some((_mention, rest)) => rest,
        None => "",
    };

    let mut overrides = OptionsPatch::default();
    let mut set_defaults = false;
    let mut cursor = after_mention.trim_start();

    while let Some(body) = cursor.strip_prefix("--") {
        let name_len = body
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(body.len());
        let flag = &cursor[..2 + name_len];
        let after_flag = &body[name_len..];
        let attached = after_flag.strip_prefix('=');

        if flag == SET_DEFAULTS_FLAG {
            if attached.is_some() {
                return Err(CommandError::UnknownFlag {
                    token: format!("{flag}="),
                });
            }
            set_defaults = true;
            cursor = after_flag.trim_start();
            continue;
        }

        let Some(spec) = schema::field_by_flag(flag) else {
            return Err(CommandError::UnknownFlag {
                token: flag.to_string(),
            });
        };

        let (raw, rest) = match attached {
            Some(tail) => read_token(tail)?,
            None => {
                let tail = after_flag.trim_start();
                if tail.is_empty() || tail.starts_with("--") {
                    return Err(CommandError::MissingValue {
                        flag: flag.to_string(),
                    });
                }
                read_token(tail)?
            }
        };

        // Slack auto-links URLs, turning them into `<https://…>`.
        let raw = if spec.name == "base_url" {
            raw.trim_start_matches('<').trim_end_matches('>').to_string()
        } else {
            raw
        };

        overrides.set(spec.name, spec.kind.parse(spec.name, &raw)?)?;
        cursor = rest.trim_start();
    }

    let content = cursor.trim_end();

    if set_defaults {
        if !content.is_empty() {
            // Updating defaults and asking a question are mutually
            // exclusive; the update wins.
            tracing::debug!(
                dropped = %content,
                "set-defaults mention carries content, ignoring it"
            );
        }
        return Ok(MentionCommand::SetChannelDefaults { overrides });
    }

    if content.is_empty() {
        // Overrides without content have nothing to apply to.
        return Ok(MentionCommand::Help);
    }

    Ok(MentionCommand::Complete {
        content: content.to_string(),
        overrides,
    })
}

/// Read one value token from the front of `input`: `"double quoted"`,
/// `'single quoted'`, or bare up to the next whitespace. Returns the value
/// and the remaining input.
fn read_token(input: &str) -> Result<(String, &str), CommandError> {
    match input.chars().next() {
        Some(quote @ ('"' | '\'')) => match input[1..].find(quote) {
            Some(closing) => Ok((input[1..1 + closing].to_string(), &input[2 + closing..])),
            None => Err(CommandError::UnbalancedQuote),
        },
        _ => {
            let end = input.find(char::is_whitespace).unwrap_or(input.len());
            Ok((input[..end].to_string(), &input[end..]))
        }
    }
}

/// Usage text listing the recognized flags, derived from the schema table.
///
/// Plain text so it renders the same in any Slack client.
pub fn usage() -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("Usage: @bot [flags] message".to_string());
    lines.push(String::new());
    lines.push("Flags".to_string());
    for spec in schema::FIELDS {
        let label = format!("{} <{}>", spec.flag, spec.kind.label());
        let default = match spec.default {
            Some(default) => format!("default {}", default.to_value().render()),
            None => "required".to_string(),
        };
        lines.push(format!("  {label:<28} {default}"));
    }
    lines.push(format!(
        "  {SET_DEFAULTS_FLAG:<28} store the given flags as this channel's defaults"
    ));
    lines.push(String::new());
    lines.push("Values may be quoted. Flags come before the message.".to_string());
    lines.join("\n")
}
