//! Text commands typed in chat, e.g. `!start Dragon 3`.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone};
use regex::Regex;

use crate::{clock::to_datetime, error::TimerError};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `start <name> <hours>` or `boss <hours> <name>`.
    Start { name: String, hours: f64 },
    /// `set HH:MM [hours] <name>`: spawn at the next occurrence of a local time.
    SetAt {
        hour: u32,
        minute: u32,
        hours: Option<f64>,
        name: String,
    },
    /// `update <hours> <name>`.
    Update { name: String, hours: f64 },
    Reset { name: String },
    Delete { name: String },
    List,
    Forget { name: String },
    SetChannel,
    /// `timezone <±HH[:MM]>`, stored as minutes east of UTC.
    Timezone { minutes: i32 },
    Help,
}

/// Splits chat messages into [`Command`]s for a given prefix.
#[derive(Debug, Clone)]
pub struct CommandParser {
    prefix: String,
    clock_time: Regex,
    utc_offset: Regex,
}

fn usage(prefix: &str, form: &str) -> TimerError {
    TimerError::Validation(format!("Usage: `{prefix}{form}`"))
}

fn parse_hours(token: &str) -> Option<f64> {
    token.trim_end_matches(['h', 'H']).parse::<f64>().ok()
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            prefix: prefix.into(),
            clock_time: Regex::new(r"^(\d{1,2}):(\d{2})$")?,
            utc_offset: Regex::new(r"(?i)^(?:utc|gmt)?([+-])?(\d{1,2})(?::?(\d{2}))?$")?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `None` when `content` is not addressed to the bot at all; otherwise
    /// the parsed command or a usage error to show the user.
    pub fn parse(&self, content: &str) -> Option<Result<Command, TimerError>> {
        let rest = content.trim().strip_prefix(self.prefix.as_str())?;
        let mut tokens = rest.split_whitespace();
        let keyword = tokens.next()?.to_lowercase();
        let args: Vec<&str> = tokens.collect();

        Some(self.parse_command(&keyword, &args))
    }

    fn parse_command(&self, keyword: &str, args: &[&str]) -> Result<Command, TimerError> {
        let p = self.prefix.as_str();
        match keyword {
            "start" => {
                let (hours, name) = args
                    .split_last()
                    .and_then(|(last, name)| Some((parse_hours(last)?, name)))
                    .filter(|(_, name)| !name.is_empty())
                    .ok_or_else(|| usage(p, "start <name> <hours>"))?;
                Ok(Command::Start {
                    name: name.join(" "),
                    hours,
                })
            }
            "boss" => {
                let (hours, name) = args
                    .split_first()
                    .and_then(|(first, name)| Some((parse_hours(first)?, name)))
                    .filter(|(_, name)| !name.is_empty())
                    .ok_or_else(|| usage(p, "boss <hours> <name>"))?;
                Ok(Command::Start {
                    name: name.join(" "),
                    hours,
                })
            }
            "set" => self.parse_set(args),
            "update" => {
                let (hours, name) = args
                    .split_first()
                    .and_then(|(first, name)| Some((parse_hours(first)?, name)))
                    .filter(|(_, name)| !name.is_empty())
                    .ok_or_else(|| usage(p, "update <hours> <name>"))?;
                Ok(Command::Update {
                    name: name.join(" "),
                    hours,
                })
            }
            "reset" | "delete" | "forget" => {
                if args.is_empty() {
                    return Err(usage(p, &format!("{keyword} <name>")));
                }
                let name = args.join(" ");
                Ok(match keyword {
                    "reset" => Command::Reset { name },
                    "delete" => Command::Delete { name },
                    _ => Command::Forget { name },
                })
            }
            "list" | "timer" | "timers" => Ok(Command::List),
            "setchannel" => Ok(Command::SetChannel),
            "timezone" | "tz" => {
                let [offset] = args else {
                    return Err(usage(p, "timezone <+HH[:MM]>"));
                };
                self.parse_offset(offset)
                    .map(|minutes| Command::Timezone { minutes })
                    .ok_or_else(|| usage(p, "timezone <+HH[:MM]>"))
            }
            "commands" | "help" => Ok(Command::Help),
            _ => Err(TimerError::Validation(format!(
                "Unknown command. Use `{p}commands` to see available commands."
            ))),
        }
    }

    fn parse_set(&self, args: &[&str]) -> Result<Command, TimerError> {
        let bad = || usage(&self.prefix, "set HH:MM [hours] <name>");
        let (time, rest) = args.split_first().ok_or_else(bad)?;
        let caps = self.clock_time.captures(time).ok_or_else(bad)?;
        let hour: u32 = caps[1].parse().map_err(|_| bad())?;
        let minute: u32 = caps[2].parse().map_err(|_| bad())?;
        if hour > 23 || minute > 59 {
            return Err(TimerError::Validation(
                "Please provide a valid time in 24-hour format (00:00 to 23:59).".to_string(),
            ));
        }

        // A leading number is the cooldown only when a name follows it.
        let (hours, name) = match rest {
            [first, name @ ..] if !name.is_empty() => match parse_hours(first) {
                Some(hours) => (Some(hours), name),
                None => (None, rest),
            },
            _ => (None, rest),
        };
        if name.is_empty() {
            return Err(bad());
        }

        Ok(Command::SetAt {
            hour,
            minute,
            hours,
            name: name.join(" "),
        })
    }

    /// `+8`, `-3:30`, `+0530`, `UTC+8` → minutes east of UTC.
    pub fn parse_offset(&self, text: &str) -> Option<i32> {
        let caps = self.utc_offset.captures(text.trim())?;
        let hours: i32 = caps[2].parse().ok()?;
        let minutes: i32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        if minutes >= 60 {
            return None;
        }
        let sign = if caps.get(1).is_some_and(|s| s.as_str() == "-") {
            -1
        } else {
            1
        };
        Some(sign * (hours * 60 + minutes))
    }
}

/// Epoch milliseconds of the next `hour:minute` in `offset` strictly after
/// `now`. Today if still ahead, otherwise tomorrow.
pub fn next_occurrence(now: i64, hour: u32, minute: u32, offset: FixedOffset) -> Option<i64> {
    let local_now: DateTime<FixedOffset> = to_datetime(now).with_timezone(&offset);
    let at = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let mut candidate = offset
        .from_local_datetime(&local_now.date_naive().and_time(at))
        .single()?;
    if candidate.timestamp_millis() <= now {
        candidate += Duration::days(1);
    }
    Some(candidate.timestamp_millis())
}
