//! Terminal command parsing
//!
//! Every line typed by the player becomes one [`Command`]. Session-level
//! commands map to protocol messages; everything else becomes an
//! [`ActionKind`] submitted to the current room.

use shared::{normalize_room_code, ActionKind, GameType, RoomCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create(GameType),
    Join(RoomCode),
    Rejoin(RoomCode),
    Leave,
    Sync,
    Act(ActionKind),
    Show,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a game (infiltrator, jeopardy, predict, speed_match)")]
    UnknownGame(String),
    #[error("'{0}' is not a valid room code")]
    BadRoomCode(String),
    #[error("'{0}' is not a number")]
    BadNumber(String),
}

pub const HELP: &str = "\
Session:  create <game> | join <room> | rejoin <room> | leave | sync | show | quit
Host:     start | end | advance | open | select <category> <clue> | judge <yes|no> [player]
Players:  ack | buzz | vote <player> | ask <player> <question> | answer <text>
          predict <number> | wager <amount> | final <answer>";

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    if word.is_empty() {
        return Err(ParseError::Empty);
    }

    let command = match word.to_ascii_lowercase().as_str() {
        "create" => {
            let game = single(rest, "create <game>")?;
            let game_type =
                GameType::parse(game).ok_or_else(|| ParseError::UnknownGame(game.to_string()))?;
            Command::Create(game_type)
        }
        "join" => Command::Join(room_code(rest, "join <room>")?),
        "rejoin" => Command::Rejoin(room_code(rest, "rejoin <room>")?),
        "leave" => Command::Leave,
        "sync" => Command::Sync,
        "show" | "status" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,

        "start" => Command::Act(ActionKind::StartGame),
        "end" => Command::Act(ActionKind::EndGame),
        "advance" | "next" => Command::Act(ActionKind::Advance),
        "open" => Command::Act(ActionKind::OpenBuzzer),
        "select" => {
            let usage = "select <category> <clue>";
            let mut parts = rest.split_whitespace();
            let (Some(category), Some(clue), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(ParseError::Usage(usage));
            };
            Command::Act(ActionKind::SelectClue {
                category: number(category)?,
                clue: number(clue)?,
            })
        }
        "judge" => {
            let usage = "judge <yes|no> [player]";
            let mut parts = rest.split_whitespace();
            let correct = match parts.next().map(|v| v.to_ascii_lowercase()) {
                Some(v) if v == "yes" || v == "y" || v == "correct" => true,
                Some(v) if v == "no" || v == "n" || v == "wrong" => false,
                _ => return Err(ParseError::Usage(usage)),
            };
            let player_id = parts.next().map(str::to_string);
            if parts.next().is_some() {
                return Err(ParseError::Usage(usage));
            }
            Command::Act(ActionKind::JudgeAnswer { player_id, correct })
        }

        "ack" | "ready" => Command::Act(ActionKind::Ack),
        "buzz" => Command::Act(ActionKind::Buzz),
        "vote" => Command::Act(ActionKind::Vote {
            target: single(rest, "vote <player>")?.to_string(),
        }),
        "ask" => {
            let Some((target, text)) = rest.split_once(char::is_whitespace) else {
                return Err(ParseError::Usage("ask <player> <question>"));
            };
            Command::Act(ActionKind::Question {
                target: target.to_string(),
                text: text.trim().to_string(),
            })
        }
        "answer" => Command::Act(ActionKind::Answer {
            text: text(rest, "answer <text>")?,
        }),
        "predict" => Command::Act(ActionKind::Predict {
            value: number(single(rest, "predict <number>")?)?,
        }),
        "wager" => Command::Act(ActionKind::FinalWager {
            amount: number(single(rest, "wager <amount>")?)?,
        }),
        "final" => Command::Act(ActionKind::FinalAnswer {
            text: text(rest, "final <answer>")?,
        }),

        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn single<'a>(rest: &'a str, usage: &'static str) -> Result<&'a str, ParseError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn text(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    if rest.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(rest.to_string())
    }
}

fn room_code(rest: &str, usage: &'static str) -> Result<RoomCode, ParseError> {
    let code = single(rest, usage)?;
    normalize_room_code(code).ok_or_else(|| ParseError::BadRoomCode(code.to_string()))
}

fn number<T: std::str::FromStr>(value: &str) -> Result<T, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::BadNumber(value.to_string()))
}
