//! Line-oriented control commands read from stdin.

use anyhow::{Result, anyhow, bail};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Load(String),
    Play,
    Pause,
    Stop,
    Seek(f64),
    SeekPercent(f64),
    Volume(f64),
    Mute,
    Unmute,
    Time,
    Duration,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  load <resource>   fetch, decode and play a resource
  play | pause | stop
  seek <secs>       jump to a position
  seekp <percent>   jump to a percentage of the duration
  vol <0-100>       set volume
  mute | unmute
  time | duration | status
  quit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "load" => {
            if rest.is_empty() {
                bail!("load needs a resource");
            }
            Command::Load(rest.to_string())
        }
        "play" => Command::Play,
        "pause" => Command::Pause,
        "stop" => Command::Stop,
        "seek" => Command::Seek(number(word, rest)?),
        "seekp" => Command::SeekPercent(number(word, rest)?),
        "vol" | "volume" => Command::Volume(number(word, rest)?),
        "mute" => Command::Mute,
        "unmute" => Command::Unmute,
        "time" => Command::Time,
        "duration" => Command::Duration,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(cmd))
}

fn number(word: &str, rest: &str) -> Result<f64> {
    rest.parse::<f64>()
        .map_err(|_| anyhow!("{word} needs a number, got {rest:?}"))
}
