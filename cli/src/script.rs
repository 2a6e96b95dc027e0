//! Line-oriented session scripts.
//!
//! One step per line; blank lines and `#` comments are skipped.
//!
//! ```text
//! tool rectangle
//! down 10 10
//! move 60 60
//! up 60 60
//! draw sticky 200 40 200 40
//! key z cmd shift
//! select rectangle-1700000000000 add
//! text sticky-1700000000000 hello world
//! wait 500
//! save
//! dump
//! ```

#[cfg(test)]
#[path = "script_test.rs"]
mod script_test;

use std::time::Duration;

use canvas::element::Point;
use canvas::input::{Command, Key, Modifiers, Tool};
use tokio::io::AsyncReadExt;

use crate::error::CliError;

/// One scripted action.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Tool(Tool),
    PointerDown(Point, Modifiers),
    PointerMove(Point, Modifiers),
    PointerUp(Point, Modifiers),
    Key(Key, Modifiers),
    /// Select `tool`, press at `from`, drag to `to` and release.
    Draw { tool: Tool, from: Point, to: Point },
    Select { id: Option<String>, additive: bool },
    Text { id: String, text: String },
    Run(Command),
    Clear,
    /// Keep servicing the socket and timers for this long.
    Wait(Duration),
    Save { persist: bool },
    /// Print every element as JSON on stdout.
    Dump,
    Status,
}

/// Read a script from `path`, or from stdin when `path` is `-`.
///
/// # Errors
///
/// Returns [`CliError::Io`] if the source cannot be read and
/// [`CliError::Script`] for the first malformed line.
pub async fn load(path: &str) -> Result<Vec<Step>, CliError> {
    let source = if path == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        buf
    } else {
        tokio::fs::read_to_string(path).await?
    };
    parse(&source)
}

/// Parse a whole script.
///
/// # Errors
///
/// Returns [`CliError::Script`] naming the first malformed line (1-based).
pub fn parse(source: &str) -> Result<Vec<Step>, CliError> {
    let mut steps = Vec::new();
    for (index, line) in source.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(step)) => steps.push(step),
            Ok(None) => {}
            Err(message) => return Err(CliError::Script { line: index + 1, message }),
        }
    }
    Ok(steps)
}

/// Parse one line. `Ok(None)` for blanks and comments.
pub fn parse_line(line: &str) -> Result<Option<Step>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let step = match verb {
        "tool" => Step::Tool(tool(one(&args, verb)?)?),
        "down" => pointer(&args, Step::PointerDown)?,
        "move" => pointer(&args, Step::PointerMove)?,
        "up" => pointer(&args, Step::PointerUp)?,
        "key" => {
            let (key, mods) = args.split_first().ok_or("key needs a key name")?;
            Step::Key(Key((*key).to_owned()), modifiers(mods)?)
        }
        "draw" => {
            let [name, x1, y1, x2, y2] = args.as_slice() else {
                return Err("draw needs <tool> <x1> <y1> <x2> <y2>".to_owned());
            };
            Step::Draw { tool: tool(name)?, from: point(x1, y1)?, to: point(x2, y2)? }
        }
        "select" => match args.as_slice() {
            ["none"] => Step::Select { id: None, additive: false },
            [id] => Step::Select { id: Some((*id).to_owned()), additive: false },
            [id, "add"] => Step::Select { id: Some((*id).to_owned()), additive: true },
            _ => return Err("select needs <id> [add] or none".to_owned()),
        },
        "text" => {
            let (id, rest) = args.split_first().ok_or("text needs <id> <text>")?;
            Step::Text { id: (*id).to_owned(), text: rest.join(" ") }
        }
        "undo" => Step::Run(Command::Undo),
        "redo" => Step::Run(Command::Redo),
        "group" => Step::Run(Command::Group),
        "ungroup" => Step::Run(Command::Ungroup),
        "delete" => Step::Run(Command::DeleteSelection),
        "cancel" => Step::Run(Command::Cancel),
        "clear" => Step::Clear,
        "wait" => {
            let ms = one(&args, verb)?;
            Step::Wait(Duration::from_millis(ms.parse().map_err(|_| format!("bad duration `{ms}`"))?))
        }
        "save" => Step::Save { persist: false },
        "persist" => Step::Save { persist: true },
        "dump" => Step::Dump,
        "status" => Step::Status,
        other => return Err(format!("unknown step `{other}`")),
    };
    Ok(Some(step))
}

fn one<'a>(args: &[&'a str], verb: &str) -> Result<&'a str, String> {
    match args {
        [only] => Ok(*only),
        _ => Err(format!("{verb} takes exactly one argument")),
    }
}

fn tool(name: &str) -> Result<Tool, String> {
    Tool::parse(name).ok_or_else(|| format!("unknown tool `{name}`"))
}

fn point(x: &str, y: &str) -> Result<Point, String> {
    let coord = |s: &str| s.parse::<f64>().map_err(|_| format!("bad coordinate `{s}`"));
    Ok(Point::new(coord(x)?, coord(y)?))
}

fn pointer(args: &[&str], make: fn(Point, Modifiers) -> Step) -> Result<Step, String> {
    let [x, y, mods @ ..] = args else {
        return Err("pointer steps need <x> <y>".to_owned());
    };
    Ok(make(point(x, y)?, modifiers(mods)?))
}

fn modifiers(words: &[&str]) -> Result<Modifiers, String> {
    let mut mods = Modifiers::default();
    for word in words {
        match *word {
            "shift" => mods.shift = true,
            "ctrl" => mods.ctrl = true,
            "alt" => mods.alt = true,
            "meta" | "cmd" => mods.meta = true,
            other => return Err(format!("unknown modifier `{other}`")),
        }
    }
    Ok(mods)
}
