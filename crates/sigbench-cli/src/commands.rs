use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use sigbench_host::{HostEvent, ParamSlot, WindowRect};
use sigbench_module_sdk::PARAM_MAX;

pub const HELP: &str = "\
commands:
  p1 <0-100>            set parameter 1 (discrete step)
  p2 <0-100>            set parameter 2 (discrete step)
  drag <1|2> <0-100>    move a slider without releasing it
  release <1|2> <0-100> release a slider at a value
  module <index|name>   select a processing module
  file <index|name>     select a data file
  reload                re-read the selected module from disk
  retry                 run again with unchanged inputs
  window <x> <y> <w> <h>
                        report a new window geometry
  save <path>           write the current figure as JSON
  status | modules | files | help | quit";

/// A list entry referred to by position or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Name(String),
}

impl Selector {
    fn parse(word: &str) -> Self {
        word.parse()
            .map(Selector::Index)
            .unwrap_or_else(|_| Selector::Name(word.to_string()))
    }

    /// Resolve against a list of names. Unknown names yield `None`.
    pub fn resolve<'a>(&self, mut names: impl Iterator<Item = &'a str>) -> Option<usize> {
        match self {
            Selector::Index(index) => Some(*index),
            Selector::Name(name) => names.position(|candidate| candidate == name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Event(HostEvent),
    SelectModule(Selector),
    SelectFile(Selector),
    SaveFigure(PathBuf),
    Status,
    Modules,
    Files,
    Help,
    Quit,
    Empty,
}

pub fn parse(line: &str) -> Result<Command> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = words.split_first() else {
        return Ok(Command::Empty);
    };
    let command = match (head, args) {
        ("p1", [value]) => step(ParamSlot::First, value)?,
        ("p2", [value]) => step(ParamSlot::Second, value)?,
        ("drag", [slot, value]) => Command::Event(HostEvent::ParamDragged {
            slot: parse_slot(slot)?,
            value: parse_value(value)?,
        }),
        ("release", [slot, value]) => Command::Event(HostEvent::ParamReleased {
            slot: parse_slot(slot)?,
            value: parse_value(value)?,
        }),
        ("module", [which]) => Command::SelectModule(Selector::parse(which)),
        ("file", [which]) => Command::SelectFile(Selector::parse(which)),
        ("reload", []) => Command::Event(HostEvent::Reload),
        ("retry", []) => Command::Event(HostEvent::ForceRetry),
        ("window", [x, y, w, h]) => {
            let rect = WindowRect::new(coord(x)?, coord(y)?, coord(w)?, coord(h)?);
            Command::Event(HostEvent::WindowChanged(rect))
        }
        ("save", [path]) => Command::SaveFigure(PathBuf::from(*path)),
        ("status", []) => Command::Status,
        ("modules", []) => Command::Modules,
        ("files", []) => Command::Files,
        ("help" | "?", []) => Command::Help,
        ("quit" | "exit" | "q", []) => Command::Quit,
        (other, _) => bail!("unrecognised command `{other}` (try `help`)"),
    };
    Ok(command)
}

fn step(slot: ParamSlot, value: &str) -> Result<Command> {
    Ok(Command::Event(HostEvent::ParamStepped {
        slot,
        value: parse_value(value)?,
    }))
}

fn parse_slot(word: &str) -> Result<ParamSlot> {
    match word {
        "1" | "p1" => Ok(ParamSlot::First),
        "2" | "p2" => Ok(ParamSlot::Second),
        other => Err(anyhow!("parameter must be 1 or 2, got `{other}`")),
    }
}

/// Values above the parameter range are clamped rather than rejected.
fn parse_value(word: &str) -> Result<u8> {
    let value: u32 = word
        .parse()
        .with_context(|| format!("`{word}` is not a parameter value"))?;
    Ok(value.min(u32::from(PARAM_MAX)) as u8)
}

/// Rectangle written as `x,y,width,height`.
pub fn parse_rect(word: &str) -> Result<WindowRect> {
    let parts = word
        .split(',')
        .map(|part| coord(part.trim()))
        .collect::<Result<Vec<_>>>()?;
    match parts[..] {
        [x, y, width, height] => Ok(WindowRect::new(x, y, width, height)),
        _ => bail!("expected x,y,width,height, got `{word}`"),
    }
}

fn coord(word: &str) -> Result<i32> {
    word.parse()
        .with_context(|| format!("`{word}` is not a coordinate"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parameter_commands() {
        assert_eq!(
            parse("p1 40").unwrap(),
            Command::Event(HostEvent::ParamStepped {
                slot: ParamSlot::First,
                value: 40
            })
        );
        assert_eq!(
            parse("  drag 2 250 ").unwrap(),
            Command::Event(HostEvent::ParamDragged {
                slot: ParamSlot::Second,
                value: 100
            })
        );
        assert_eq!(
            parse("release p1 7").unwrap(),
            Command::Event(HostEvent::ParamReleased {
                slot: ParamSlot::First,
                value: 7
            })
        );
        assert!(parse("p1 -3").is_err());
        assert!(parse("drag 3 10").is_err());
    }

    #[test]
    fn selection_and_control_commands() {
        assert_eq!(
            parse("module 1").unwrap(),
            Command::SelectModule(Selector::Index(1))
        );
        assert_eq!(
            parse("file b.wav").unwrap(),
            Command::SelectFile(Selector::Name("b.wav".into()))
        );
        assert_eq!(parse("reload").unwrap(), Command::Event(HostEvent::Reload));
        assert_eq!(parse("retry").unwrap(), Command::Event(HostEvent::ForceRetry));
        assert_eq!(
            parse("window 0 0 800 600").unwrap(),
            Command::Event(HostEvent::WindowChanged(WindowRect::new(0, 0, 800, 600)))
        );
        assert_eq!(parse("").unwrap(), Command::Empty);
        assert_eq!(parse("exit").unwrap(), Command::Quit);
        assert!(parse("reload now").is_err());
        assert!(parse("dance").is_err());
    }

    #[test]
    fn display_rectangles() {
        assert_eq!(
            parse_rect("0, 0,1920,1080").unwrap(),
            WindowRect::new(0, 0, 1920, 1080)
        );
        assert!(parse_rect("0,0,1920").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn selectors_resolve_by_name_or_index() {
        let names = ["algoA", "algoB"];
        assert_eq!(
            Selector::Name("algoB".into()).resolve(names.iter().copied()),
            Some(1)
        );
        assert_eq!(
            Selector::Name("algoC".into()).resolve(names.iter().copied()),
            None
        );
        assert_eq!(Selector::Index(5).resolve(names.iter().copied()), Some(5));
    }
}
