//! Parser for the game's `world_data.txt` dump.
//!
//! The file is INI-like. `[state]` holds `state=` with every unit on the
//! board, units separated by `€` and fields by `|`, plus `room_size=w|h`.
//! `[status]` holds `level_won=true|false`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

const UNIT_SEPARATOR: char = '€';
const FIELD_SEPARATOR: char = '|';
/// Units with fewer fields are partial writes and skipped.
const MIN_FIELDS: usize = 21;
const NAME_FIELD: usize = 1;
const X_FIELD: usize = 3;
const Y_FIELD: usize = 4;
const Z_FIELD: usize = 7;

/// One unit on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

/// The parts of the dump the bridge serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldData {
    pub units: Vec<Unit>,
    /// Room width and height including the border.
    pub room_size: Option<(i64, i64)>,
    pub level_won: bool,
}

type Sections = HashMap<String, HashMap<String, String>>;

fn parse_sections(text: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_ascii_lowercase();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    sections
}

fn parse_unit(raw: &str) -> Result<Option<Unit>> {
    let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
    if fields.len() < MIN_FIELDS {
        return Ok(None);
    }
    let number = |index: usize, name: &str| -> Result<i64> {
        fields[index]
            .trim()
            .parse()
            .with_context(|| {
                format!(
                    "unit {} has invalid {name} {:?}",
                    fields[NAME_FIELD], fields[index]
                )
            })
    };
    Ok(Some(Unit {
        name: fields[NAME_FIELD].trim().to_string(),
        x: number(X_FIELD, "XPOS")?,
        y: number(Y_FIELD, "YPOS")?,
        z: number(Z_FIELD, "ZLAYER")?,
    }))
}

fn parse_room_size(raw: &str) -> Option<(i64, i64)> {
    let (w, h) = raw.split_once(FIELD_SEPARATOR)?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl WorldData {
    pub fn parse(text: &str) -> Result<Self> {
        let sections = parse_sections(text);
        let Some(state) = sections.get("state") else {
            bail!("world data has no [state] section");
        };

        let mut units = Vec::new();
        for raw in state
            .get("state")
            .map(String::as_str)
            .unwrap_or_default()
            .split(UNIT_SEPARATOR)
            .filter(|raw| !raw.is_empty())
        {
            if let Some(unit) = parse_unit(raw)? {
                units.push(unit);
            }
        }

        let room_size = state
            .get("room_size")
            .map(String::as_str)
            .and_then(parse_room_size);
        let level_won = sections
            .get("status")
            .and_then(|status| status.get("level_won"))
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        Ok(Self {
            units,
            room_size,
            level_won,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse {}", path.display()))
    }
}
