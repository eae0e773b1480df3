//! Rendering of the board as pipe-delimited grid text.
//!
//! Rows are `y` coordinates and columns are `x` coordinates, both labelled
//! with their game coordinate. The border is cut off: the window is
//! `1..=w-2 × 1..=h-2` when the room size is known, otherwise the unit
//! bounding box shrunk by one on every side.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use anyhow::{Result, bail};

use crate::world_data::WorldData;

const MIN_CELL_WIDTH: usize = 5;
const CORNER: &str = "y/x";

fn window(data: &WorldData) -> Result<(RangeInclusive<i64>, RangeInclusive<i64>)> {
    let (xs, ys) = match data.room_size {
        Some((w, h)) => (1..=w - 2, 1..=h - 2),
        None => {
            let Some(first) = data.units.first() else {
                bail!("no units found and no room size available");
            };
            let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
            for unit in &data.units {
                min_x = min_x.min(unit.x);
                max_x = max_x.max(unit.x);
                min_y = min_y.min(unit.y);
                max_y = max_y.max(unit.y);
            }
            (min_x + 1..=max_x - 1, min_y + 1..=max_y - 1)
        }
    };
    if xs.is_empty() || ys.is_empty() {
        bail!("grid window is empty");
    }
    Ok((xs, ys))
}

/// Render the playable window of `data`.
pub fn render_grid(data: &WorldData) -> Result<String> {
    let (xs, ys) = window(data)?;

    let mut stacked: BTreeMap<(i64, i64), Vec<(i64, &str)>> = BTreeMap::new();
    for unit in &data.units {
        stacked
            .entry((unit.x, unit.y))
            .or_default()
            .push((unit.z, unit.name.as_str()));
    }
    let cell = |x: i64, y: i64| -> String {
        let mut names = stacked.get(&(x, y)).cloned().unwrap_or_default();
        names.sort_unstable();
        names
            .iter()
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(",")
    };

    let rows: Vec<(i64, Vec<String>)> = ys
        .clone()
        .map(|y| (y, xs.clone().map(|x| cell(x, y)).collect()))
        .collect();

    let label_width = ys
        .clone()
        .map(|y| y.to_string().len())
        .chain([CORNER.len()])
        .max()
        .unwrap_or(CORNER.len());
    let widths: Vec<usize> = xs
        .clone()
        .enumerate()
        .map(|(column, x)| {
            rows.iter()
                .map(|(_, cells)| cells[column].len())
                .chain([x.to_string().len(), MIN_CELL_WIDTH])
                .max()
                .unwrap_or(MIN_CELL_WIDTH)
        })
        .collect();

    let mut header = vec![format!("{CORNER:<label_width$}")];
    header.extend(
        xs.clone()
            .zip(&widths)
            .map(|(x, &w)| format!("{:^w$}", x.to_string())),
    );
    let mut separator = "-".repeat(label_width);
    for w in &widths {
        separator.push_str("-+-");
        separator.push_str(&"-".repeat(*w));
    }

    let mut lines = vec![header.join(" | "), separator];
    for (y, cells) in &rows {
        let mut parts = vec![format!("{:<label_width$}", y.to_string())];
        parts.extend(cells.iter().zip(&widths).map(|(c, &w)| format!("{c:<w$}")));
        lines.push(parts.join(" | "));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_data::Unit;

    fn unit(name: &str, x: i64, y: i64, z: i64) -> Unit {
        Unit {
            name: name.to_string(),
            x,
            y,
            z,
        }
    }

    #[test]
    fn room_size_trims_border() {
        let data = WorldData {
            units: vec![unit("baba", 1, 1, 18), unit("wall", 0, 0, 14)],
            room_size: Some((5, 4)),
            level_won: false,
        };
        let text = render_grid(&data).expect("render");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "y/x |   1   |   2   |   3  ");
        assert!(lines[1].starts_with("----+-"));
        assert_eq!(lines[2], "1   | baba  |       |      ");
        assert!(!text.contains("wall"));
    }

    /// Verifies stacked units are listed by z-layer.
    #[test]
    fn stacked_units_follow_z_order() {
        let data = WorldData {
            units: vec![
                unit("rock", 1, 1, 16),
                unit("text_is", 1, 1, 20),
                unit("flag", 1, 1, 2),
            ],
            room_size: Some((3, 3)),
            level_won: false,
        };
        let text = render_grid(&data).expect("render");
        assert!(text.lines().nth(2).expect("row").contains("flag,rock,text_is"));
    }

    #[test]
    fn bounding_box_used_without_room_size() {
        let data = WorldData {
            units: vec![unit("edge", 0, 0, 1), unit("baba", 2, 1, 18), unit("edge", 4, 2, 1)],
            room_size: None,
            level_won: false,
        };
        let text = render_grid(&data).expect("render");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains(" 1 ") && lines[0].contains(" 3 "));
        assert!(lines[2].contains("baba"));
    }

    #[test]
    fn empty_board_without_room_size_is_an_error() {
        assert!(render_grid(&WorldData::default()).is_err());
    }
}
