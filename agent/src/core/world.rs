//! Grid world model: blocks, derived rule indices and the grid text format.
//!
//! The grid is addressed as `grid[x][y]`, where `x` is the row of the grid
//! text and `y` is the column. Every cell keeps its blocks sorted by kind, so
//! equality and hashing never depend on insertion order.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::kinds::{self, COPY_TOKEN, TEXT_PROPERTY};

/// An entity instance on the grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Block {
    pub kind: String,
    pub x: usize,
    pub y: usize,
}

impl Block {
    pub fn new(kind: impl Into<String>, x: usize, y: usize) -> Self {
        Self {
            kind: kind.into(),
            x,
            y,
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@({}, {})", self.kind, self.x, self.y)
    }
}

/// Episode outcome tag carried by a state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Ongoing,
    Win,
    Loss,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ongoing => "ongoing",
            Outcome::Win => "win",
            Outcome::Loss => "loss",
        }
    }
}

type Cell = Vec<Block>;

/// A snapshot of the world with its derived indices.
#[derive(Debug, Clone)]
pub struct WorldState {
    grid: Vec<Vec<Cell>>,
    cols: usize,
    kind_to_blocks: BTreeMap<String, Vec<Block>>,
    kind_to_properties: BTreeMap<String, Vec<String>>,
    property_to_kinds: BTreeMap<String, Vec<String>>,
    outcome: Outcome,
}

impl WorldState {
    /// An empty grid with `rows` rows and `cols` columns.
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self::from_cells(vec![vec![Vec::new(); cols]; rows], cols)
    }

    fn from_cells(mut grid: Vec<Vec<Cell>>, cols: usize) -> Self {
        for cell in grid.iter_mut().flatten() {
            cell.sort_by(|a, b| a.kind.cmp(&b.kind));
        }
        let mut state = Self {
            grid,
            cols,
            kind_to_blocks: BTreeMap::new(),
            kind_to_properties: BTreeMap::new(),
            property_to_kinds: BTreeMap::new(),
            outcome: Outcome::Ongoing,
        };
        state.reindex_blocks();
        state.refresh_rules();
        state
    }

    /// Parse the tabular grid text served by the environment.
    ///
    /// Line one is the header (column labels after the first `|`), line two is
    /// a separator, and every following line is one row whose first column is
    /// the row label. Cells hold comma-separated kinds.
    pub fn from_grid_string(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.trim().lines().collect();
        if lines.len() < 2 {
            bail!("grid text needs a header and a separator line");
        }
        let cols = lines[0].split('|').skip(1).count();
        let mut grid = Vec::with_capacity(lines.len() - 2);
        for (x, line) in lines[2..].iter().enumerate() {
            let cells: Vec<&str> = line.split('|').skip(1).collect();
            if cells.len() != cols {
                bail!(
                    "grid row {} has {} cells, expected {}",
                    x + 1,
                    cells.len(),
                    cols
                );
            }
            let row = cells
                .iter()
                .enumerate()
                .map(|(y, cell)| {
                    cell.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(|name| Block::new(name.to_ascii_lowercase(), x, y))
                        .collect()
                })
                .collect();
            grid.push(row);
        }
        Ok(Self::from_cells(grid, cols))
    }

    /// Render the grid in the same tabular format `from_grid_string` reads.
    pub fn to_grid_string(&self) -> String {
        let contents: Vec<Vec<String>> = self
            .grid
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        cell.iter()
                            .map(|block| block.kind.as_str())
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .collect()
            })
            .collect();
        let label_width = self.rows().to_string().len().max(3);
        let widths: Vec<usize> = (0..self.cols)
            .map(|y| {
                contents
                    .iter()
                    .map(|row| row[y].len())
                    .chain([(y + 1).to_string().len(), 4])
                    .max()
                    .unwrap_or(4)
            })
            .collect();

        let mut header = vec![format!("{:<label_width$}", "y/x")];
        header.extend(
            widths
                .iter()
                .enumerate()
                .map(|(y, &w)| format!("{:^w$}", y + 1)),
        );
        let mut separator = "-".repeat(label_width);
        for w in &widths {
            separator.push_str("-+-");
            separator.push_str(&"-".repeat(*w));
        }

        let mut lines = vec![header.join(" | "), separator];
        for (x, row) in contents.iter().enumerate() {
            let mut parts = vec![format!("{:<label_width$}", x + 1)];
            parts.extend(
                row.iter()
                    .zip(&widths)
                    .map(|(cell, &w)| format!("{cell:<w$}")),
            );
            lines.push(parts.join(" | "));
        }
        lines.join("\n")
    }

    pub fn rows(&self) -> usize {
        self.grid.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.rows() && (y as usize) < self.cols
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = outcome;
    }

    /// Blocks in cell `(x, y)`, sorted by kind. Out-of-range cells are empty.
    pub fn cell(&self, x: usize, y: usize) -> &[Block] {
        self.grid
            .get(x)
            .and_then(|row| row.get(y))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every block, in row-major order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.grid.iter().flatten().flatten()
    }

    pub fn blocks_of(&self, kind: &str) -> &[Block] {
        self.kind_to_blocks
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn properties_of(&self, kind: &str) -> &[String] {
        self.kind_to_properties
            .get(kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn kinds_with(&self, property: &str) -> &[String] {
        self.property_to_kinds
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn kind_to_properties(&self) -> &BTreeMap<String, Vec<String>> {
        &self.kind_to_properties
    }

    /// Place a block in the cell named by its coordinates.
    ///
    /// Blocks outside the grid are dropped with a warning.
    pub fn add(&mut self, block: Block) {
        if !self.in_bounds(block.x as i64, block.y as i64) {
            warn!(block = %block, "trying to add a block outside the map");
            return;
        }
        insert_sorted(&mut self.grid[block.x][block.y], block);
        self.reindex_blocks();
    }

    /// Move `block` to `(nx, ny)`. Returns `false` when nothing moved.
    ///
    /// Targets outside the grid log a warning and leave the state untouched.
    pub fn move_block(&mut self, block: &Block, nx: i64, ny: i64) -> bool {
        if !self.in_bounds(nx, ny) {
            warn!(
                block = %block,
                to_x = nx,
                to_y = ny,
                "trying to move outside the map"
            );
            return false;
        }
        if !self.take(block) {
            return false;
        }
        let moved = Block::new(block.kind.clone(), nx as usize, ny as usize);
        insert_sorted(&mut self.grid[moved.x][moved.y], moved);
        self.reindex_blocks();
        true
    }

    /// Remove `block` from the grid. Returns `false` if it was not present.
    pub fn remove(&mut self, block: &Block) -> bool {
        let removed = self.take(block);
        if removed {
            self.reindex_blocks();
        }
        removed
    }

    fn take(&mut self, block: &Block) -> bool {
        let Some(cell) = self.grid.get_mut(block.x).and_then(|row| row.get_mut(block.y)) else {
            return false;
        };
        match cell.iter().position(|b| b == block) {
            Some(index) => {
                cell.remove(index);
                true
            }
            None => false,
        }
    }

    /// Re-derive the rule indices from the current grid contents.
    pub fn refresh_rules(&mut self) {
        self.kind_to_properties = derive_rules(&self.grid, self.cols);
        let mut property_to_kinds: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (kind, properties) in &self.kind_to_properties {
            for property in properties {
                property_to_kinds
                    .entry(property.clone())
                    .or_default()
                    .push(kind.clone());
            }
        }
        self.property_to_kinds = property_to_kinds;
    }

    fn reindex_blocks(&mut self) {
        let mut index: BTreeMap<String, Vec<Block>> = BTreeMap::new();
        for block in self.grid.iter().flatten().flatten() {
            index.entry(block.kind.clone()).or_default().push(block.clone());
        }
        self.kind_to_blocks = index;
    }

    /// Active rules as sorted `NOUN IS PROPERTY` lines.
    pub fn rules_text(&self) -> String {
        let mut lines: Vec<String> = self
            .kind_to_properties
            .iter()
            .flat_map(|(kind, properties)| {
                properties.iter().map(move |property| {
                    format!(
                        "{} IS {}",
                        kinds::display_kind(kind),
                        kinds::display_kind(property)
                    )
                })
            })
            .collect();
        lines.sort();
        lines.dedup();
        lines.join("\n")
    }

    /// Property names granted by any active rule, textual prefix stripped.
    pub fn active_properties(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .kind_to_properties
            .values()
            .flatten()
            .map(|property| kinds::noun_references_to(property).to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Sorted `(kind, x, y)` atoms true in this state.
    pub fn atoms(&self) -> Vec<Block> {
        let mut atoms: Vec<Block> = self.blocks().cloned().collect();
        atoms.sort();
        atoms
    }
}

impl PartialEq for WorldState {
    fn eq(&self, other: &Self) -> bool {
        self.cols == other.cols && self.grid == other.grid
    }
}

impl Eq for WorldState {}

impl Hash for WorldState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cols.hash(state);
        self.grid.hash(state);
    }
}

impl fmt::Display for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_grid_string())
    }
}

impl std::str::FromStr for WorldState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_grid_string(s).context("parse grid text")
    }
}

fn insert_sorted(cell: &mut Cell, block: Block) {
    let at = cell.partition_point(|b| b.kind <= block.kind);
    cell.insert(at, block);
}

fn derive_rules(grid: &[Vec<Cell>], cols: usize) -> BTreeMap<String, Vec<String>> {
    let mut rules = BTreeMap::new();
    let rows = grid.len();

    for x in 0..rows {
        for y in 0..cols.saturating_sub(2) {
            register_triple(&mut rules, &grid[x][y], &grid[x][y + 1], &grid[x][y + 2]);
        }
    }
    for x in 0..rows.saturating_sub(2) {
        for y in 0..cols {
            register_triple(&mut rules, &grid[x][y], &grid[x + 1][y], &grid[x + 2][y]);
        }
    }
    for block in grid.iter().flatten().flatten() {
        if kinds::is_text(&block.kind) {
            add_rule(&mut rules, &block.kind, TEXT_PROPERTY);
        }
    }
    rules
}

fn register_triple(
    rules: &mut BTreeMap<String, Vec<String>>,
    left: &[Block],
    middle: &[Block],
    right: &[Block],
) {
    if !middle.iter().any(|b| b.kind == COPY_TOKEN) {
        return;
    }
    for noun in left.iter().filter(|b| kinds::is_noun_token(&b.kind)) {
        for property in right
            .iter()
            .filter(|b| kinds::is_noun_token(&b.kind) || kinds::is_property_token(&b.kind))
        {
            add_rule(
                rules,
                kinds::noun_references_to(&noun.kind),
                kinds::noun_references_to(&property.kind),
            );
        }
    }
}

fn add_rule(rules: &mut BTreeMap<String, Vec<String>>, noun: &str, property: &str) {
    let properties = rules.entry(noun.to_string()).or_default();
    if !properties.iter().any(|p| p == property) {
        properties.push(property.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL: &str = "\
y/x | 1        | 2       | 3
----+----------+---------+---------
1   | text_baba | text_is | text_you
2   | baba     |         | flag
3   | text_flag | text_is | text_win";

    fn level() -> WorldState {
        WorldState::from_grid_string(LEVEL).expect("parse level")
    }

    #[test]
    fn parses_dimensions_and_blocks() {
        let state = level();
        assert_eq!(state.rows(), 3);
        assert_eq!(state.cols(), 3);
        assert_eq!(state.cell(1, 0), &[Block::new("baba", 1, 0)]);
        assert_eq!(state.blocks_of("flag"), &[Block::new("flag", 1, 2)]);
        assert!(state.cell(1, 1).is_empty());
    }

    #[test]
    fn derives_horizontal_rules_and_text_push() {
        let state = level();
        assert_eq!(state.properties_of("baba"), &["you".to_string()]);
        assert_eq!(state.properties_of("flag"), &["win".to_string()]);
        assert_eq!(state.properties_of("text_is"), &["push".to_string()]);
        assert!(state.kinds_with("you").contains(&"baba".to_string()));
    }

    #[test]
    fn derives_vertical_rules_with_copy_token() {
        let text = "\
y/x | 1
----+-----
1   | text_rock
2   | text_is
3   | text_stop";
        let state = WorldState::from_grid_string(text).expect("parse");
        assert_eq!(state.properties_of("rock"), &["stop".to_string()]);
    }

    #[test]
    fn ignores_triples_without_valid_noun() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_you | text_is | text_win
2   | baba | text_is | text_win";
        let state = WorldState::from_grid_string(text).expect("parse");
        assert!(state.properties_of("you").is_empty());
        assert!(state.properties_of("baba").is_empty());
    }

    #[test]
    fn registers_every_kind_combination_once() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_baba,text_rock | text_is | text_push,text_you";
        let mut state = WorldState::from_grid_string(text).expect("parse");
        state.refresh_rules();
        assert_eq!(
            state.properties_of("baba"),
            &["push".to_string(), "you".to_string()]
        );
        assert_eq!(
            state.properties_of("rock"),
            &["push".to_string(), "you".to_string()]
        );
    }

    #[test]
    fn noun_is_noun_rules_keep_noun_name() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_rock | text_is | text_flag";
        let state = WorldState::from_grid_string(text).expect("parse");
        assert_eq!(state.properties_of("rock"), &["flag".to_string()]);
    }

    #[test]
    fn equality_ignores_insertion_order_and_outcome() {
        let mut a = WorldState::empty(2, 2);
        a.add(Block::new("rock", 0, 0));
        a.add(Block::new("baba", 0, 0));
        let mut b = WorldState::empty(2, 2);
        b.add(Block::new("baba", 0, 0));
        b.add(Block::new("rock", 0, 0));
        b.set_outcome(Outcome::Win);
        assert_eq!(a, b);
    }

    #[test]
    fn move_out_of_bounds_is_a_no_op() {
        let mut state = level();
        let before = state.clone();
        let baba = Block::new("baba", 1, 0);
        assert!(!state.move_block(&baba, 1, -1));
        assert!(!state.move_block(&baba, 3, 0));
        assert_eq!(state, before);
        assert_eq!(state.blocks_of("baba"), &[baba]);
    }

    #[test]
    fn move_updates_block_index() {
        let mut state = level();
        let baba = Block::new("baba", 1, 0);
        assert!(state.move_block(&baba, 1, 1));
        assert_eq!(state.blocks_of("baba"), &[Block::new("baba", 1, 1)]);
        assert!(state.cell(1, 0).is_empty());
    }

    #[test]
    fn rules_follow_refresh_not_moves() {
        let mut state = level();
        let you = Block::new("text_you", 0, 2);
        assert!(state.remove(&you));
        assert_eq!(state.properties_of("baba"), &["you".to_string()]);
        state.refresh_rules();
        assert!(state.properties_of("baba").is_empty());
    }

    #[test]
    fn grid_text_round_trips() {
        let state = level();
        let rendered = state.to_grid_string();
        let parsed = WorldState::from_grid_string(&rendered).expect("parse rendered");
        assert_eq!(parsed, state);
        assert_eq!(parsed.kind_to_properties(), state.kind_to_properties());
    }

    #[test]
    fn rejects_ragged_rows() {
        let text = "y/x | 1 | 2\n----\n1 | baba";
        assert!(WorldState::from_grid_string(text).is_err());
        assert!(WorldState::from_grid_string("y/x | 1").is_err());
    }

    #[test]
    fn rules_text_collapses_textual_kinds() {
        let text = level().rules_text();
        assert!(text.contains("baba IS you"));
        assert!(text.contains("flag IS win"));
        assert!(text.contains("text IS push"));
        assert_eq!(text.matches("text IS push").count(), 1);
    }

    #[test]
    fn atoms_are_sorted_blocks() {
        let atoms = level().atoms();
        assert_eq!(atoms.len(), 8);
        assert!(atoms.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
