//! Data-driven transition rules.
//!
//! A transition source is a TOML table binding rule properties to a closed set
//! of behaviours. Compiling it yields a [`RuleTable`], the [`Physics`] used to
//! predict the next state. An empty source compiles to the no-op table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::core::action::Action;
use crate::core::kinds;
use crate::core::world::{Block, Outcome, WorldState};

/// A table that reproduces the usual rules of the game.
pub const STANDARD_SOURCE: &str = r#"transform = true

[properties]
you = "controlled"
push = "pushable"
stop = "blocking"
win = "goal"
defeat = "fatal"
hot = "hot"
melt = "meltable"
sink = "sink"
open = "opens"
shut = "shut"
"#;

/// Faults raised while compiling or applying a transition source.
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("invalid rule table: {0}")]
    Syntax(#[from] toml::de::Error),
    #[error("unknown behaviour {behaviour:?} bound to property {property:?}")]
    UnknownBehaviour { property: String, behaviour: String },
    #[error("property {property:?} names a noun and cannot carry a behaviour")]
    NounProperty { property: String },
}

impl PhysicsError {
    /// Short machine-readable label used in fault reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PhysicsError::Syntax(_) => "syntax",
            PhysicsError::UnknownBehaviour { .. } => "unknown_behaviour",
            PhysicsError::NounProperty { .. } => "noun_property",
        }
    }
}

/// Strategy that computes the successor of a state under an action.
pub trait Physics {
    /// Returns a new state; `state` itself is never modified.
    fn apply(&self, state: &WorldState, action: Action) -> Result<WorldState, PhysicsError>;
}

/// What a property makes a block do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behaviour {
    Controlled,
    Pushable,
    Blocking,
    Goal,
    Fatal,
    Hot,
    Meltable,
    Sink,
    Opens,
    Shut,
}

impl Behaviour {
    pub const ALL: [Behaviour; 10] = [
        Behaviour::Controlled,
        Behaviour::Pushable,
        Behaviour::Blocking,
        Behaviour::Goal,
        Behaviour::Fatal,
        Behaviour::Hot,
        Behaviour::Meltable,
        Behaviour::Sink,
        Behaviour::Opens,
        Behaviour::Shut,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Behaviour::Controlled => "controlled",
            Behaviour::Pushable => "pushable",
            Behaviour::Blocking => "blocking",
            Behaviour::Goal => "goal",
            Behaviour::Fatal => "fatal",
            Behaviour::Hot => "hot",
            Behaviour::Meltable => "meltable",
            Behaviour::Sink => "sink",
            Behaviour::Opens => "opens",
            Behaviour::Shut => "shut",
        }
    }
}

impl fmt::Display for Behaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Behaviour {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Behaviour::ALL
            .into_iter()
            .find(|behaviour| behaviour.as_str() == s)
            .ok_or(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RuleTableSource {
    transform: bool,
    properties: BTreeMap<String, String>,
}

/// Compiled transition rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    transform: bool,
    behaviours: BTreeMap<String, Behaviour>,
}

impl RuleTable {
    /// Compile a TOML transition source.
    pub fn compile(source: &str) -> Result<Self, PhysicsError> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RuleTableSource = toml::from_str(source)?;
        let mut behaviours = BTreeMap::new();
        for (property, name) in raw.properties {
            let property = property.trim().to_ascii_lowercase();
            if kinds::is_noun(&property) {
                return Err(PhysicsError::NounProperty { property });
            }
            let behaviour = name
                .trim()
                .to_ascii_lowercase()
                .parse::<Behaviour>()
                .map_err(|()| PhysicsError::UnknownBehaviour {
                    property: property.clone(),
                    behaviour: name.clone(),
                })?;
            behaviours.insert(property, behaviour);
        }
        Ok(Self {
            transform: raw.transform,
            behaviours,
        })
    }

    pub fn is_noop(&self) -> bool {
        !self.transform && self.behaviours.is_empty()
    }

    fn defines(&self, behaviour: Behaviour) -> bool {
        self.behaviours.values().any(|b| *b == behaviour)
    }

    /// Whether blocks of `kind` exhibit `behaviour` under the rules of `state`.
    ///
    /// Textual kinds also inherit whatever the `text` noun is granted.
    pub fn has(&self, state: &WorldState, kind: &str, behaviour: Behaviour) -> bool {
        let granted = |properties: &[String]| {
            properties
                .iter()
                .any(|p| self.behaviours.get(p.as_str()) == Some(&behaviour))
        };
        granted(state.properties_of(kind))
            || (kinds::is_text(kind) && granted(state.properties_of("text")))
    }

    /// Move `mover` one cell, pushing any chain ahead of it. Returns the
    /// blocks at their new positions, empty when the move is blocked.
    fn try_move(&self, state: &mut WorldState, mover: &Block, dx: i64, dy: i64) -> Vec<Block> {
        let mut chain: Vec<Block> = Vec::new();
        let (mut cx, mut cy) = (mover.x as i64 + dx, mover.y as i64 + dy);
        loop {
            if !state.in_bounds(cx, cy) {
                return Vec::new();
            }
            let cell = state.cell(cx as usize, cy as usize);
            let pushable: Vec<Block> = cell
                .iter()
                .filter(|b| self.has(state, &b.kind, Behaviour::Pushable))
                .cloned()
                .collect();
            let blocked = cell.iter().any(|b| {
                self.has(state, &b.kind, Behaviour::Blocking)
                    && !self.has(state, &b.kind, Behaviour::Pushable)
            });
            if blocked {
                return Vec::new();
            }
            if pushable.is_empty() {
                break;
            }
            chain.extend(pushable);
            cx += dx;
            cy += dy;
        }
        chain.insert(0, mover.clone());
        let mut arrived = Vec::with_capacity(chain.len());
        for block in chain.iter().rev() {
            let (nx, ny) = (block.x as i64 + dx, block.y as i64 + dy);
            if state.move_block(block, nx, ny) {
                arrived.push(Block::new(block.kind.clone(), nx as usize, ny as usize));
            }
        }
        arrived
    }

    fn apply_transforms(&self, state: &mut WorldState) {
        let mut changes: Vec<(Block, String)> = Vec::new();
        for (kind, properties) in state.kind_to_properties() {
            if kinds::is_text(kind) || properties.contains(kind) {
                continue;
            }
            let Some(target) = properties.iter().find(|p| kinds::is_noun(p)) else {
                continue;
            };
            changes.extend(
                state
                    .blocks_of(kind)
                    .iter()
                    .map(|block| (block.clone(), target.clone())),
            );
        }
        for (block, target) in changes {
            if state.remove(&block) {
                state.add(Block::new(target, block.x, block.y));
            }
        }
    }

    fn resolve_interactions(&self, state: &mut WorldState) {
        for x in 0..state.rows() {
            for y in 0..state.cols() {
                let cell = state.cell(x, y).to_vec();
                if cell.is_empty() {
                    continue;
                }
                let with = |behaviour| -> Vec<Block> {
                    cell.iter()
                        .filter(|b| self.has(state, &b.kind, behaviour))
                        .cloned()
                        .collect()
                };
                let mut doomed: Vec<Block> = Vec::new();
                if cell.len() > 1 && !with(Behaviour::Sink).is_empty() {
                    doomed.extend(cell.iter().cloned());
                } else {
                    if !with(Behaviour::Hot).is_empty() {
                        doomed.extend(with(Behaviour::Meltable));
                    }
                    let pairs = with(Behaviour::Opens)
                        .into_iter()
                        .zip(with(Behaviour::Shut));
                    for (open, shut) in pairs {
                        if open != shut {
                            doomed.push(open);
                            doomed.push(shut);
                        }
                    }
                    if !with(Behaviour::Fatal).is_empty() {
                        doomed.extend(with(Behaviour::Controlled));
                    }
                }
                for block in &doomed {
                    state.remove(block);
                }
            }
        }
    }

    fn judge(&self, state: &WorldState) -> Outcome {
        let controlled: Vec<&Block> = state
            .blocks()
            .filter(|b| self.has(state, &b.kind, Behaviour::Controlled))
            .collect();
        let won = controlled.iter().any(|mover| {
            state
                .cell(mover.x, mover.y)
                .iter()
                .any(|b| self.has(state, &b.kind, Behaviour::Goal))
        });
        if won {
            Outcome::Win
        } else if controlled.is_empty() && self.defines(Behaviour::Controlled) {
            Outcome::Loss
        } else {
            Outcome::Ongoing
        }
    }
}

impl Physics for RuleTable {
    fn apply(&self, state: &WorldState, action: Action) -> Result<WorldState, PhysicsError> {
        let mut next = state.clone();
        next.set_outcome(Outcome::Ongoing);
        if self.is_noop() {
            return Ok(next);
        }

        let (dx, dy) = action.delta();
        if (dx, dy) != (0, 0) {
            let mut movers: Vec<Block> = next
                .blocks()
                .filter(|b| self.has(&next, &b.kind, Behaviour::Controlled))
                .cloned()
                .collect();
            // Leading movers go first so the ones behind follow into the
            // vacated cells instead of pushing them.
            let lead = |b: &Block| b.x as i64 * dx + b.y as i64 * dy;
            movers.sort_by(|a, b| {
                lead(b)
                    .cmp(&lead(a))
                    .then_with(|| (a.x, a.y, &a.kind).cmp(&(b.x, b.y, &b.kind)))
            });
            // Blocks that reached a cell this step, so an equal-valued block
            // that already moved is never taken for an unmoved mover.
            let mut arrived: BTreeMap<Block, usize> = BTreeMap::new();
            for mover in &movers {
                let present = next
                    .cell(mover.x, mover.y)
                    .iter()
                    .filter(|b| *b == mover)
                    .count();
                if present <= arrived.get(mover).copied().unwrap_or(0) {
                    continue;
                }
                for block in self.try_move(&mut next, mover, dx, dy) {
                    *arrived.entry(block).or_default() += 1;
                }
            }
        }

        next.refresh_rules();
        if self.transform {
            self.apply_transforms(&mut next);
            next.refresh_rules();
        }
        self.resolve_interactions(&mut next);
        next.refresh_rules();
        let outcome = self.judge(&next);
        next.set_outcome(outcome);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard() -> RuleTable {
        RuleTable::compile(STANDARD_SOURCE).expect("standard table compiles")
    }

    fn grid(text: &str) -> WorldState {
        WorldState::from_grid_string(text).expect("parse grid")
    }

    const PLAYGROUND: &str = "\
y/x | 1 | 2 | 3 | 4
----+---+---+---+---
1   | text_baba | text_is | text_you |
2   | baba | rock | | wall
3   | text_rock | text_is | text_push |
4   | text_wall | text_is | text_stop |
5   | text_flag | text_is | text_win | flag";

    #[test]
    fn empty_source_is_a_no_op() {
        let table = RuleTable::compile("  \n").expect("compile");
        assert!(table.is_noop());
        let state = grid(PLAYGROUND);
        let next = table.apply(&state, Action::Right).expect("apply");
        assert_eq!(next, state);
        assert_eq!(next.outcome(), Outcome::Ongoing);
    }

    #[test]
    fn unknown_behaviour_is_a_compile_fault() {
        let err = RuleTable::compile("[properties]\nyou = \"teleports\"\n").expect_err("fault");
        assert_eq!(err.kind(), "unknown_behaviour");
    }

    #[test]
    fn malformed_toml_is_a_compile_fault() {
        let err = RuleTable::compile("[properties\nyou = 1").expect_err("fault");
        assert_eq!(err.kind(), "syntax");
        let err = RuleTable::compile("gravity = true").expect_err("unknown key");
        assert_eq!(err.kind(), "syntax");
    }

    #[test]
    fn noun_properties_are_rejected() {
        let err = RuleTable::compile("[properties]\nrock = \"pushable\"\n").expect_err("fault");
        assert_eq!(err.kind(), "noun_property");
    }

    #[test]
    fn controlled_block_pushes_chain() {
        let state = grid(PLAYGROUND);
        let next = standard().apply(&state, Action::Right).expect("apply");
        assert_eq!(next.blocks_of("baba"), &[Block::new("baba", 1, 1)]);
        assert_eq!(next.blocks_of("rock"), &[Block::new("rock", 1, 2)]);
        assert_eq!(next.outcome(), Outcome::Ongoing);
    }

    /// Verifies adjacent controlled blocks each advance exactly one cell.
    #[test]
    fn adjacent_controlled_blocks_move_once() {
        let text = "\
y/x | 1 | 2 | 3 | 4 | 5
----+---+---+---+---+---
1   | text_baba | text_is | text_you | |
2   | baba | baba | | |
3   | text_baba | text_is | text_push | |";
        let table = standard();
        let next = table.apply(&grid(text), Action::Right).expect("apply");
        assert_eq!(
            next.blocks_of("baba"),
            &[Block::new("baba", 1, 1), Block::new("baba", 1, 2)]
        );

        let back = table.apply(&next, Action::Left).expect("apply");
        assert_eq!(
            back.blocks_of("baba"),
            &[Block::new("baba", 1, 0), Block::new("baba", 1, 1)]
        );
    }

    #[test]
    fn stacked_controlled_blocks_move_together() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_baba | text_is | text_you
2   | baba,baba | |";
        let next = standard().apply(&grid(text), Action::Right).expect("apply");
        assert_eq!(
            next.blocks_of("baba"),
            &[Block::new("baba", 1, 1), Block::new("baba", 1, 1)]
        );
    }

    #[test]
    fn stop_blocks_the_whole_chain() {
        let state = grid(PLAYGROUND);
        let table = standard();
        let once = table.apply(&state, Action::Right).expect("first");
        let twice = table.apply(&once, Action::Right).expect("second");
        assert_eq!(twice, once);
    }

    #[test]
    fn edge_of_map_blocks_movement() {
        let state = grid(PLAYGROUND);
        let next = standard().apply(&state, Action::Left).expect("apply");
        assert_eq!(next, state);
    }

    #[test]
    fn reaching_goal_wins() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_baba | text_is | text_you
2   | baba | flag |
3   | text_flag | text_is | text_win";
        let next = standard().apply(&grid(text), Action::Right).expect("apply");
        assert_eq!(next.outcome(), Outcome::Win);
    }

    #[test]
    fn pushing_text_out_of_a_rule_loses_control() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | | baba |
2   | text_baba | text_is | text_you
3   | | |";
        let next = standard().apply(&grid(text), Action::Down).expect("apply");
        assert_eq!(next.blocks_of("text_is"), &[Block::new("text_is", 2, 1)]);
        assert!(next.properties_of("baba").is_empty());
        assert_eq!(next.outcome(), Outcome::Loss);
    }

    #[test]
    fn text_at_the_map_edge_cannot_be_pushed() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | | | baba
2   | text_baba | text_is | text_you";
        let state = grid(text);
        let next = standard().apply(&state, Action::Down).expect("apply");
        assert_eq!(next, state);
        assert_eq!(next.outcome(), Outcome::Ongoing);
    }

    #[test]
    fn defeat_destroys_controlled_and_loses() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_baba | text_is | text_you
2   | baba | skull |
3   | text_skull | text_is | text_defeat";
        let next = standard().apply(&grid(text), Action::Right).expect("apply");
        assert!(next.blocks_of("baba").is_empty());
        assert_eq!(next.outcome(), Outcome::Loss);
    }

    #[test]
    fn sink_clears_its_cell() {
        let text = "\
y/x | 1 | 2 | 3 | 4
----+---+---+---+---
1   | text_baba | text_is | text_you |
2   | baba | rock | water |
3   | text_rock | text_is | text_push |
4   | text_water | text_is | text_sink |";
        let next = standard().apply(&grid(text), Action::Right).expect("apply");
        assert!(next.blocks_of("rock").is_empty());
        assert!(next.blocks_of("water").is_empty());
        assert_eq!(next.blocks_of("baba"), &[Block::new("baba", 1, 1)]);
    }

    #[test]
    fn hot_melts_meltable() {
        // BABA IS MELT is read downwards in the last column.
        let text = "\
y/x | 1 | 2 | 3 | 4
----+---+---+---+---
1   | text_baba | text_is | text_you | text_baba
2   | baba | lava | | text_is
3   | text_lava | text_is | text_hot | text_melt";
        let next = standard().apply(&grid(text), Action::Right).expect("apply");
        assert!(next.blocks_of("baba").is_empty());
        assert_eq!(next.blocks_of("lava"), &[Block::new("lava", 1, 1)]);
    }

    #[test]
    fn noun_is_noun_transforms_blocks() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_baba | text_is | text_you
2   | rock | | baba
3   | text_rock | text_is | text_flag";
        let next = standard().apply(&grid(text), Action::Still).expect("apply");
        assert!(next.blocks_of("rock").is_empty());
        assert_eq!(next.blocks_of("flag"), &[Block::new("flag", 1, 0)]);
    }

    #[test]
    fn text_noun_grants_properties_to_all_text() {
        let text = "\
y/x | 1 | 2 | 3
----+---+---+---
1   | text_text | text_is | text_win";
        let state = grid(text);
        assert!(standard().has(&state, "text_is", Behaviour::Goal));
        assert!(!standard().has(&state, "baba", Behaviour::Goal));
    }
}
