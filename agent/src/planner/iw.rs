//! Iterated-width planner with novelty pruning.
//!
//! A successor survives only if its atoms contain a width-sized combination
//! never seen before in the current search. Width 1 runs first; width 2 runs
//! only when width 1 finds nothing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::action::{Action, format_plan};
use crate::core::world::{Block, WorldState};
use crate::planner::{Planner, SearchArena, Transition};

/// Widths tried in order.
pub const WIDTHS: [usize; 2] = [1, 2];

/// Iterated-width search. The goal sees only the current state.
pub struct IwPlanner<G> {
    goal: G,
}

impl<G> IwPlanner<G>
where
    G: Fn(&WorldState) -> bool,
{
    pub fn new(goal: G) -> Self {
        Self { goal }
    }

    fn solve(
        &self,
        transition: &mut dyn Transition,
        start: &WorldState,
        width: usize,
        max_depth: Option<usize>,
    ) -> Result<Option<Vec<Action>>> {
        let mut novelty = NoveltyTable::new(width);
        novelty.register(start);

        let mut arena = SearchArena::with_root(Rc::new(start.clone()));
        let mut queue = VecDeque::from([SearchArena::ROOT]);
        while let Some(id) = queue.pop_front() {
            if max_depth.is_some_and(|limit| arena.depth(id) > limit) {
                continue;
            }
            if (self.goal)(arena.state(id)) {
                let plan = arena.plan(id);
                debug!(width, nodes = arena.len(), plan = %format_plan(&plan), "iw found plan");
                return Ok(Some(plan));
            }

            let current = Rc::clone(arena.state(id));
            for action in Action::ALL {
                let next = transition.step(&current, action)?;
                if novelty.register(&next) {
                    let child = arena.push(id, action, Rc::new(next));
                    queue.push_back(child);
                }
            }
        }

        debug!(width, nodes = arena.len(), "iw exhausted search space");
        Ok(None)
    }
}

impl<G> Planner for IwPlanner<G>
where
    G: Fn(&WorldState) -> bool,
{
    #[instrument(skip_all, fields(max_depth = ?max_depth))]
    fn plan(
        &self,
        transition: &mut dyn Transition,
        start: &WorldState,
        max_depth: Option<usize>,
    ) -> Result<Option<Vec<Action>>> {
        for width in WIDTHS {
            if let Some(plan) = self.solve(transition, start, width, max_depth)? {
                return Ok(Some(plan));
            }
        }
        Ok(None)
    }
}

/// Seen atom combinations of one width, keyed by interned atom ids.
struct NoveltyTable {
    width: usize,
    atom_ids: HashMap<Block, u32>,
    seen: HashSet<Vec<u32>>,
}

impl NoveltyTable {
    fn new(width: usize) -> Self {
        Self {
            width,
            atom_ids: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    /// Record every combination of `state`'s atoms; returns `true` if any was new.
    fn register(&mut self, state: &WorldState) -> bool {
        let mut ids: Vec<u32> = state
            .atoms()
            .into_iter()
            .map(|atom| {
                let next_id = self.atom_ids.len() as u32;
                *self.atom_ids.entry(atom).or_insert(next_id)
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let mut novel = false;
        for_each_combination(&ids, self.width, &mut |combination| {
            if self.seen.insert(combination.to_vec()) {
                novel = true;
            }
        });
        novel
    }
}

/// Call `visit` with every sorted `width`-combination of `items`.
fn for_each_combination(items: &[u32], width: usize, visit: &mut dyn FnMut(&[u32])) {
    fn recurse(
        items: &[u32],
        width: usize,
        start: usize,
        current: &mut Vec<u32>,
        visit: &mut dyn FnMut(&[u32]),
    ) {
        if current.len() == width {
            visit(current);
            return;
        }
        let remaining = width - current.len();
        for index in start..items.len() {
            if items.len() - index < remaining {
                break;
            }
            current.push(items[index]);
            recurse(items, width, index + 1, current, visit);
            current.pop();
        }
    }

    if width == 0 || width > items.len() {
        return;
    }
    let mut current = Vec::with_capacity(width);
    recurse(items, width, 0, &mut current, visit);
}
