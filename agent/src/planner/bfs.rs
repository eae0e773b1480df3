//! Breadth-first planner with duplicate detection by state value.

use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::action::{Action, format_plan};
use crate::core::world::WorldState;
use crate::planner::{Planner, SearchArena, TrajectoryStep, Transition};

/// Breadth-first search returning a shortest plan.
///
/// The goal sees the whole trajectory leading to the current state, so it can
/// express conditions on the path as well as on the final layout.
pub struct BfsPlanner<G> {
    goal: G,
}

impl<G> BfsPlanner<G>
where
    G: Fn(&[TrajectoryStep], &WorldState) -> bool,
{
    pub fn new(goal: G) -> Self {
        Self { goal }
    }
}

impl<G> Planner for BfsPlanner<G>
where
    G: Fn(&[TrajectoryStep], &WorldState) -> bool,
{
    #[instrument(skip_all, fields(max_depth = ?max_depth))]
    fn plan(
        &self,
        transition: &mut dyn Transition,
        start: &WorldState,
        max_depth: Option<usize>,
    ) -> Result<Option<Vec<Action>>> {
        let root = Rc::new(start.clone());
        let mut arena = SearchArena::with_root(Rc::clone(&root));
        let mut visited: HashSet<Rc<WorldState>> = HashSet::from([root]);
        let mut queue = VecDeque::from([SearchArena::ROOT]);

        while let Some(id) = queue.pop_front() {
            let trajectory = arena.trajectory(id);
            if (self.goal)(&trajectory, arena.state(id)) {
                let plan = arena.plan(id);
                debug!(nodes = arena.len(), plan = %format_plan(&plan), "bfs found plan");
                return Ok(Some(plan));
            }
            if max_depth.is_some_and(|limit| arena.depth(id) >= limit) {
                continue;
            }

            let current = Rc::clone(arena.state(id));
            for action in Action::ALL {
                let next = Rc::new(transition.step(&current, action)?);
                if visited.insert(Rc::clone(&next)) {
                    let child = arena.push(id, action, next);
                    queue.push_back(child);
                }
            }
        }

        debug!(nodes = arena.len(), "bfs exhausted search space");
        Ok(None)
    }
}
