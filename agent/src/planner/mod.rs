//! Forward search over a transition function.
//!
//! Both planners expand nodes by stepping the [`Transition`] with every action
//! of [`Action::ALL`], in order, and return the actions of the first path
//! whose state satisfies the goal. Search nodes are immutable `Rc` snapshots
//! kept in a [`SearchArena`]; paths are parent links, never copied vectors.

pub mod bfs;
pub mod iw;

use std::rc::Rc;

use anyhow::Result;

use crate::core::action::Action;
use crate::core::physics::{Physics, RuleTable};
use crate::core::world::{Outcome, WorldState};
use crate::io::config::Algorithm;

pub use bfs::BfsPlanner;
pub use iw::IwPlanner;

/// Successor function used by the planners.
///
/// Implementations receive the parent by reference and must return an
/// independent successor; the parent is shared with the rest of the search.
pub trait Transition {
    fn step(&mut self, state: &WorldState, action: Action) -> Result<WorldState>;
}

impl Transition for RuleTable {
    fn step(&mut self, state: &WorldState, action: Action) -> Result<WorldState> {
        Ok(self.apply(state, action)?)
    }
}

/// Adapts a closure into a [`Transition`].
pub struct FnTransition<F>(pub F);

impl<F> Transition for FnTransition<F>
where
    F: FnMut(&WorldState, Action) -> Result<WorldState>,
{
    fn step(&mut self, state: &WorldState, action: Action) -> Result<WorldState> {
        (self.0)(state, action)
    }
}

/// A search strategy.
pub trait Planner {
    /// Find an action sequence from `start` to a goal state.
    ///
    /// `Ok(None)` means the search space under the depth bound holds no goal.
    /// Errors come only from the transition function.
    fn plan(
        &self,
        transition: &mut dyn Transition,
        start: &WorldState,
        max_depth: Option<usize>,
    ) -> Result<Option<Vec<Action>>>;
}

/// One step of a trajectory: the state an action was taken in, and the action.
#[derive(Debug, Clone)]
pub struct TrajectoryStep {
    pub state: Rc<WorldState>,
    pub action: Action,
}

/// Goal used by the agent loop: the predicted outcome is a win.
pub fn outcome_is_win(state: &WorldState) -> bool {
    state.outcome() == Outcome::Win
}

/// Search for a winning plan with the configured algorithm.
pub fn plan_to_win(
    algorithm: Algorithm,
    transition: &mut dyn Transition,
    start: &WorldState,
    max_depth: Option<usize>,
) -> Result<Option<Vec<Action>>> {
    match algorithm {
        Algorithm::Bfs => {
            BfsPlanner::new(|_: &[TrajectoryStep], state: &WorldState| outcome_is_win(state))
                .plan(transition, start, max_depth)
        }
        Algorithm::Iw => IwPlanner::new(outcome_is_win).plan(transition, start, max_depth),
    }
}

struct SearchNode {
    state: Rc<WorldState>,
    parent: Option<usize>,
    action: Option<Action>,
    depth: usize,
}

/// Append-only store of search nodes linked to their parents.
pub(crate) struct SearchArena {
    nodes: Vec<SearchNode>,
}

impl SearchArena {
    pub(crate) fn with_root(state: Rc<WorldState>) -> Self {
        Self {
            nodes: vec![SearchNode {
                state,
                parent: None,
                action: None,
                depth: 0,
            }],
        }
    }

    pub(crate) const ROOT: usize = 0;

    pub(crate) fn push(&mut self, parent: usize, action: Action, state: Rc<WorldState>) -> usize {
        let depth = self.nodes[parent].depth + 1;
        self.nodes.push(SearchNode {
            state,
            parent: Some(parent),
            action: Some(action),
            depth,
        });
        self.nodes.len() - 1
    }

    pub(crate) fn state(&self, id: usize) -> &Rc<WorldState> {
        &self.nodes[id].state
    }

    pub(crate) fn depth(&self, id: usize) -> usize {
        self.nodes[id].depth
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `(parent state, action)` pairs from the root down to `id`.
    pub(crate) fn trajectory(&self, id: usize) -> Vec<TrajectoryStep> {
        let mut steps = Vec::with_capacity(self.nodes[id].depth);
        let mut cursor = id;
        while let (Some(parent), Some(action)) =
            (self.nodes[cursor].parent, self.nodes[cursor].action)
        {
            steps.push(TrajectoryStep {
                state: Rc::clone(&self.nodes[parent].state),
                action,
            });
            cursor = parent;
        }
        steps.reverse();
        steps
    }

    pub(crate) fn plan(&self, id: usize) -> Vec<Action> {
        self.trajectory(id).into_iter().map(|step| step.action).collect()
    }
}
