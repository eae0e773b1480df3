//! Property tests for world-state equality and the grid text format.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use agent::core::world::{Block, Outcome, WorldState};
use proptest::prelude::*;

const KINDS: [&str; 7] = ["baba", "flag", "rock", "wall", "text_baba", "text_is", "text_you"];

fn arb_world() -> impl Strategy<Value = WorldState> {
    (1usize..=5, 1usize..=5).prop_flat_map(|(rows, cols)| {
        proptest::collection::vec(
            proptest::collection::vec(proptest::sample::select(KINDS.to_vec()), 0..=2),
            rows * cols,
        )
        .prop_map(move |cells| {
            let mut state = WorldState::empty(rows, cols);
            for (index, kinds) in cells.into_iter().enumerate() {
                for kind in kinds {
                    state.add(Block::new(kind, index / cols, index % cols));
                }
            }
            state
        })
    })
}

/// Dimensions plus one block list in two independent orders.
fn arb_blocks_in_two_orders() -> impl Strategy<Value = (usize, usize, Vec<Block>, Vec<Block>)> {
    (1usize..=4, 1usize..=4).prop_flat_map(|(rows, cols)| {
        proptest::collection::vec(
            (
                0..rows,
                0..cols,
                proptest::sample::select(KINDS.to_vec()),
            ),
            0..=12,
        )
        .prop_flat_map(move |entries| {
            let blocks: Vec<Block> = entries
                .into_iter()
                .map(|(x, y, kind)| Block::new(kind, x, y))
                .collect();
            (
                Just(rows),
                Just(cols),
                Just(blocks.clone()),
                Just(blocks).prop_shuffle(),
            )
        })
    })
}

fn build(rows: usize, cols: usize, blocks: &[Block]) -> WorldState {
    let mut state = WorldState::empty(rows, cols);
    for block in blocks {
        state.add(block.clone());
    }
    state
}

fn hash_of(state: &WorldState) -> u64 {
    let mut hasher = DefaultHasher::new();
    state.hash(&mut hasher);
    hasher.finish()
}

proptest! {
    #[test]
    fn grid_text_round_trips(state in arb_world()) {
        let parsed = WorldState::from_grid_string(&state.to_grid_string())
            .expect("rendered grid parses");
        prop_assert_eq!(parsed.rows(), state.rows());
        prop_assert_eq!(parsed.cols(), state.cols());
        prop_assert_eq!(&parsed, &state);
        prop_assert_eq!(parsed.rules_text(), state.rules_text());
    }

    #[test]
    fn equality_ignores_outcome(state in arb_world()) {
        let mut won = state.clone();
        won.set_outcome(Outcome::Win);
        prop_assert_eq!(&won, &state);
        prop_assert_eq!(hash_of(&won), hash_of(&state));
    }

    #[test]
    fn insertion_order_does_not_matter(
        (rows, cols, blocks, shuffled) in arb_blocks_in_two_orders()
    ) {
        let first = build(rows, cols, &blocks);
        let second = build(rows, cols, &shuffled);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(hash_of(&first), hash_of(&second));
        prop_assert_eq!(first.to_grid_string(), second.to_grid_string());
        prop_assert_eq!(first.rules_text(), second.rules_text());
    }

    #[test]
    fn adding_a_block_breaks_equality(state in arb_world(), kind in proptest::sample::select(KINDS.to_vec())) {
        let mut changed = state.clone();
        changed.add(Block::new(kind, 0, 0));
        prop_assert_ne!(&changed, &state);
    }
}
