//! Per-cell differences between a predicted and an observed state.

use crate::core::world::{Block, WorldState};

/// Render every cell where `simulated` and `real` disagree.
///
/// Each differing cell lists the kinds present before the action, after it in
/// the environment, and after it in the simulation. Returns an empty string
/// when the two states agree cell by cell.
pub fn format_tile_diffs(
    previous: &WorldState,
    simulated: &WorldState,
    real: &WorldState,
) -> String {
    let rows = previous.rows().max(simulated.rows()).max(real.rows());
    let cols = previous.cols().max(simulated.cols()).max(real.cols());
    let mut lines = Vec::new();
    for x in 0..rows {
        for y in 0..cols {
            let predicted = simulated.cell(x, y);
            let observed = real.cell(x, y);
            if predicted == observed {
                continue;
            }
            lines.push(format!("Differences at X={x},Y={y}:"));
            lines.push(format!(
                "  - pre-action              : {}",
                kind_list(previous.cell(x, y))
            ));
            lines.push(format!("  - post-action (real)      : {}", kind_list(observed)));
            lines.push(format!("  - post-action (simulated) : {}", kind_list(predicted)));
        }
    }
    lines.join("\n")
}

fn kind_list(cell: &[Block]) -> String {
    let kinds: Vec<&str> = cell.iter().map(|block| block.kind.as_str()).collect();
    format!("[{}]", kinds.join(", "))
}
