//! A* over the 4-connected cell lattice.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet, VecDeque},
};

use warden_core::{CellCoord, FallbackReason, ObstacleGrid};

/// Result of a raw cell search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellSearch {
    /// Cells from start to goal inclusive, each step one edge long.
    Found {
        /// Visited cells in traversal order, starting with the start cell.
        cells: Vec<CellCoord>,
        /// Nodes expanded before the goal was popped.
        iterations: usize,
    },
    /// The goal could not be reached.
    Failed {
        /// Why the search gave up.
        reason: FallbackReason,
        /// Nodes expanded before giving up.
        iterations: usize,
    },
}

#[derive(Clone, Copy, Debug)]
struct SearchNode {
    cell: CellCoord,
    parent: Option<usize>,
    g_cost: u32,
    h_cost: u32,
    closed: bool,
}

impl SearchNode {
    fn f_cost(&self) -> u32 {
        self.g_cost + self.h_cost
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenEntry {
    f_cost: u32,
    h_cost: u32,
    g_cost: u32,
    node: usize,
}

impl Ord for OpenEntry {
    // BinaryHeap is a max-heap: lowest f wins, then lowest h, then the node
    // discovered first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.h_cost.cmp(&self.h_cost))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Runs A* from `start` to `goal`, expanding at most `max_iterations` nodes.
///
/// The start cell is expanded even when it is blocked; every other cell on
/// the result is free.
pub(crate) fn astar<G>(
    grid: &G,
    start: CellCoord,
    goal: CellCoord,
    max_iterations: usize,
) -> CellSearch
where
    G: ObstacleGrid + ?Sized,
{
    let mut nodes = vec![SearchNode {
        cell: start,
        parent: None,
        g_cost: 0,
        h_cost: start.manhattan_distance(goal),
        closed: false,
    }];
    let mut lookup: HashMap<CellCoord, usize> = HashMap::new();
    let _ = lookup.insert(start, 0);

    let mut open = BinaryHeap::new();
    open.push(entry_for(&nodes[0], 0));

    let mut iterations = 0;
    while let Some(entry) = open.pop() {
        let current = nodes[entry.node];
        if current.closed || entry.g_cost != current.g_cost {
            continue;
        }

        if iterations >= max_iterations {
            return CellSearch::Failed {
                reason: FallbackReason::IterationCap,
                iterations,
            };
        }
        iterations += 1;
        nodes[entry.node].closed = true;

        if current.cell == goal {
            return CellSearch::Found {
                cells: retrace(&nodes, entry.node),
                iterations,
            };
        }

        let next_cost = current.g_cost + 1;
        for neighbor in current.cell.cardinal_neighbors() {
            if grid.has_obstacle(neighbor) {
                continue;
            }

            match lookup.get(&neighbor).copied() {
                Some(index) => {
                    let known = &mut nodes[index];
                    if known.closed || next_cost >= known.g_cost {
                        continue;
                    }
                    known.g_cost = next_cost;
                    known.parent = Some(entry.node);
                    open.push(entry_for(known, index));
                }
                None => {
                    let index = nodes.len();
                    nodes.push(SearchNode {
                        cell: neighbor,
                        parent: Some(entry.node),
                        g_cost: next_cost,
                        h_cost: neighbor.manhattan_distance(goal),
                        closed: false,
                    });
                    let _ = lookup.insert(neighbor, index);
                    open.push(entry_for(&nodes[index], index));
                }
            }
        }
    }

    CellSearch::Failed {
        reason: FallbackReason::Unreachable,
        iterations,
    }
}

fn entry_for(node: &SearchNode, index: usize) -> OpenEntry {
    OpenEntry {
        f_cost: node.f_cost(),
        h_cost: node.h_cost,
        g_cost: node.g_cost,
        node: index,
    }
}

fn retrace(nodes: &[SearchNode], goal_index: usize) -> Vec<CellCoord> {
    let mut cells = Vec::new();
    let mut cursor = Some(goal_index);
    while let Some(index) = cursor {
        let node = &nodes[index];
        cells.push(node.cell);
        cursor = node.parent;
    }
    cells.reverse();
    cells
}

/// Breadth-first search for the closest free cell, at most `max_radius`
/// steps away. Blocked cells are walked through; only the answer must be free.
pub(crate) fn nearest_free_cell<G>(
    grid: &G,
    origin: CellCoord,
    max_radius: u32,
) -> Option<CellCoord>
where
    G: ObstacleGrid + ?Sized,
{
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back((origin, 0_u32));
    let _ = visited.insert(origin);

    while let Some((cell, depth)) = queue.pop_front() {
        if !grid.has_obstacle(cell) {
            return Some(cell);
        }

        if depth >= max_radius {
            continue;
        }

        for neighbor in cell.cardinal_neighbors() {
            if visited.insert(neighbor) {
                queue.push_back((neighbor, depth + 1));
            }
        }
    }

    None
}

/// Drops interior cells whose incoming and outgoing steps point the same way.
pub(crate) fn simplify(cells: &[CellCoord]) -> Vec<CellCoord> {
    if cells.len() <= 2 {
        return cells.to_vec();
    }

    let mut simplified = Vec::with_capacity(cells.len());
    simplified.push(cells[0]);
    for window in cells.windows(3) {
        if step(window[0], window[1]) != step(window[1], window[2]) {
            simplified.push(window[1]);
        }
    }
    simplified.push(cells[cells.len() - 1]);
    simplified
}

fn step(from: CellCoord, to: CellCoord) -> (i32, i32) {
    ((to.x() - from.x()).signum(), (to.y() - from.y()).signum())
}
