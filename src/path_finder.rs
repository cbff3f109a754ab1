use std::collections::VecDeque;

use crate::board::Board;
use crate::constants::MAX_BENDS;
use crate::types::Cell;

/// Search order for seeding and turning: up, right, down, left.
const DIRS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
const ROOT: usize = usize::MAX;

/// Board surrounded by one ring of permanently empty cells, indexed in padded
/// coordinates (`board x + 1`, `board y + 1`).
struct PaddedGrid<'a> {
    board: &'a Board,
    width: usize,
    height: usize,
    start: usize,
    goal: usize,
}

impl<'a> PaddedGrid<'a> {
    fn new(board: &'a Board, from: Cell, to: Cell) -> Self {
        let width = board.cols() + 2;
        let height = board.rows() + 2;
        let pos = |cell: Cell| (cell.y as usize + 1) * width + cell.x as usize + 1;
        Self {
            board,
            width,
            height,
            start: pos(from),
            goal: pos(to),
        }
    }

    fn cell(&self, pos: usize) -> Cell {
        Cell::new(
            (pos % self.width) as i32 - 1,
            (pos / self.width) as i32 - 1,
        )
    }

    fn step(&self, pos: usize, dir: usize) -> Option<usize> {
        let (dx, dy) = DIRS[dir];
        let x = (pos % self.width) as i32 + dx;
        let y = (pos / self.width) as i32 + dy;
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    fn blocked(&self, pos: usize) -> bool {
        if pos == self.start || pos == self.goal {
            return false;
        }
        self.board.value_or_empty(self.cell(pos)) != 0
    }

    fn state(&self, pos: usize, dir: usize) -> usize {
        pos * 4 + dir
    }

    fn trace(&self, parent: &[usize], mut state: usize) -> Vec<Cell> {
        let mut points = Vec::new();
        loop {
            points.push(self.cell(state / 4));
            let previous = parent[state];
            if previous == ROOT {
                break;
            }
            state = previous;
        }
        points.push(self.cell(self.start));
        points.reverse();
        points
    }
}

/// Minimum-bend connection between two equal, occupied cells, compressed to
/// its endpoints and turning points. `None` when the cells differ, coincide,
/// are empty, or need more than two turns.
pub fn find_path(board: &Board, from: Cell, to: Cell) -> Option<Vec<Cell>> {
    if from == to {
        return None;
    }
    let value = board.get(from)?;
    if value == 0 || board.get(to)? != value {
        return None;
    }

    let grid = PaddedGrid::new(board, from, to);
    let state_count = grid.width * grid.height * 4;
    let mut best = vec![u8::MAX; state_count];
    let mut parent = vec![ROOT; state_count];
    // Zero-cost moves go to the front and turns to the back, so pops come
    // out in non-decreasing bend order.
    let mut queue: VecDeque<(usize, u8)> = VecDeque::new();

    for dir in 0..DIRS.len() {
        let Some(next) = grid.step(grid.start, dir) else {
            continue;
        };
        if grid.blocked(next) {
            continue;
        }
        let state = grid.state(next, dir);
        best[state] = 0;
        queue.push_back((state, 0));
    }

    while let Some((state, bends)) = queue.pop_front() {
        if bends > best[state] {
            continue;
        }
        let pos = state / 4;
        let dir = state % 4;
        if pos == grid.goal {
            return Some(compress(&grid.trace(&parent, state)));
        }

        let reverse = (dir + 2) % 4;
        let turns = (0..DIRS.len()).filter(|d| *d != dir && *d != reverse);
        let candidates = std::iter::once(dir).chain(turns);
        for next_dir in candidates {
            let turned = next_dir != dir;
            let next_bends = bends + u8::from(turned);
            if next_bends > MAX_BENDS {
                continue;
            }
            let Some(next) = grid.step(pos, next_dir) else {
                continue;
            };
            if grid.blocked(next) {
                continue;
            }
            let next_state = grid.state(next, next_dir);
            if best[next_state] <= next_bends {
                continue;
            }
            best[next_state] = next_bends;
            parent[next_state] = state;
            if turned {
                queue.push_back((next_state, next_bends));
            } else {
                queue.push_front((next_state, next_bends));
            }
        }
    }

    None
}

/// Keeps the endpoints and every vertex where the direction changes.
fn compress(points: &[Cell]) -> Vec<Cell> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut out = vec![points[0]];
    for window in points.windows(3) {
        let (a, b, c) = (window[0], window[1], window[2]);
        let cross = (a.x - b.x) * (b.y - c.y) - (a.y - b.y) * (b.x - c.x);
        if cross != 0 {
            out.push(b);
        }
    }
    out.push(points[points.len() - 1]);
    out
}

/// Every cell visited by a compressed path, in order.
pub fn expand_path(path: &[Cell]) -> Vec<Cell> {
    let Some(first) = path.first() else {
        return Vec::new();
    };
    let mut out = vec![*first];
    for pair in path.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let dx = (to.x - from.x).signum();
        let dy = (to.y - from.y).signum();
        let mut current = from;
        while current != to {
            current = Cell::new(current.x + dx, current.y + dy);
            out.push(current);
        }
    }
    out
}

/// Direction changes along a path (compressed or expanded).
pub fn count_bends(path: &[Cell]) -> usize {
    let expanded = expand_path(path);
    let directions: Vec<(i32, i32)> = expanded
        .windows(2)
        .map(|pair| (pair[1].x - pair[0].x, pair[1].y - pair[0].y))
        .collect();
    directions
        .windows(2)
        .filter(|pair| pair[0] != pair[1])
        .count()
}
