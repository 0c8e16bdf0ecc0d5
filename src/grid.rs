//! The toroidal grid: cells, directions, wrapping distances and apple placement.

use crate::constants::SNAKEPIT_APPLE_ATTEMPTS;
use fxhash::FxHashSet;
use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Movement directions in predictor output order. `Up` decreases `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::Up, Self::Right, Self::Down, Self::Left];

    /// Index of the predictor output for this direction
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Right => (1, 0),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    #[inline]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Right => Self::Left,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
}

impl Grid {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width.max(0) as usize * self.height.max(0) as usize
    }

    /// Bring any cell back onto the grid
    #[inline]
    pub fn wrap(&self, cell: Cell) -> Cell {
        Cell::new(cell.x.rem_euclid(self.width), cell.y.rem_euclid(self.height))
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        (0..self.width).contains(&cell.x) && (0..self.height).contains(&cell.y)
    }

    /// The cell `steps` moves from `cell` in `direction`
    #[inline]
    pub fn step(&self, cell: Cell, direction: Direction, steps: i32) -> Cell {
        let (dx, dy) = direction.delta();
        self.wrap(Cell::new(cell.x + dx * steps, cell.y + dy * steps))
    }

    /// Shortest signed offset from `from` to `to` along both axes, going around the edges
    /// when that's shorter
    pub fn offset(&self, from: Cell, to: Cell) -> (i32, i32) {
        let shortest = |d: i32, size: i32| {
            let d = d.rem_euclid(size);
            if d > size / 2 {
                d - size
            } else {
                d
            }
        };
        (
            shortest(to.x - from.x, self.width),
            shortest(to.y - from.y, self.height),
        )
    }

    /// Manhattan distance on the torus
    pub fn distance(&self, from: Cell, to: Cell) -> i32 {
        let (dx, dy) = self.offset(from, to);
        dx.abs() + dy.abs()
    }

    pub fn random_cell(&self, rng: &mut impl Rng) -> Cell {
        Cell::new(
            rng.random_range(0..self.width),
            rng.random_range(0..self.height),
        )
    }

    /// Every cell, row by row
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| Cell::new(x, y)))
    }

    /// A free cell for an apple: a bounded number of random picks, then the first free
    /// cell in row order. `None` when nothing is free.
    pub fn free_cell(&self, taken: impl Fn(&Cell) -> bool, rng: &mut impl Rng) -> Option<Cell> {
        for _ in 0..SNAKEPIT_APPLE_ATTEMPTS {
            let cell = self.random_cell(rng);
            if !taken(&cell) {
                return Some(cell);
            }
        }
        self.cells().find(|c| !taken(c))
    }
}

/// Top `apples` up to `minimum`, avoiding cells in `occupied`. Returns how many were added.
pub fn replenish_apples(
    grid: &Grid,
    apples: &mut FxHashSet<Cell>,
    occupied: &FxHashSet<Cell>,
    minimum: usize,
    rng: &mut impl Rng,
) -> usize {
    let mut added = 0;
    while apples.len() < minimum {
        match grid.free_cell(|c| apples.contains(c) || occupied.contains(c), rng) {
            Some(cell) => {
                apples.insert(cell);
                added += 1;
            }
            None => {
                warn!(
                    "no free cell for apples, holding {} of {minimum}",
                    apples.len()
                );
                break;
            }
        }
    }
    added
}
