//! Skirmish: a small reference rule set.
//!
//! Each side fields one General and a row of Soldiers. Every piece steps one
//! square in any of the eight directions onto an empty or enemy square. A
//! move is unsafe when it leaves the mover's General next to an enemy piece.
//! Losing the General loses the game; no safe move while in check is mate,
//! no safe move otherwise is stalemate.

use super::RulesEngine;
use crate::types::{BoardSize, Position, SessionStatus, Side};
use tracing::{debug, instrument};

/// Kind of skirmish piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    /// Must be kept out of contact with enemy pieces.
    General,
    /// Expendable.
    Soldier,
}

/// A piece on the skirmish board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SkirmishPiece {
    /// Owner.
    pub side: Side,
    /// Kind.
    pub rank: Rank,
}

impl SkirmishPiece {
    /// Creates a General for `side`.
    pub fn general(side: Side) -> Self {
        Self {
            side,
            rank: Rank::General,
        }
    }

    /// Creates a Soldier for `side`.
    pub fn soldier(side: Side) -> Self {
        Self {
            side,
            rank: Rank::Soldier,
        }
    }

    fn symbol(self) -> char {
        let c = match self.rank {
            Rank::General => 'g',
            Rank::Soldier => 's',
        };
        match self.side {
            Side::First => c.to_ascii_uppercase(),
            Side::Second => c,
        }
    }
}

impl std::fmt::Display for SkirmishPiece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Row-major skirmish board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkirmishBoard {
    size: BoardSize,
    cells: Vec<Option<SkirmishPiece>>,
}

impl SkirmishBoard {
    /// Creates an empty board.
    pub fn empty(size: BoardSize) -> Self {
        Self {
            size,
            cells: vec![None; usize::from(size.rows) * usize::from(size.cols)],
        }
    }

    /// Creates the opening position: FIRST on rows 0-1, SECOND point-reflected
    /// on the far two rows.
    #[instrument]
    pub fn standard(size: BoardSize) -> Self {
        let mut board = Self::empty(size);
        let mut first = vec![(Position::new(0, size.cols / 2), Rank::General)];
        first.extend((0..size.cols).step_by(2).map(|col| (Position::new(1, col), Rank::Soldier)));
        for (pos, rank) in first {
            board.place(pos, SkirmishPiece { side: Side::First, rank });
            let mirrored = Position::new(size.max_row() - pos.row, size.max_col() - pos.col);
            board.place(mirrored, SkirmishPiece { side: Side::Second, rank });
        }
        board
    }

    /// Board dimensions.
    pub fn size(&self) -> BoardSize {
        self.size
    }

    fn index(&self, pos: Position) -> Option<usize> {
        self.size
            .contains(pos)
            .then(|| usize::from(pos.row) * usize::from(self.size.cols) + usize::from(pos.col))
    }

    /// Piece at `pos`, if any.
    pub fn get(&self, pos: Position) -> Option<SkirmishPiece> {
        self.index(pos).and_then(|i| self.cells[i])
    }

    /// Puts a piece on a square, replacing whatever was there. Off-board
    /// positions are ignored.
    pub fn place(&mut self, pos: Position, piece: SkirmishPiece) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = Some(piece);
        }
    }

    /// Empties a square, returning its previous occupant.
    pub fn take(&mut self, pos: Position) -> Option<SkirmishPiece> {
        self.index(pos).and_then(|i| self.cells[i].take())
    }

    /// Squares holding pieces of `side`.
    pub fn pieces_of(&self, side: Side) -> Vec<Position> {
        self.size
            .positions()
            .filter(|pos| self.get(*pos).is_some_and(|p| p.side == side))
            .collect()
    }

    fn general_of(&self, side: Side) -> Option<Position> {
        self.size
            .positions()
            .find(|pos| self.get(*pos) == Some(SkirmishPiece::general(side)))
    }

    fn neighbours(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        let (row, col) = (i16::from(pos.row), i16::from(pos.col));
        (-1i16..=1)
            .flat_map(move |dr| (-1i16..=1).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| dr != 0 || dc != 0)
            .filter_map(move |(dr, dc)| {
                let r = u8::try_from(row + dr).ok()?;
                let c = u8::try_from(col + dc).ok()?;
                let next = Position::new(r, c);
                self.size.contains(next).then_some(next)
            })
    }

    /// Renders the board with rows in the given order, one character per
    /// square (uppercase FIRST, lowercase SECOND, `.` empty).
    pub fn render_rows(&self, rows: impl Iterator<Item = u8>, reversed_cols: bool) -> String {
        let mut out = String::new();
        for row in rows {
            let mut cols: Vec<u8> = (0..self.size.cols).collect();
            if reversed_cols {
                cols.reverse();
            }
            for col in cols {
                out.push(
                    self.get(Position::new(row, col))
                        .map_or('.', SkirmishPiece::symbol),
                );
            }
            out.push('\n');
        }
        out
    }
}

impl std::fmt::Display for SkirmishBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render_rows(0..self.size.rows, false))
    }
}

/// The skirmish rules engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkirmishRules;

impl SkirmishRules {
    /// True if `side`'s General stands next to an enemy piece.
    pub fn in_check(&self, board: &SkirmishBoard, side: Side) -> bool {
        let Some(general) = board.general_of(side) else {
            return false;
        };
        board
            .neighbours(general)
            .any(|pos| board.get(pos).is_some_and(|p| p.side != side))
    }

    fn has_safe_move(&self, board: &SkirmishBoard, side: Side) -> bool {
        board.pieces_of(side).into_iter().any(|from| {
            board.neighbours(from).any(|to| {
                self.is_valid_move(board, from, to) && self.is_move_safe(board, from, to, side)
            })
        })
    }
}

impl RulesEngine for SkirmishRules {
    type Board = SkirmishBoard;
    type Piece = SkirmishPiece;

    fn board_size(&self, board: &SkirmishBoard) -> BoardSize {
        board.size
    }

    fn piece_side(&self, board: &SkirmishBoard, at: Position) -> Option<Side> {
        board.get(at).map(|p| p.side)
    }

    fn is_valid_move(&self, board: &SkirmishBoard, from: Position, to: Position) -> bool {
        let Some(piece) = board.get(from) else {
            return false;
        };
        if !board.size.contains(to) || from == to {
            return false;
        }
        if from.row.abs_diff(to.row) > 1 || from.col.abs_diff(to.col) > 1 {
            return false;
        }
        board.get(to).is_none_or(|target| target.side != piece.side)
    }

    fn is_move_safe(
        &self,
        board: &SkirmishBoard,
        from: Position,
        to: Position,
        side: Side,
    ) -> bool {
        let mut after = board.clone();
        self.apply_move(&mut after, from, to);
        !self.in_check(&after, side)
    }

    fn apply_move(
        &self,
        board: &mut SkirmishBoard,
        from: Position,
        to: Position,
    ) -> Option<SkirmishPiece> {
        let piece = board.take(from)?;
        let captured = board.take(to);
        board.place(to, piece);
        captured
    }

    #[instrument(skip(self, board))]
    fn check_game_state(&self, board: &SkirmishBoard, side: Side) -> SessionStatus {
        if board.general_of(side).is_none() {
            debug!("General captured");
            return SessionStatus::win_for(side.opponent());
        }
        if board.general_of(side.opponent()).is_none() {
            return SessionStatus::win_for(side);
        }
        match (self.in_check(board, side), self.has_safe_move(board, side)) {
            (true, false) => SessionStatus::win_for(side.opponent()),
            (false, false) => SessionStatus::Draw,
            (true, true) => SessionStatus::InCheck,
            (false, true) => SessionStatus::InProgress,
        }
    }
}
