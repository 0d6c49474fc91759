//! Core domain types shared by every layer of the session controller.

use derive_more::Display;
use derive_new::new;
use serde::{Deserialize, Serialize};

/// One side of the board.
///
/// FIRST moves first (red in xiangqi, white in chess).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The side that opens the game.
    #[display("first")]
    First,
    /// The side that answers.
    #[display("second")]
    Second,
}

impl Side {
    /// Returns the opposing side.
    pub fn opponent(self) -> Self {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }
}

/// A square on the board, always expressed in the canonical frame unless a
/// variable name says otherwise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize, new,
)]
#[display("({}, {})", row, col)]
pub struct Position {
    /// Row index, 0-based.
    pub row: u8,
    /// Column index, 0-based.
    pub col: u8,
}

/// Board dimensions for a game variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize, new)]
#[display("{}x{}", rows, cols)]
pub struct BoardSize {
    /// Number of rows.
    pub rows: u8,
    /// Number of columns.
    pub cols: u8,
}

impl BoardSize {
    /// Xiangqi board: 10 rows by 9 files.
    pub const XIANGQI: BoardSize = BoardSize { rows: 10, cols: 9 };

    /// Chess board: 8 by 8.
    pub const CHESS: BoardSize = BoardSize { rows: 8, cols: 8 };

    /// Highest row index.
    pub fn max_row(self) -> u8 {
        self.rows.saturating_sub(1)
    }

    /// Highest column index.
    pub fn max_col(self) -> u8 {
        self.cols.saturating_sub(1)
    }

    /// Checks whether a position lies on the board.
    pub fn contains(self, pos: Position) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    /// Iterates every square in row-major order.
    pub fn positions(self) -> impl Iterator<Item = Position> {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| Position::new(row, col)))
    }
}

/// A move from one square to another.
///
/// `tag` carries an optional promotion or variant marker (for example `'q'`
/// for a queen promotion); the controller passes it through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Square the piece leaves.
    pub from: Position,
    /// Square the piece lands on.
    pub to: Position,
    /// Optional promotion/variant tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<char>,
}

impl Move {
    /// Creates a new untagged move.
    pub fn new(from: Position, to: Position) -> Self {
        Self {
            from,
            to,
            tag: None,
        }
    }

    /// Returns the same move carrying a promotion/variant tag.
    pub fn with_tag(self, tag: char) -> Self {
        Self {
            tag: Some(tag),
            ..self
        }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{} -> {} [{}]", self.from, self.to, tag),
            None => write!(f, "{} -> {}", self.from, self.to),
        }
    }
}

/// Status of the session.
///
/// `InProgress` and `InCheck` are live; the other three are terminal and
/// freeze the turn state machine until reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Game is ongoing.
    #[display("in progress")]
    InProgress,
    /// Side to move is in check, game continues.
    #[display("in check")]
    InCheck,
    /// FIRST has won.
    #[display("first wins")]
    FirstWins,
    /// SECOND has won.
    #[display("second wins")]
    SecondWins,
    /// Game drawn.
    #[display("draw")]
    Draw,
}

impl SessionStatus {
    /// Returns true for the three game-ending results.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::FirstWins | SessionStatus::SecondWins | SessionStatus::Draw
        )
    }

    /// Terminal status awarding the game to `side`.
    pub fn win_for(side: Side) -> Self {
        match side {
            Side::First => SessionStatus::FirstWins,
            Side::Second => SessionStatus::SecondWins,
        }
    }

    /// Winning side, if any.
    pub fn winner(self) -> Option<Side> {
        match self {
            SessionStatus::FirstWins => Some(Side::First),
            SessionStatus::SecondWins => Some(Side::Second),
            _ => None,
        }
    }
}

/// Who supplies moves for a side during one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    /// A person at this machine.
    #[default]
    #[display("local human")]
    LocalHuman,
    /// A move-search engine running on this machine.
    #[display("local engine")]
    LocalEngine,
    /// A person on the other end of the network link.
    #[display("remote human")]
    RemoteHuman,
}

impl PlayerRole {
    /// Returns true if the move for this role is produced on this machine.
    pub fn is_local(self) -> bool {
        !matches!(self, PlayerRole::RemoteHuman)
    }
}

/// Role assignment for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, new)]
pub struct Roles {
    /// Role playing FIRST.
    pub first: PlayerRole,
    /// Role playing SECOND.
    pub second: PlayerRole,
}

impl Roles {
    /// Role assigned to `side`.
    pub fn of(&self, side: Side) -> PlayerRole {
        match side {
            Side::First => self.first,
            Side::Second => self.second,
        }
    }

    /// Replaces the role of `side`.
    pub fn set(&mut self, side: Side, role: PlayerRole) {
        match side {
            Side::First => self.first = role,
            Side::Second => self.second = role,
        }
    }

    /// Returns the side played by the only local human, if exactly one side is.
    pub fn sole_local_human(&self) -> Option<Side> {
        match (self.first, self.second) {
            (PlayerRole::LocalHuman, PlayerRole::LocalHuman) => None,
            (PlayerRole::LocalHuman, _) => Some(Side::First),
            (_, PlayerRole::LocalHuman) => Some(Side::Second),
            _ => None,
        }
    }

    /// Returns true if either side is played over the network.
    pub fn is_networked(&self) -> bool {
        self.first == PlayerRole::RemoteHuman || self.second == PlayerRole::RemoteHuman
    }
}
