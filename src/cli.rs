//! Command-line interface for duel_session.

use clap::{Parser, Subcommand, ValueEnum};
use duel_session::PlayerRole;

/// Duel Session - two-player board game sessions with engine and network play
#[derive(Parser, Debug)]
#[command(name = "duel_session")]
#[command(about = "Turn-based board game session controller", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML session config
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Board variant
    #[arg(long, global = true, value_enum, default_value = "xiangqi")]
    pub board: BoardKind,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Board dimensions to play on.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    /// 10 rows by 9 columns
    Xiangqi,
    /// 8 by 8
    Chess,
}

/// Who plays a side in local games.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    /// Moves typed at this terminal
    Human,
    /// The built-in engine
    Engine,
}

impl From<Seat> for PlayerRole {
    fn from(seat: Seat) -> Self {
        match seat {
            Seat::Human => PlayerRole::LocalHuman,
            Seat::Engine => PlayerRole::LocalEngine,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play on this machine
    Local {
        /// Who plays FIRST
        #[arg(long, value_enum, default_value = "human")]
        first: Seat,

        /// Who plays SECOND
        #[arg(long, value_enum, default_value = "engine")]
        second: Seat,

        /// Engine thinking delay in milliseconds
        #[arg(long, default_value = "300")]
        think_ms: u64,
    },

    /// Run the room relay server
    Host {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: String,
    },

    /// Join a room as a player
    Join {
        /// Room server address
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: String,

        /// Player identifier
        #[arg(long)]
        player: String,

        /// Room identifier
        #[arg(long, default_value = "main")]
        room: String,

        /// Let the built-in engine play the local side
        #[arg(long)]
        engine: bool,
    },
}
