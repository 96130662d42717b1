// src/syzygy.rs
//! Syzygy endgame tablebase probing.
//!
//! Uses shakmaty-syzygy to probe WDL tables when few enough pieces remain.
//! Conversion: chess::Board → FEN string → shakmaty::Chess (only at low
//! piece counts, so the string round-trip is off the hot path).

use crate::search::node::Bound;
use chess::Board;
use shakmaty::fen::Fen;
use shakmaty::CastlingMode;
use shakmaty_syzygy::{Tablebase, Wdl};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TablebaseError {
    #[error("failed to load tablebase directory: {0}")]
    Load(String),
}

/// Result of a WDL probe, from the side to move's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TbWdl {
    Win,
    CursedWin,
    Draw,
    BlessedLoss,
    Loss,
}

impl TbWdl {
    /// Rank for comparison: higher is better for the side to move.
    #[inline]
    pub fn rank(self) -> i32 {
        match self {
            TbWdl::Win => 4,
            TbWdl::CursedWin => 3,
            TbWdl::Draw => 2,
            TbWdl::BlessedLoss => 1,
            TbWdl::Loss => 0,
        }
    }

    /// Swap perspective: Win↔Loss, CursedWin↔BlessedLoss.
    #[inline]
    pub fn negate(self) -> TbWdl {
        match self {
            TbWdl::Win => TbWdl::Loss,
            TbWdl::CursedWin => TbWdl::BlessedLoss,
            TbWdl::Draw => TbWdl::Draw,
            TbWdl::BlessedLoss => TbWdl::CursedWin,
            TbWdl::Loss => TbWdl::Win,
        }
    }

    /// Map to a value bound for the search. Cursed wins and blessed losses
    /// are exact draws under the fifty-move rule.
    #[inline]
    pub fn value_bound(self) -> (f32, Bound) {
        match self {
            TbWdl::Win => (1.0, Bound::Lower),
            TbWdl::Loss => (0.0, Bound::Upper),
            TbWdl::CursedWin | TbWdl::Draw | TbWdl::BlessedLoss => (0.5, Bound::Exact),
        }
    }
}

/// Wrapper around the shakmaty-syzygy tablebase with conversion from the
/// chess crate's board type.
pub struct SyzygyTablebase {
    tb: Tablebase<shakmaty::Chess>,
    max_pieces: usize,
}

impl SyzygyTablebase {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, TablebaseError> {
        let mut tb = Tablebase::new();
        let count = tb
            .add_directory(path.as_ref())
            .map_err(|e| TablebaseError::Load(e.to_string()))?;
        let max_pieces = tb.max_pieces();
        tracing::info!(tables = count, max_pieces, "syzygy tablebases loaded");
        Ok(Self { tb, max_pieces })
    }

    #[inline]
    pub fn max_pieces(&self) -> usize {
        self.max_pieces
    }

    #[inline]
    pub fn can_probe(&self, board: &Board) -> bool {
        (board.combined().popcnt() as usize) <= self.max_pieces
    }

    fn to_shakmaty(board: &Board) -> Option<shakmaty::Chess> {
        let fen: Fen = format!("{}", board).parse().ok()?;
        fen.into_position(CastlingMode::Standard).ok()
    }

    /// Probe WDL for the side to move; `None` on any failure, which the
    /// search treats as "no tablebase information".
    pub fn probe_wdl(&self, board: &Board) -> Option<TbWdl> {
        if !self.can_probe(board) {
            return None;
        }
        let pos = Self::to_shakmaty(board)?;
        match self.tb.probe_wdl_after_zeroing(&pos) {
            Ok(wdl) => Some(match wdl {
                Wdl::Win => TbWdl::Win,
                Wdl::CursedWin => TbWdl::CursedWin,
                Wdl::Draw => TbWdl::Draw,
                Wdl::BlessedLoss => TbWdl::BlessedLoss,
                Wdl::Loss => TbWdl::Loss,
            }),
            Err(_) => None,
        }
    }
}
