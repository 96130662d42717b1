// src/position.rs
//! Position collaborator: wraps the `chess` board with the bookkeeping the
//! search needs on top of it — Zobrist history for repetition detection, a
//! halfmove clock for the fifty-move rule, and the move-token history that
//! feeds the predictor.

use crate::uci::MoveCodec;
use chess::{Board, ChessMove, Color, MoveGen, Piece};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("invalid FEN: {0}")]
    InvalidFen(String),
    #[error("illegal move in position setup: {0}")]
    IllegalMove(String),
}

/// Terminal classification of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalClass {
    Ongoing,
    Checkmate,
    Stalemate,
    /// Fifty-move rule, threefold repetition or insufficient material.
    DrawByRule,
}

#[derive(Clone)]
pub struct Position {
    board: Board,
    /// Zobrist hash after every halfmove, including the current one.
    hash_history: Vec<u64>,
    /// Move tokens from the base position, fed to the predictor.
    token_history: Vec<u16>,
    halfmove_clock: u32,
    ply: u32,
}

impl Position {
    pub fn startpos() -> Self {
        let board = Board::default();
        Self {
            hash_history: vec![board.get_hash()],
            token_history: Vec::new(),
            board,
            halfmove_clock: 0,
            ply: 0,
        }
    }

    /// Parse a full FEN, including the halfmove clock and fullmove number
    /// the board type itself ignores.
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let board =
            Board::from_str(fen).map_err(|_| PositionError::InvalidFen(fen.to_string()))?;
        let fields: Vec<&str> = fen.split_whitespace().collect();
        let halfmove_clock = fields
            .get(4)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        let fullmove = fields
            .get(5)
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1)
            .max(1);
        let ply = (fullmove - 1) * 2 + u32::from(board.side_to_move() == Color::Black);
        Ok(Self {
            hash_history: vec![board.get_hash()],
            token_history: Vec::new(),
            board,
            halfmove_clock,
            ply,
        })
    }

    #[inline]
    pub fn board(&self) -> &Board {
        &self.board
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    /// Halfmoves from the start of the game.
    #[inline]
    pub fn ply(&self) -> u32 {
        self.ply
    }

    #[inline]
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    /// 64-bit fingerprint for prediction-cache keying.
    #[inline]
    pub fn fingerprint(&self) -> u64 {
        self.board.get_hash()
    }

    #[inline]
    pub fn token_history(&self) -> &[u16] {
        &self.token_history
    }

    /// Legal moves in the generator's stable order.
    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    pub fn apply_move(&mut self, mv: ChessMove) {
        let is_pawn = self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);
        let is_capture = self.board.piece_on(mv.get_dest()).is_some()
            || (is_pawn && mv.get_source().get_file() != mv.get_dest().get_file());
        self.board = self.board.make_move_new(mv);
        self.halfmove_clock = if is_pawn || is_capture {
            0
        } else {
            self.halfmove_clock + 1
        };
        self.ply += 1;
        self.hash_history.push(self.board.get_hash());
        self.token_history.push(MoveCodec::move_to_token(&mv));
    }

    pub fn apply_uci_move(&mut self, text: &str) -> Result<ChessMove, PositionError> {
        let mv = ChessMove::from_str(text)
            .map_err(|_| PositionError::IllegalMove(text.to_string()))?;
        if !self.board.legal(mv) {
            return Err(PositionError::IllegalMove(text.to_string()));
        }
        self.apply_move(mv);
        Ok(mv)
    }

    /// Occurrences of the current position over the whole known history.
    pub fn repetition_count(&self) -> usize {
        let current = self.board.get_hash();
        self.hash_history.iter().filter(|&&h| h == current).count()
    }

    /// Whether the current position already occurred at or after the given
    /// search-root ply. Inside a search a single repetition is scored as a
    /// draw without waiting for the formal threefold.
    pub fn is_draw_by_twofold(&self, search_root_ply: u32) -> bool {
        let current = self.board.get_hash();
        let base_ply = self.ply + 1 - self.hash_history.len() as u32;
        self.hash_history
            .iter()
            .enumerate()
            .take(self.hash_history.len() - 1)
            .any(|(i, &h)| base_ply + i as u32 >= search_root_ply && h == current)
    }

    pub fn terminal(&self) -> TerminalClass {
        if MoveGen::new_legal(&self.board).next().is_none() {
            return if self.board.checkers().popcnt() > 0 {
                TerminalClass::Checkmate
            } else {
                TerminalClass::Stalemate
            };
        }
        if self.halfmove_clock >= 100
            || self.repetition_count() >= 3
            || self.has_insufficient_material()
        {
            return TerminalClass::DrawByRule;
        }
        TerminalClass::Ongoing
    }

    fn has_insufficient_material(&self) -> bool {
        match self.board.combined().popcnt() {
            2 => true,
            3 => {
                self.board.pieces(Piece::Knight).popcnt()
                    + self.board.pieces(Piece::Bishop).popcnt()
                    > 0
            }
            _ => false,
        }
    }

    pub fn piece_count(&self) -> u32 {
        self.board.combined().popcnt()
    }

    pub fn fen(&self) -> String {
        format!("{}", self.board)
    }
}
