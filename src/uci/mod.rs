// src/uci/mod.rs
//! UCI surface: the command loop and the move-token codec shared between
//! the tree, the predictor and the wire.

use crate::config::EngineConfig;
use crate::predictor::Predictor;
use crate::search::driver::WorkerGroup;
use crate::search::time::TimeControl;
use chess::{Board, ChessMove, Color, MoveGen, Piece, Square};
use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;

pub struct MoveCodec;

impl MoveCodec {
    /// Encode a move as a policy-vector token: from·64+to for normal
    /// moves, a promotion block above 4096 keyed by piece and target
    /// square.
    pub fn move_to_token(mv: &ChessMove) -> u16 {
        let from = mv.get_source().to_int() as u16;
        let to = mv.get_dest().to_int() as u16;
        if let Some(promo) = mv.get_promotion() {
            let piece_idx = match promo {
                Piece::Knight => 0,
                Piece::Bishop => 1,
                Piece::Rook => 2,
                Piece::Queen => 3,
                _ => 0,
            };
            4096 + piece_idx * 64 + to
        } else {
            from * 64 + to
        }
    }

    /// Decode a token back into a legal move on `board`, or `None` when
    /// the token does not correspond to one.
    pub fn token_to_move(token: u16, board: &Board) -> Option<ChessMove> {
        if token < 4096 {
            let from = unsafe {
                // SAFETY: token / 64 is always 0-63
                Square::new((token / 64) as u8)
            };
            let to = unsafe {
                // SAFETY: token % 64 is always 0-63
                Square::new((token % 64) as u8)
            };
            let mv = ChessMove::new(from, to, None);
            if board.legal(mv) {
                return Some(mv);
            }
            let mv_q = ChessMove::new(from, to, Some(Piece::Queen));
            if board.legal(mv_q) {
                return Some(mv_q);
            }
        } else if token < 4608 {
            let promo_part = token - 4096;
            let to = unsafe {
                // SAFETY: promo_part % 64 is always 0-63
                Square::new((promo_part % 64) as u8)
            };
            let piece = match promo_part / 64 {
                0 => Piece::Knight,
                1 => Piece::Bishop,
                2 => Piece::Rook,
                _ => Piece::Queen,
            };
            for mv in MoveGen::new_legal(board) {
                if mv.get_dest() == to && mv.get_promotion() == Some(piece) {
                    return Some(mv);
                }
            }
        }
        None
    }
}

pub struct UciHandler {
    config: EngineConfig,
    predictor: Arc<dyn Predictor>,
    group: Option<WorkerGroup>,
}

impl UciHandler {
    pub fn new(config: EngineConfig, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            config,
            predictor,
            group: None,
        }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(command) = line else { break };
            let command = command.trim();
            if command.is_empty() {
                continue;
            }
            if !self.handle_command(command) {
                break;
            }
        }
    }

    /// Dispatch one command; returns false on `quit`.
    pub fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.split_whitespace().collect();
        match parts.first().copied() {
            Some("uci") => {
                println!("id name Lodestar {}", env!("CARGO_PKG_VERSION"));
                println!("id author Lodestar contributors");
                println!("option name Threads type spin default 4 min 1 max 256");
                println!("option name Parallelism type spin default 8 min 1 max 256");
                println!("option name UseSblePuct type check default false");
                println!("option name SyzygyPath type string default <empty>");
                println!("uciok");
            }
            Some("isready") => {
                self.ensure_group();
                println!("readyok");
            }
            Some("ucinewgame") => {
                if let Some(group) = &self.group {
                    group.new_game();
                }
            }
            Some("debug") => {
                if let Some(group) = &self.group {
                    group.set_debug(parts.get(1) == Some(&"on"));
                }
            }
            Some("position") => self.handle_position(&parts[1..]),
            Some("go") => self.handle_go(&parts[1..]),
            Some("stop") => {
                if let Some(group) = &self.group {
                    group.stop();
                    group.wait();
                }
            }
            Some("setoption") => self.handle_setoption(&parts[1..]),
            Some("quit") => return false,
            _ => {}
        }
        true
    }

    fn ensure_group(&mut self) -> &WorkerGroup {
        if self.group.is_none() {
            self.group = Some(WorkerGroup::new(
                self.config.clone(),
                Arc::clone(&self.predictor),
            ));
        }
        self.group.as_ref().unwrap()
    }

    fn handle_setoption(&mut self, parts: &[&str]) {
        let Some(value_at) = parts.iter().position(|&p| p == "value") else {
            return;
        };
        if parts.first() != Some(&"name") || value_at < 2 || value_at + 1 >= parts.len() {
            return;
        }
        let name = parts[1..value_at].join(" ").to_lowercase();
        let value = parts[value_at + 1..].join(" ");

        if self.group.is_some() {
            tracing::warn!(option = %name, "setoption after startup takes effect on restart");
        }
        if name == "syzygypath" {
            self.config.syzygy_path = (value != "<empty>").then(|| value.clone());
            return;
        }
        if let Ok(parsed) = value.parse::<f64>() {
            if self.config.set_numeric_option(&name, parsed) {
                return;
            }
        }
        if let Ok(parsed) = value.parse::<bool>() {
            let name = if name == "usesblepuct" {
                "use_sble_puct"
            } else {
                name.as_str()
            };
            self.config.set_bool_option(name, parsed);
        }
    }

    fn handle_position(&mut self, parts: &[&str]) {
        let mut fen: Option<String> = None;
        let mut index = 0;
        match parts.first().copied() {
            Some("startpos") => index = 1,
            Some("fen") => {
                let mut fields = Vec::new();
                index = 1;
                while index < parts.len() && parts[index] != "moves" {
                    fields.push(parts[index]);
                    index += 1;
                }
                fen = Some(fields.join(" "));
            }
            _ => return,
        }
        let moves: Vec<&str> = if parts.get(index) == Some(&"moves") {
            parts[index + 1..].to_vec()
        } else {
            Vec::new()
        };
        self.ensure_group();
        let group = self.group.as_ref().unwrap();
        if let Err(e) = group.set_position(fen.as_deref(), &moves) {
            tracing::error!(error = %e, "failed to apply position");
        }
    }

    fn handle_go(&mut self, parts: &[&str]) {
        let mut tc = TimeControl::default();
        let mut search_moves: Vec<&str> = Vec::new();
        let mut index = 0;
        while index < parts.len() {
            let take_number = |i: usize| -> i64 {
                parts.get(i + 1).and_then(|s| s.parse().ok()).unwrap_or(0)
            };
            match parts[index] {
                "infinite" => tc.infinite = true,
                "nodes" => {
                    tc.nodes = take_number(index);
                    index += 1;
                }
                "mate" => {
                    tc.mate = take_number(index) as i32;
                    index += 1;
                }
                "movetime" => {
                    tc.move_time_ms = take_number(index);
                    index += 1;
                }
                "wtime" => {
                    tc.time_remaining_ms[Color::White as usize] = take_number(index);
                    index += 1;
                }
                "btime" => {
                    tc.time_remaining_ms[Color::Black as usize] = take_number(index);
                    index += 1;
                }
                "winc" => {
                    tc.increment_ms[Color::White as usize] = take_number(index);
                    index += 1;
                }
                "binc" => {
                    tc.increment_ms[Color::Black as usize] = take_number(index);
                    index += 1;
                }
                "movestogo" => {
                    tc.moves_to_go = take_number(index) as i32;
                    index += 1;
                }
                "searchmoves" => {
                    while index + 1 < parts.len()
                        && ChessMove::from_str(parts[index + 1]).is_ok()
                    {
                        search_moves.push(parts[index + 1]);
                        index += 1;
                    }
                }
                _ => {}
            }
            index += 1;
        }
        self.ensure_group();
        let group = self.group.as_ref().unwrap();
        if let Err(e) = group.go(tc, &search_moves) {
            tracing::error!(error = %e, "failed to start search");
            println!("bestmove (none)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_over_all_legal_moves() {
        let board = Board::default();
        for mv in MoveGen::new_legal(&board) {
            let token = MoveCodec::move_to_token(&mv);
            assert!(usize::from(token) < crate::predictor::POLICY_SIZE);
            assert_eq!(MoveCodec::token_to_move(token, &board), Some(mv));
        }
    }

    #[test]
    fn promotion_tokens_live_above_the_plain_block() {
        let board =
            Board::from_str("6k1/4P3/8/8/8/8/8/6K1 w - - 0 1").expect("valid position");
        for mv in MoveGen::new_legal(&board) {
            if mv.get_promotion().is_some() {
                let token = MoveCodec::move_to_token(&mv);
                assert!(token >= 4096);
                assert_eq!(MoveCodec::token_to_move(token, &board), Some(mv));
            }
        }
    }

    #[test]
    fn garbage_tokens_decode_to_none() {
        let board = Board::default();
        assert_eq!(MoveCodec::token_to_move(4607, &board), None);
        // a1a1 is never legal
        assert_eq!(MoveCodec::token_to_move(0, &board), None);
    }
}
