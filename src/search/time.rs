// src/search/time.rs
//! Time-control inputs and the per-move budget.

use chess::Color;

/// Everything a `go` command can constrain the search by. Zeroed fields
/// mean "not given".
#[derive(Debug, Clone, Copy)]
pub struct TimeControl {
    pub infinite: bool,
    /// Node (simulation) budget.
    pub nodes: i64,
    /// Stop as soon as a mate in at most this many moves is proven at the
    /// root.
    pub mate: i32,
    pub move_time_ms: i64,
    /// Indexed by [`Color::White`] / [`Color::Black`].
    pub time_remaining_ms: [i64; 2],
    pub increment_ms: [i64; 2],
    pub moves_to_go: i32,
    /// Early-stop: fraction of the root visit count treated as the budget
    /// still reachable by trailing root children.
    pub elimination_fraction: f32,
    /// Root visits required before elimination kicks in.
    pub elimination_root_visit_count: i32,
}

impl Default for TimeControl {
    fn default() -> Self {
        Self {
            infinite: false,
            nodes: 0,
            mate: 0,
            move_time_ms: 0,
            time_remaining_ms: [0; 2],
            increment_ms: [0; 2],
            moves_to_go: 0,
            elimination_fraction: 0.0,
            elimination_root_visit_count: 0,
        }
    }
}

impl TimeControl {
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Self::default()
        }
    }

    pub fn nodes(nodes: i64) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    /// Effective wall-clock budget for this move, or `None` when the
    /// search is not time-constrained. Explicit move time wins; otherwise
    /// a fraction of the remaining clock plus the increment, minus the
    /// safety buffer, floored at zero.
    pub fn budget_ms(
        &self,
        side: Color,
        fraction_of_remaining: i64,
        safety_buffer_ms: i64,
    ) -> Option<i64> {
        if self.infinite {
            return None;
        }
        if self.move_time_ms > 0 {
            return Some(self.move_time_ms.max(0));
        }
        let us = side as usize;
        let remaining = self.time_remaining_ms[us];
        if remaining <= 0 {
            return None;
        }
        let mut divisor = fraction_of_remaining.max(1);
        if self.moves_to_go > 0 {
            divisor = divisor.min(self.moves_to_go as i64);
        }
        Some((remaining / divisor + self.increment_ms[us] - safety_buffer_ms).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_move_time_wins() {
        let tc = TimeControl {
            move_time_ms: 1500,
            time_remaining_ms: [60000, 60000],
            ..TimeControl::default()
        };
        assert_eq!(tc.budget_ms(Color::White, 28, 100), Some(1500));
    }

    #[test]
    fn fraction_of_remaining_with_increment() {
        let tc = TimeControl {
            time_remaining_ms: [28000, 56000],
            increment_ms: [200, 200],
            ..TimeControl::default()
        };
        assert_eq!(tc.budget_ms(Color::White, 28, 100), Some(1100));
        assert_eq!(tc.budget_ms(Color::Black, 28, 100), Some(2100));
    }

    #[test]
    fn budget_never_goes_negative() {
        let tc = TimeControl {
            time_remaining_ms: [50, 50],
            ..TimeControl::default()
        };
        assert_eq!(tc.budget_ms(Color::White, 28, 500), Some(0));
    }

    #[test]
    fn moves_to_go_caps_the_divisor() {
        let tc = TimeControl {
            time_remaining_ms: [10000, 10000],
            moves_to_go: 2,
            ..TimeControl::default()
        };
        assert_eq!(tc.budget_ms(Color::White, 28, 0), Some(5000));
    }

    #[test]
    fn infinite_has_no_budget() {
        assert_eq!(TimeControl::infinite().budget_ms(Color::White, 28, 100), None);
    }
}
