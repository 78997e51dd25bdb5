// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Downlink option selection.

use crate::message::DownlinkOption;
use std::cmp::Reverse;

/// Pick the highest-scoring option.
///
/// The sort is stable, so among equal scores the option that arrived first
/// wins. Returns `None` for an empty slice.
pub fn select_best_downlink(options: &[DownlinkOption]) -> Option<&DownlinkOption> {
    let mut ranked: Vec<&DownlinkOption> = options.iter().collect();
    ranked.sort_by_key(|option| Reverse(option.score));
    ranked.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_score_wins() {
        let options = vec![
            DownlinkOption::new("r1:a", 10),
            DownlinkOption::new("r2:b", 30),
            DownlinkOption::new("r3:c", 20),
        ];
        assert_eq!(select_best_downlink(&options).unwrap().identifier, "r2:b");
    }

    #[test]
    fn test_ties_go_to_first_arrival() {
        let options = vec![
            DownlinkOption::new("r1:a", 5),
            DownlinkOption::new("r2:b", 9),
            DownlinkOption::new("r3:c", 9),
        ];
        for _ in 0..10 {
            assert_eq!(select_best_downlink(&options).unwrap().identifier, "r2:b");
        }
    }

    #[test]
    fn test_empty() {
        assert!(select_best_downlink(&[]).is_none());
    }
}
