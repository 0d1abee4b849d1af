//! Validator tip sizing for bundle submissions.
//!
//! Three strategies: a fixed floor, profit-proportional sizing clamped
//! between floor and cap, and competitive sizing off observed rival
//! tips. Successful tips feed a small rolling history whose scaled
//! average becomes the standing recommendation once enough samples
//! exist.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::constants::{TIP_HISTORY_CAP, TIP_HISTORY_MIN_SAMPLES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn multiplier(&self) -> f64 {
        match self {
            Urgency::Low => 1.1,
            Urgency::Medium => 1.25,
            Urgency::High => 1.5,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TipStrategy {
    Fixed,
    Dynamic { expected_profit_lamports: i64 },
    Competitive { competitor_tips: Vec<u64>, urgency: Urgency },
}

pub struct TipCalculator {
    tip_lamports: u64,
    tip_percent: f64,
    max_tip_lamports: u64,
    history: Mutex<VecDeque<u64>>,
}

impl TipCalculator {
    pub fn new(tip_lamports: u64, tip_percent: f64, max_tip_lamports: u64) -> Self {
        Self {
            tip_lamports,
            tip_percent,
            max_tip_lamports: max_tip_lamports.max(tip_lamports),
            history: Mutex::new(VecDeque::with_capacity(TIP_HISTORY_CAP)),
        }
    }

    pub fn compute(&self, strategy: &TipStrategy) -> u64 {
        match strategy {
            TipStrategy::Fixed => self.tip_lamports,
            TipStrategy::Dynamic {
                expected_profit_lamports,
            } => {
                if *expected_profit_lamports <= 0 {
                    return self.tip_lamports;
                }
                let proportional =
                    (self.tip_percent / 100.0 * *expected_profit_lamports as f64) as u64;
                proportional.clamp(self.tip_lamports, self.max_tip_lamports)
            }
            TipStrategy::Competitive {
                competitor_tips,
                urgency,
            } => match competitor_tips.iter().max() {
                None => self.tip_lamports,
                Some(&best) => {
                    let bid = (best as f64 * urgency.multiplier()) as u64;
                    bid.min(self.max_tip_lamports)
                }
            },
        }
    }

    /// Record a tip that landed; the history holds the last ten.
    pub fn record_success(&self, tip_lamports: u64) {
        let mut history = self.history.lock();
        history.push_back(tip_lamports);
        while history.len() > TIP_HISTORY_CAP {
            history.pop_front();
        }
    }

    /// `floor(avg * 1.1)` clamped by the cap, once five samples exist.
    pub fn recommended(&self) -> Option<u64> {
        let history = self.history.lock();
        if history.len() < TIP_HISTORY_MIN_SAMPLES {
            return None;
        }
        let avg = history.iter().sum::<u64>() as f64 / history.len() as f64;
        Some(((avg * 1.1).floor() as u64).min(self.max_tip_lamports))
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}
