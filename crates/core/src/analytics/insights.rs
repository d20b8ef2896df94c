use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analytics::numeric::{decimal_to_f64, round_half_up};
use crate::analytics::patterns::{PatternStatistics, RecentClaim};
use crate::analytics::thresholds::{AnalyticsThresholds, RepeatWindow};
use crate::domain::claim::Claim;

/// A synthesized observation about a claim. Percentages are already rounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Insight {
    AboveCategoryAverage { category: String, percent: i64 },
    BelowCategoryAverage { category: String, percent: i64 },
    LowCategoryApproval { category: String, rate: i64 },
    ReliableSubmitter { rate: i64 },
    CautionSubmitter { rate: i64 },
    RepeatedCategory { category: String, matches: usize, window: usize },
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AboveCategoryAverage { category, percent } => {
                write!(f, "This claim is {percent}% higher than average for {category} claims")
            }
            Self::BelowCategoryAverage { category, percent } => {
                write!(f, "This claim is {percent}% lower than average for {category} claims")
            }
            Self::LowCategoryApproval { category, rate } => {
                write!(f, "{category} claims have a low approval rate of {rate}%")
            }
            Self::ReliableSubmitter { rate } => write!(
                f,
                "This employee has a strong approval history ({rate}% of recent claims approved)"
            ),
            Self::CautionSubmitter { rate } => write!(
                f,
                "Review carefully: only {rate}% of this employee's recent claims were approved"
            ),
            Self::RepeatedCategory { category, matches, window } => write!(
                f,
                "This employee has {matches} {category} claims among their last {window} claims"
            ),
        }
    }
}

/// Turns pattern statistics into insights. Rules are evaluated independently
/// and emitted in a fixed order: amount deviation, category approval,
/// submitter reliability, repeated category.
#[derive(Debug, Clone, Default)]
pub struct InsightSynthesizer {
    thresholds: AnalyticsThresholds,
}

impl InsightSynthesizer {
    pub fn new(thresholds: AnalyticsThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnalyticsThresholds {
        &self.thresholds
    }

    pub fn synthesize(&self, claim: &Claim, stats: &PatternStatistics) -> Vec<Insight> {
        let mut insights = Vec::new();

        if let Some(insight) = self.amount_deviation(claim, stats) {
            insights.push(insight);
        }
        if let Some(insight) = self.category_approval(claim, stats) {
            insights.push(insight);
        }
        if let Some(insight) = self.submitter_reliability(stats) {
            insights.push(insight);
        }
        if let Some(insight) = self.repeated_category(claim, stats) {
            insights.push(insight);
        }

        insights
    }

    /// Same as [`Self::synthesize`], rendered to display strings.
    pub fn synthesize_messages(&self, claim: &Claim, stats: &PatternStatistics) -> Vec<String> {
        self.synthesize(claim, stats).iter().map(ToString::to_string).collect()
    }

    fn amount_deviation(&self, claim: &Claim, stats: &PatternStatistics) -> Option<Insight> {
        let average = decimal_to_f64(stats.average_amount_for_category);
        if average <= 0.0 {
            return None;
        }

        let pct_diff = 100.0 * (decimal_to_f64(claim.amount_or_zero()) - average) / average;
        let percent = round_half_up(pct_diff).abs();
        let category = claim.category.clone();

        if pct_diff > self.thresholds.amount_deviation_pct {
            Some(Insight::AboveCategoryAverage { category, percent })
        } else if pct_diff < -self.thresholds.amount_deviation_pct {
            Some(Insight::BelowCategoryAverage { category, percent })
        } else {
            None
        }
    }

    // An empty sample has a rate of 0 and is reported like any other rate.
    fn category_approval(&self, claim: &Claim, stats: &PatternStatistics) -> Option<Insight> {
        (stats.category_approval_rate < self.thresholds.category_approval_floor_pct).then(|| {
            Insight::LowCategoryApproval {
                category: claim.category.clone(),
                rate: round_half_up(stats.category_approval_rate),
            }
        })
    }

    fn submitter_reliability(&self, stats: &PatternStatistics) -> Option<Insight> {
        let rate = stats.employee_approval_rate;
        if rate > self.thresholds.reliable_approval_pct {
            Some(Insight::ReliableSubmitter { rate: round_half_up(rate) })
        } else if rate < self.thresholds.caution_approval_pct {
            Some(Insight::CautionSubmitter { rate: round_half_up(rate) })
        } else {
            None
        }
    }

    fn repeated_category(&self, claim: &Claim, stats: &PatternStatistics) -> Option<Insight> {
        let window = self.thresholds.repeat_window_size;
        let matches = repeated_category_matches(
            claim,
            &stats.employee_recent_claims,
            self.thresholds.repeat_window,
            window,
        );

        (matches >= self.thresholds.repeat_min_matches).then(|| Insight::RepeatedCategory {
            category: claim.category.clone(),
            matches,
            window,
        })
    }
}

/// Counts claims in the recent-claims window whose category equals the
/// current claim's. `recent` lists the employee's other claims and must not
/// include the current claim.
///
/// `IncludingCurrent` ranks the current claim among the others by expense
/// date (ahead of others on the same date) and takes the newest
/// `window_size`. `BeforeCurrent` takes the newest `window_size` others.
pub fn repeated_category_matches(
    current: &Claim,
    recent: &[RecentClaim],
    window: RepeatWindow,
    window_size: usize,
) -> usize {
    let mut others: Vec<&RecentClaim> = recent.iter().collect();
    others.sort_by(|a, b| b.expense_date.cmp(&a.expense_date));

    match window {
        RepeatWindow::IncludingCurrent => {
            let newer = others
                .iter()
                .take_while(|other| other.expense_date > current.expense_date)
                .count();
            if newer >= window_size {
                return others
                    .iter()
                    .take(window_size)
                    .filter(|other| other.category == current.category)
                    .count();
            }
            1 + others
                .iter()
                .take(window_size - 1)
                .filter(|other| other.category == current.category)
                .count()
        }
        RepeatWindow::BeforeCurrent => others
            .iter()
            .take(window_size)
            .filter(|other| other.category == current.category)
            .count(),
    }
}
