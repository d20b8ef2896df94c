use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest rollup or trend window, in calendar months, any caller may ask for.
pub const MAX_TREND_MONTHS: u32 = 120;

/// Which claims make up the "recent claims" window of the repeated-category
/// insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatWindow {
    /// The claim under review plus the employee's most recent other claims.
    #[default]
    IncludingCurrent,
    /// Only the employee's most recent other claims.
    BeforeCurrent,
}

impl std::str::FromStr for RepeatWindow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "including_current" => Ok(Self::IncludingCurrent),
            "before_current" => Ok(Self::BeforeCurrent),
            other => Err(format!(
                "unsupported repeat window `{other}` (expected including_current|before_current)"
            )),
        }
    }
}

/// Business thresholds used across the analytics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsThresholds {
    /// Half-width of the amount similarity band as a ratio (default: 0.20)
    pub amount_band_ratio: Decimal,
    /// Cap for the amount and category candidate lists (default: 10)
    pub similar_claims_limit: usize,
    /// Cap for the employee history candidate list (default: 5)
    pub employee_history_limit: usize,
    /// Deviation from the category average, in percent, that triggers an
    /// amount insight (default: 50.0)
    pub amount_deviation_pct: f64,
    /// Category approval rate below which a warning is emitted (default: 70.0)
    pub category_approval_floor_pct: f64,
    /// Employee approval rate above which the submitter is reliable (default: 90.0)
    pub reliable_approval_pct: f64,
    /// Employee approval rate below which the reviewer is cautioned (default: 60.0)
    pub caution_approval_pct: f64,
    pub repeat_window: RepeatWindow,
    /// Number of claims in the repeated-category window (default: 3)
    pub repeat_window_size: usize,
    /// Same-category claims inside the window needed to fire (default: 2)
    pub repeat_min_matches: usize,
    /// Categories kept in a department ranking (default: 5)
    pub top_categories_limit: usize,
    /// Activity entries kept in a department rollup (default: 10)
    pub recent_activity_limit: usize,
    /// Multiplier applied to actual spend when no budget is configured (default: 1.2)
    pub estimated_budget_multiplier: Decimal,
    /// Months covered by rollups when the caller does not say (default: 6)
    pub trend_months: u32,
}

impl Default for AnalyticsThresholds {
    fn default() -> Self {
        Self {
            amount_band_ratio: Decimal::new(20, 2),
            similar_claims_limit: 10,
            employee_history_limit: 5,
            amount_deviation_pct: 50.0,
            category_approval_floor_pct: 70.0,
            reliable_approval_pct: 90.0,
            caution_approval_pct: 60.0,
            repeat_window: RepeatWindow::IncludingCurrent,
            repeat_window_size: 3,
            repeat_min_matches: 2,
            top_categories_limit: 5,
            recent_activity_limit: 10,
            estimated_budget_multiplier: Decimal::new(12, 1),
            trend_months: 6,
        }
    }
}

impl AnalyticsThresholds {
    /// Checks the thresholds for internal consistency. Returns a message that
    /// names the offending `analytics.*` key.
    pub fn check(&self) -> Result<(), String> {
        if self.amount_band_ratio < Decimal::ZERO || self.amount_band_ratio > Decimal::ONE {
            return Err("analytics.amount_band_ratio must be in range 0..=1".to_string());
        }
        if self.similar_claims_limit == 0 || self.employee_history_limit == 0 {
            return Err(
                "analytics.similar_claims_limit and analytics.employee_history_limit must be greater than zero"
                    .to_string(),
            );
        }
        if self.caution_approval_pct > self.reliable_approval_pct {
            return Err(
                "analytics.caution_approval_pct must not exceed analytics.reliable_approval_pct"
                    .to_string(),
            );
        }
        if self.repeat_window_size == 0 || self.repeat_min_matches == 0 {
            return Err(
                "analytics.repeat_window_size and analytics.repeat_min_matches must be greater than zero"
                    .to_string(),
            );
        }
        if self.repeat_window_size > self.employee_history_limit + 1 {
            return Err(
                "analytics.repeat_window_size cannot exceed analytics.employee_history_limit + 1"
                    .to_string(),
            );
        }
        if self.estimated_budget_multiplier <= Decimal::ZERO {
            return Err("analytics.estimated_budget_multiplier must be positive".to_string());
        }
        if self.trend_months == 0 || self.trend_months > MAX_TREND_MONTHS {
            return Err(format!("analytics.trend_months must be in range 1..={MAX_TREND_MONTHS}"));
        }
        Ok(())
    }
}
