//! Discount Budget
//!
//! Tracks AI-issued discount cost per budget period. Period boundaries follow a
//! fixed schedule (UTC weeks starting Monday, or calendar months); rolling
//! forward always advances from the scheduled boundary, never from "now".

use std::str::FromStr;

use jiff::{Timestamp, ToSpan, Zoned, civil::Date, tz::TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::variants::UnknownValue;

/// Budget period length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    /// Monday 00:00 UTC to the next Monday.
    Week,

    /// First of the month 00:00 UTC to the first of the next month.
    #[default]
    Month,
}

impl BudgetPeriod {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Start of the scheduled period containing `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary falls outside the supported calendar range.
    pub fn start_containing(self, at: Timestamp) -> Result<Timestamp, jiff::Error> {
        let date = at.to_zoned(TimeZone::UTC).date();

        let start = match self {
            Self::Week => {
                let offset = i64::from(date.weekday().to_monday_zero_offset());

                date.checked_sub(offset.days())?
            }
            Self::Month => date.first_of_month(),
        };

        Ok(midnight_utc(start)?.timestamp())
    }

    /// The scheduled boundary one period after `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the boundary falls outside the supported calendar range.
    pub fn advance(self, start: Timestamp) -> Result<Timestamp, jiff::Error> {
        let zoned = start.to_zoned(TimeZone::UTC);

        let next = match self {
            Self::Week => zoned.checked_add(7.days())?,
            Self::Month => zoned.checked_add(1.month())?,
        };

        Ok(next.timestamp())
    }
}

fn midnight_utc(date: Date) -> Result<Zoned, jiff::Error> {
    date.to_zoned(TimeZone::UTC)
}

impl FromStr for BudgetPeriod {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(UnknownValue::new("budget period", s)),
        }
    }
}

/// Merchant budget settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Whether the cap is enforced.
    pub enabled: bool,

    /// Cap per period, in minor units.
    pub amount: u64,

    /// Period length.
    pub period: BudgetPeriod,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            amount: 50_000,
            period: BudgetPeriod::Month,
        }
    }
}

/// Budget errors.
#[derive(Debug, Error)]
pub enum BudgetError {
    /// Reserving the cost would exceed the cap.
    #[error("budget exhausted: {spent} spent of {cap}, {requested} requested")]
    Exceeded {
        /// Already spent this period.
        spent: u64,

        /// Requested cost.
        requested: u64,

        /// Period cap.
        cap: u64,
    },

    /// Period boundary could not be computed.
    #[error("could not compute budget period boundary")]
    Calendar(#[from] jiff::Error),
}

/// Running spend for the current budget period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    /// Period length the window was opened with.
    pub period: BudgetPeriod,

    /// Scheduled start of the current window.
    pub period_start: Timestamp,

    /// Scheduled end of the current window (exclusive).
    pub period_end: Timestamp,

    /// Cost issued within the window, in minor units.
    pub spent: u64,
}

impl BudgetLedger {
    /// Open an empty ledger for the period containing `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the period boundaries cannot be computed.
    pub fn open(period: BudgetPeriod, now: Timestamp) -> Result<Self, jiff::Error> {
        let period_start = period.start_containing(now)?;

        Ok(Self {
            period,
            period_start,
            period_end: period.advance(period_start)?,
            spent: 0,
        })
    }

    /// Advance past every boundary at or before `now`, returning how many periods elapsed.
    ///
    /// Each step moves the window by exactly one period from its scheduled end, so a
    /// late reset never shifts the schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if a boundary cannot be computed.
    pub fn roll_forward(&mut self, now: Timestamp) -> Result<u32, jiff::Error> {
        let mut elapsed = 0;

        while now >= self.period_end {
            self.period_start = self.period_end;
            self.period_end = self.period.advance(self.period_start)?;
            self.spent = 0;
            elapsed += 1;
        }

        Ok(elapsed)
    }

    /// Whether `cost` fits under the cap (always true when budgeting is disabled).
    #[must_use]
    pub fn allows(&self, settings: &BudgetSettings, cost: u64) -> bool {
        !settings.enabled || self.spent.saturating_add(cost) <= settings.amount
    }

    /// Roll the window forward, then record `cost` if it fits.
    ///
    /// A change of period length re-anchors the window on the new schedule and carries
    /// the spend already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError::Exceeded`] when the cost does not fit, leaving the ledger
    /// untouched apart from the roll-forward.
    pub fn try_reserve(
        &mut self,
        settings: &BudgetSettings,
        cost: u64,
        now: Timestamp,
    ) -> Result<(), BudgetError> {
        if self.period != settings.period {
            let spent = self.spent;

            *self = Self::open(settings.period, now)?;
            self.spent = spent;
        }

        self.roll_forward(now)?;

        if !self.allows(settings, cost) {
            return Err(BudgetError::Exceeded {
                spent: self.spent,
                requested: cost,
                cap: settings.amount,
            });
        }

        self.spent = self.spent.saturating_add(cost);

        Ok(())
    }

    /// Return `cost` reserved at `reserved_at`, if the window it was charged to is still
    /// the current one. Returns whether anything was released.
    pub fn release(&mut self, cost: u64, reserved_at: Timestamp) -> bool {
        if !(self.period_start..self.period_end).contains(&reserved_at) {
            return false;
        }

        self.spent = self.spent.saturating_sub(cost);

        true
    }
}
