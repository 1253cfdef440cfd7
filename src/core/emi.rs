use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_PRINCIPAL: f64 = 10_000.0;
pub const MAX_PRINCIPAL: f64 = 10_000_000.0;
pub const MIN_RATE: f64 = 1.0;
pub const MAX_RATE: f64 = 20.0;
pub const MAX_TERM_YEARS: f64 = 30.0;

const COMPARE_RATE_STEP: f64 = 2.0;
const COMPARE_YEARS_STEP: f64 = 5.0;
const COMPARE_MONTHS_STEP_YEARS: f64 = 0.5;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TermUnit {
    #[default]
    Years,
    Months,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comparison {
    #[serde(alias = "lowerRate", alias = "lower_rate")]
    LowerRate,
    #[serde(alias = "higherRate", alias = "higher_rate")]
    HigherRate,
    #[serde(alias = "shorterTerm", alias = "shorter_term")]
    ShorterTerm,
    #[serde(alias = "longerTerm", alias = "longer_term")]
    LongerTerm,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EmiRequest {
    pub principal: f64,
    pub annual_rate: f64,
    pub term: f64,
    pub unit: TermUnit,
}

impl EmiRequest {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PRINCIPAL..=MAX_PRINCIPAL).contains(&self.principal) {
            return Err(Error::validation(format!(
                "Loan amount must be between {MIN_PRINCIPAL:.0} and {MAX_PRINCIPAL:.0}"
            )));
        }
        if !(MIN_RATE..=MAX_RATE).contains(&self.annual_rate) {
            return Err(Error::validation(format!(
                "Interest rate must be between {MIN_RATE}% and {MAX_RATE}%"
            )));
        }
        let max_term = match self.unit {
            TermUnit::Years => MAX_TERM_YEARS,
            TermUnit::Months => MAX_TERM_YEARS * 12.0,
        };
        if !(1.0..=max_term).contains(&self.term) {
            return Err(Error::validation(format!(
                "Loan term must be between 1 and {max_term:.0} {}",
                match self.unit {
                    TermUnit::Years => "years",
                    TermUnit::Months => "months",
                }
            )));
        }
        Ok(())
    }

    pub fn years(&self) -> f64 {
        match self.unit {
            TermUnit::Years => self.term,
            TermUnit::Months => self.term / 12.0,
        }
    }

    pub fn months(&self) -> u32 {
        (self.years() * 12.0).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiBreakdown {
    pub principal: f64,
    pub annual_rate: f64,
    pub years: f64,
    pub emi: f64,
    pub total_payment: f64,
    pub total_interest: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmiComparison {
    pub scenario: Comparison,
    pub breakdown: EmiBreakdown,
    pub emi_difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePoint {
    pub year: f64,
    pub remaining: f64,
}

/// Equated monthly instalment for `principal` at `annual_rate_percent` over `years`.
pub fn calculate_emi(principal: f64, annual_rate_percent: f64, years: f64) -> f64 {
    let monthly_rate = annual_rate_percent / (12.0 * 100.0);
    let months = years * 12.0;
    if months <= 0.0 {
        return principal;
    }
    if monthly_rate == 0.0 {
        return principal / months;
    }
    let growth = (1.0 + monthly_rate).powf(months);
    principal * monthly_rate * growth / (growth - 1.0)
}

pub fn breakdown(principal: f64, annual_rate_percent: f64, years: f64) -> EmiBreakdown {
    let emi = calculate_emi(principal, annual_rate_percent, years);
    let total_payment = emi * years * 12.0;
    EmiBreakdown {
        principal,
        annual_rate: annual_rate_percent,
        years,
        emi,
        total_payment,
        total_interest: total_payment - principal,
    }
}

pub fn compare(request: &EmiRequest, scenario: Comparison) -> EmiComparison {
    let years = request.years();
    let base = breakdown(request.principal, request.annual_rate, years);
    let (rate, compare_years) = match scenario {
        Comparison::LowerRate => ((request.annual_rate - COMPARE_RATE_STEP).max(MIN_RATE), years),
        Comparison::HigherRate => ((request.annual_rate + COMPARE_RATE_STEP).min(MAX_RATE), years),
        Comparison::ShorterTerm => {
            let shorter = match request.unit {
                TermUnit::Years => (years - COMPARE_YEARS_STEP).max(1.0),
                TermUnit::Months => (years - COMPARE_MONTHS_STEP_YEARS).max(0.1),
            };
            (request.annual_rate, shorter)
        }
        Comparison::LongerTerm => {
            let step = match request.unit {
                TermUnit::Years => COMPARE_YEARS_STEP,
                TermUnit::Months => COMPARE_MONTHS_STEP_YEARS,
            };
            (request.annual_rate, (years + step).min(MAX_TERM_YEARS))
        }
    };
    let other = breakdown(request.principal, rate, compare_years);
    EmiComparison {
        scenario,
        breakdown: other,
        emi_difference: base.emi - other.emi,
    }
}

/// Outstanding principal at each year boundary, starting from year 0.
pub fn remaining_principal_schedule(
    principal: f64,
    annual_rate_percent: f64,
    years: f64,
    emi: f64,
) -> Vec<SchedulePoint> {
    let monthly_rate = annual_rate_percent / (12.0 * 100.0);
    let total_months = (years * 12.0).round().max(0.0) as u32;
    let mut points = vec![SchedulePoint {
        year: 0.0,
        remaining: principal,
    }];

    let mut remaining = principal;
    for month in 1..=total_months {
        let interest = remaining * monthly_rate;
        remaining = (remaining - (emi - interest)).max(0.0);
        if month % 12 == 0 || month == total_months {
            points.push(SchedulePoint {
                year: f64::from(month) / 12.0,
                remaining,
            });
        }
    }
    points
}
