//! Local advice engine
//!
//! Portfolio and budget analysis computed from the session's financial state.
//! No provider is involved.

use crate::models::{PortfolioAllocation, RiskLevel};

/// Drift, in percentage points, below which a holding counts as on target
const DRIFT_TOLERANCE: f64 = 5.0;

const ADVISOR_REMINDER: &str =
    "This is general guidance. Consider consulting a financial advisor for personalized advice.";

/// Target stocks/bonds/cash split for a risk level.
/// International and REIT holdings count toward stocks.
pub fn target_allocation(risk_level: RiskLevel) -> PortfolioAllocation {
    match risk_level {
        RiskLevel::Conservative => PortfolioAllocation::new(30.0, 60.0, 10.0),
        RiskLevel::Moderate => PortfolioAllocation::new(70.0, 30.0, 0.0),
        RiskLevel::Aggressive => PortfolioAllocation::new(95.0, 5.0, 0.0),
    }
}

fn focus(risk_level: RiskLevel) -> &'static str {
    match risk_level {
        RiskLevel::Conservative => {
            "stability, capital preservation and dividend-paying stocks"
        }
        RiskLevel::Moderate => "balanced growth and income with broad diversification",
        RiskLevel::Aggressive => {
            "growth stocks, international diversification and higher potential returns"
        }
    }
}

/// Compare the declared allocation with the target for the risk level.
///
/// `Err` carries the reason when there is nothing to analyze.
pub fn portfolio_advice(
    risk_level: RiskLevel,
    portfolio: &PortfolioAllocation,
) -> Result<String, String> {
    if portfolio.is_empty() {
        return Err(
            "no portfolio allocation on file; share your stocks, bonds and cash percentages"
                .to_string(),
        );
    }

    let target = target_allocation(risk_level);
    let mut advice = format!(
        "Portfolio review for your {} risk profile. Current split: {:.0}% stocks, {:.0}% bonds, {:.0}% cash. \
         Target: {:.0}% stocks, {:.0}% bonds, {:.0}% cash.",
        risk_level,
        portfolio.stocks,
        portfolio.bonds,
        portfolio.cash,
        target.stocks,
        target.bonds,
        target.cash
    );

    let drifts = [
        ("stocks", portfolio.stocks - target.stocks),
        ("bonds", portfolio.bonds - target.bonds),
        ("cash", portfolio.cash - target.cash),
    ];

    let adjustments: Vec<String> = drifts
        .iter()
        .filter(|(_, drift)| drift.abs() >= DRIFT_TOLERANCE)
        .map(|(class, drift)| {
            if *drift > 0.0 {
                format!("trim {} by about {:.0} points", class, drift)
            } else {
                format!("add about {:.0} points to {}", -drift, class)
            }
        })
        .collect();

    if adjustments.is_empty() {
        advice.push_str(" Your allocation is within tolerance of the target.");
    } else {
        advice.push_str(&format!(" To rebalance, {}.", adjustments.join(" and ")));
    }

    if (portfolio.total() - 100.0).abs() >= 1.0 {
        advice.push_str(&format!(
            " Note that your declared allocation adds up to {:.0}%, not 100%.",
            portfolio.total()
        ));
    }

    advice.push_str(&format!(" Focus on {}. {}", focus(risk_level), ADVISOR_REMINDER));
    Ok(advice)
}

/// Savings-rate analysis from monthly income and expenses.
///
/// `Err` carries the reason when a figure is missing or unusable.
pub fn budget_advice(income: Option<f64>, expenses: Option<f64>) -> Result<String, String> {
    let income = income
        .filter(|v| *v > 0.0)
        .ok_or_else(|| "I need your monthly income to provide budgeting advice".to_string())?;
    let expenses = expenses
        .filter(|v| *v > 0.0)
        .ok_or_else(|| "I need your monthly expenses to provide budgeting advice".to_string())?;

    let savings_rate = savings_rate(income, expenses);

    let mut advice = format!(
        "Monthly income: ${:.2}. Monthly expenses: ${:.2}. Savings rate: {:.1}%.",
        income, expenses, savings_rate
    );

    let guidance = if savings_rate < 10.0 {
        " Your savings rate is below the recommended 10-20%. Review non-essential expenses, \
         look for ways to increase income and track spending with a detailed budget."
    } else if savings_rate < 20.0 {
        " Good savings rate! Build an emergency fund of 3-6 months of expenses and start \
         investing for long-term goals."
    } else {
        " Excellent savings rate! Consider maximizing retirement contributions and planning \
         for major financial goals."
    };
    advice.push_str(guidance);

    Ok(advice)
}

/// Percentage of income left after expenses
pub fn savings_rate(income: f64, expenses: f64) -> f64 {
    (income - expenses) / income * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_sum_to_100() {
        for level in [RiskLevel::Conservative, RiskLevel::Moderate, RiskLevel::Aggressive] {
            assert_eq!(target_allocation(level).total(), 100.0);
        }
    }

    #[test]
    fn test_portfolio_on_target() {
        let advice =
            portfolio_advice(RiskLevel::Moderate, &PortfolioAllocation::new(68.0, 30.0, 2.0))
                .unwrap();
        assert!(advice.contains("within tolerance"));
        assert!(advice.contains("financial advisor"));
    }

    #[test]
    fn test_portfolio_drift() {
        let advice =
            portfolio_advice(RiskLevel::Aggressive, &PortfolioAllocation::new(80.0, 10.0, 10.0))
                .unwrap();
        assert!(advice.contains("Target: 95% stocks, 5% bonds, 0% cash"));
        assert!(advice.contains("add about 15 points to stocks"));
        assert!(advice.contains("trim bonds by about 5 points"));
        assert!(advice.contains("trim cash by about 10 points"));
    }

    #[test]
    fn test_portfolio_not_summing_to_100() {
        let advice =
            portfolio_advice(RiskLevel::Moderate, &PortfolioAllocation::new(50.0, 20.0, 0.0))
                .unwrap();
        assert!(advice.contains("adds up to 70%"));
    }

    #[test]
    fn test_portfolio_missing() {
        assert!(portfolio_advice(RiskLevel::Moderate, &PortfolioAllocation::default()).is_err());
    }

    #[test]
    fn test_budget_thresholds() {
        let low = budget_advice(Some(5000.0), Some(4800.0)).unwrap();
        assert!(low.contains("below the recommended"));

        let good = budget_advice(Some(5000.0), Some(4300.0)).unwrap();
        assert!(good.contains("Good savings rate"));

        let great = budget_advice(Some(5000.0), Some(3000.0)).unwrap();
        assert!(great.contains("Excellent savings rate"));
        assert!(great.contains("40.0%"));
    }

    #[test]
    fn test_budget_missing_figures() {
        assert!(budget_advice(None, Some(100.0)).unwrap_err().contains("income"));
        assert!(budget_advice(Some(100.0), None).unwrap_err().contains("expenses"));
    }
}
