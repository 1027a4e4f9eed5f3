//! Variance Analyzer
//!
//! Budget-vs-actual arithmetic over a [`Budget`]. All sums are exact decimal
//! additions, so the order categories are visited in never changes a total.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{AnalysisResult, Budget, BudgetStatus, CategoryLine, FormattedAnalysis};

/// Compute totals and per-category variances, storing them on the budget
///
/// Recomputes from the budget's inputs on every call, so repeated calls give
/// identical results. Spending under names the budget lacks shows up with a
/// variance of `0 - actual`.
pub fn analyze(budget: &mut Budget) -> Result<AnalysisResult> {
    if budget.categories().is_empty() {
        return Err(Error::validation(
            "categories",
            "budget has no categories to analyze",
        ));
    }

    let mut lines = Vec::with_capacity(budget.categories().len());
    let mut category_variances = BTreeMap::new();
    let mut total_budget = Decimal::ZERO;
    let mut budgeted_names = HashSet::new();

    for category in budget.categories() {
        let actual = budget.spent_in(&category.name);
        let variance = category
            .weekly_amount
            .checked_sub(actual)
            .ok_or_else(|| out_of_range(&category.name))?;

        total_budget = total_budget
            .checked_add(category.weekly_amount)
            .ok_or_else(|| out_of_range("total budget"))?;
        budgeted_names.insert(category.name.as_str());
        category_variances.insert(category.name.clone(), variance);
        lines.push(CategoryLine {
            name: category.name.clone(),
            budgeted: category.weekly_amount,
            actual,
            variance,
            unbudgeted: false,
        });
    }

    let mut total_spent = Decimal::ZERO;
    for (name, actual) in budget.actual_spending() {
        total_spent = total_spent
            .checked_add(*actual)
            .ok_or_else(|| out_of_range("total spent"))?;
        if budgeted_names.contains(name.as_str()) {
            continue;
        }
        let variance = Decimal::ZERO - *actual;
        category_variances.insert(name.clone(), variance);
        lines.push(CategoryLine {
            name: name.clone(),
            budgeted: Decimal::ZERO,
            actual: *actual,
            variance,
            unbudgeted: true,
        });
    }

    let total_variance = total_budget
        .checked_sub(total_spent)
        .ok_or_else(|| out_of_range("total variance"))?;
    let result = AnalysisResult {
        total_budget,
        total_spent,
        total_variance,
        category_variances,
        lines,
        transfer_amount: total_variance.max(Decimal::ZERO),
    };

    debug!(
        total_budget = %result.total_budget,
        total_spent = %result.total_spent,
        total_variance = %result.total_variance,
        "Variance analysis complete"
    );

    budget.store_analysis(result.clone());
    Ok(result)
}

/// Add the consumer-facing `budget_status` to a raw result
pub fn format_analysis_results(raw: &AnalysisResult) -> FormattedAnalysis {
    FormattedAnalysis {
        analysis: raw.clone(),
        budget_status: BudgetStatus::classify(raw.total_variance),
    }
}

fn out_of_range(what: &str) -> Error {
    Error::validation(
        "categories",
        format!("{} is outside the representable amount range", what),
    )
}

/// Analyze and format in one step
pub fn analyze_and_format(budget: &mut Budget) -> Result<FormattedAnalysis> {
    let raw = analyze(budget)?;
    Ok(format_analysis_results(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use rust_decimal_macros::dec;

    fn budget(categories: &[(&str, Decimal)], spending: &[(&str, Decimal)]) -> Budget {
        Budget::new(
            categories
                .iter()
                .map(|(n, a)| Category::new(*n, *a))
                .collect(),
            spending
                .iter()
                .map(|(n, a)| (n.to_string(), *a))
                .collect(),
        )
    }

    #[test]
    fn test_scenario_surplus() {
        let mut b = budget(
            &[("Groceries", dec!(150.00)), ("Dining Out", dec!(50.00))],
            &[("Groceries", dec!(120.00))],
        );
        let formatted = analyze_and_format(&mut b).unwrap();
        let a = &formatted.analysis;

        assert_eq!(a.total_budget, dec!(200.00));
        assert_eq!(a.total_spent, dec!(120.00));
        assert_eq!(a.total_variance, dec!(80.00));
        assert_eq!(a.category_variances["Groceries"], dec!(30.00));
        assert_eq!(a.category_variances["Dining Out"], dec!(50.00));
        assert_eq!(a.category_variances.len(), 2);
        assert_eq!(a.transfer_amount, dec!(80.00));
        assert_eq!(formatted.budget_status, BudgetStatus::Surplus);
        assert!(b.is_analyzed());
        assert_eq!(b.total_variance(), Some(dec!(80.00)));
    }

    #[test]
    fn test_scenario_deficit() {
        let mut b = budget(
            &[("Groceries", dec!(150.00)), ("Dining Out", dec!(50.00))],
            &[("Groceries", dec!(180.00)), ("Dining Out", dec!(60.00))],
        );
        let formatted = analyze_and_format(&mut b).unwrap();

        assert_eq!(formatted.analysis.total_variance, dec!(-40.00));
        assert_eq!(formatted.analysis.transfer_amount, Decimal::ZERO);
        assert_eq!(formatted.budget_status, BudgetStatus::Deficit);
    }

    #[test]
    fn test_balanced() {
        let mut b = budget(&[("Groceries", dec!(100))], &[("Groceries", dec!(100.00))]);
        let formatted = analyze_and_format(&mut b).unwrap();
        assert_eq!(formatted.budget_status, BudgetStatus::Balanced);
    }

    #[test]
    fn test_unbudgeted_and_zero_budget_categories() {
        let mut b = budget(
            &[("Groceries", dec!(100)), ("Tracking", dec!(0))],
            &[("Tracking", dec!(12.34)), ("Games", dec!(15.00))],
        );
        let a = analyze(&mut b).unwrap();

        assert_eq!(a.category_variances["Tracking"], dec!(-12.34));
        assert_eq!(a.category_variances["Games"], dec!(-15.00));
        assert_eq!(a.category_variances["Groceries"], dec!(100));
        assert_eq!(a.total_spent, dec!(27.34));
        assert_eq!(a.total_variance, a.total_budget - a.total_spent);

        let last = a.lines.last().unwrap();
        assert_eq!(last.name, "Games");
        assert!(last.unbudgeted);
        assert_eq!(a.lines[0].name, "Groceries");
    }

    #[test]
    fn test_invariants_hold() {
        let mut b = budget(
            &[
                ("Rent", dec!(400.00)),
                ("Groceries", dec!(150.10)),
                ("Fuel", dec!(60.05)),
            ],
            &[("Groceries", dec!(149.99)), ("Fuel", dec!(70.01)), ("Gifts", dec!(5))],
        );
        let a = analyze(&mut b).unwrap();

        let sum_budget: Decimal = b.categories().iter().map(|c| c.weekly_amount).sum();
        assert_eq!(a.total_budget, sum_budget);
        let sum_spent: Decimal = b.actual_spending().values().copied().sum();
        assert_eq!(a.total_spent, sum_spent);
        assert_eq!(a.total_variance, a.total_budget - a.total_spent);
        for c in b.categories() {
            assert_eq!(
                a.category_variances[&c.name],
                c.weekly_amount - b.spent_in(&c.name)
            );
        }
        let sum_variances: Decimal = a.category_variances.values().copied().sum();
        assert_eq!(sum_variances, a.total_variance);
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let mut b = budget(
            &[("Groceries", dec!(150.00)), ("Dining Out", dec!(50.00))],
            &[("Groceries", dec!(120.00)), ("Dining Out", dec!(10.00))],
        );
        let first = analyze(&mut b).unwrap();
        let second = analyze(&mut b).unwrap();

        assert_eq!(first, second);
        assert_eq!(b.total_spent(), Some(dec!(130.00)));
        assert_eq!(b.actual_spending().len(), 2);
    }

    #[test]
    fn test_empty_categories_is_validation_failure() {
        let mut b = budget(&[], &[("Groceries", dec!(10))]);
        let err = analyze(&mut b).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(!b.is_analyzed());
    }

    #[test]
    fn test_out_of_range_totals_are_validation_failures() {
        let rows = vec![
            crate::models::BudgetRow::new("A", "79228162514264337593543950335"),
            crate::models::BudgetRow::new("B", "1"),
        ];
        let mut aggregation = crate::aggregator::build_budget(&rows, &[]).unwrap();
        let err = analyze(&mut aggregation.budget).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let mut spent = budget(
            &[("A", dec!(10))],
            &[("A", Decimal::MIN), ("Other", Decimal::MAX)],
        );
        assert!(analyze(&mut spent).is_err());
    }
}
