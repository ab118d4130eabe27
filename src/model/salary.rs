use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::company::round_money;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Salary {
    pub id: u64,
    pub com_id: u64,
    pub emp_id: u64,
    pub dt_year: i32,
    pub dt_month: i32,
    pub gross: Decimal,
    pub basic: Decimal,
    pub hrent: Decimal,
    pub medical: Decimal,
    pub absent_days: i32,
    pub absent_amount: Decimal,
    pub payable_amount: Decimal,
    pub is_paid: bool,
    pub paid_amount: Decimal,
}

/// Salary row with company and employee names for listings and reports.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct SalaryView {
    pub id: u64,
    pub com_id: u64,
    pub com_name: Option<String>,
    pub emp_id: u64,
    pub emp_code: Option<String>,
    pub emp_name: Option<String>,
    pub dept_name: Option<String>,
    pub dt_year: i32,
    pub dt_month: i32,
    pub gross: Decimal,
    pub basic: Decimal,
    pub hrent: Decimal,
    pub medical: Decimal,
    pub absent_days: i32,
    pub absent_amount: Decimal,
    pub payable_amount: Decimal,
    pub is_paid: bool,
    pub paid_amount: Decimal,
}

/// Monthly pay of one employee before it is written to `salaries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayCalculation {
    pub per_day_rate: Decimal,
    pub absent_amount: Decimal,
    pub payable_amount: Decimal,
}

impl PayCalculation {
    /// Deducts `absent_days` at a daily rate of gross over the month's
    /// calendar days. The deduction never exceeds gross.
    pub fn compute(gross: Decimal, absent_days: u32, days_in_month: u32) -> Self {
        if days_in_month == 0 || gross <= Decimal::ZERO {
            return Self {
                per_day_rate: Decimal::ZERO,
                absent_amount: Decimal::ZERO,
                payable_amount: gross.max(Decimal::ZERO),
            };
        }

        let per_day_rate = gross / Decimal::from(days_in_month);
        let absent_amount = round_money(per_day_rate * Decimal::from(absent_days)).min(gross);

        Self {
            per_day_rate: round_money(per_day_rate),
            absent_amount,
            payable_amount: gross - absent_amount,
        }
    }
}

/// `paid_amount` that goes with a payment flag.
pub fn paid_amount_for(is_paid: bool, payable: Decimal) -> Decimal {
    if is_paid { payable } else { Decimal::ZERO }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn no_absence_pays_gross() {
        let calc = PayCalculation::compute(dec!(30000), 0, 30);
        assert_eq!(calc.absent_amount, Decimal::ZERO);
        assert_eq!(calc.payable_amount, dec!(30000));
        assert_eq!(calc.per_day_rate, dec!(1000));
    }

    #[test]
    fn absence_is_deducted_per_calendar_day() {
        let calc = PayCalculation::compute(dec!(31000), 3, 31);
        assert_eq!(calc.absent_amount, dec!(3000));
        assert_eq!(calc.payable_amount, dec!(28000));
    }

    #[test]
    fn deduction_rounds_to_cents() {
        // 10000 / 30 * 1 = 333.333..
        let calc = PayCalculation::compute(dec!(10000), 1, 30);
        assert_eq!(calc.absent_amount, dec!(333.33));
        assert_eq!(calc.payable_amount, dec!(9666.67));
    }

    #[test]
    fn deduction_is_capped_at_gross() {
        let calc = PayCalculation::compute(dec!(9000), 40, 30);
        assert_eq!(calc.absent_amount, dec!(9000));
        assert_eq!(calc.payable_amount, Decimal::ZERO);
    }

    #[test]
    fn degenerate_inputs_do_not_divide_by_zero() {
        let calc = PayCalculation::compute(dec!(9000), 2, 0);
        assert_eq!(calc.payable_amount, dec!(9000));
        assert_eq!(PayCalculation::compute(dec!(-5), 1, 30).payable_amount, Decimal::ZERO);
    }

    #[test]
    fn paid_amount_follows_flag() {
        assert_eq!(paid_amount_for(true, dec!(1200.50)), dec!(1200.50));
        assert_eq!(paid_amount_for(false, dec!(1200.50)), Decimal::ZERO);
    }
}
