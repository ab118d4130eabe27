use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_BASIC_PCT: Decimal = dec!(50);
pub const DEFAULT_HRENT_PCT: Decimal = dec!(30);
pub const DEFAULT_MEDICAL_PCT: Decimal = dec!(15);
/// Share of gross that is never configurable per company.
pub const OTHERS_PCT: Decimal = dec!(5);

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "com_name": "Acme Garments Ltd.",
    "basic": "50.00",
    "hrent": "30.00",
    "medical": "15.00",
    "is_inactive": false
}))]
pub struct Company {
    pub id: u64,
    pub com_name: String,
    /// Whole percentage of gross, e.g. 50 for 50 %
    pub basic: Decimal,
    pub hrent: Decimal,
    pub medical: Decimal,
    pub is_inactive: bool,
}

/// Effective salary split of a company, with defaults substituted for
/// percentages that were never configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PayRules {
    pub basic_pct: Decimal,
    pub hrent_pct: Decimal,
    pub medical_pct: Decimal,
}

impl Default for PayRules {
    fn default() -> Self {
        Self {
            basic_pct: DEFAULT_BASIC_PCT,
            hrent_pct: DEFAULT_HRENT_PCT,
            medical_pct: DEFAULT_MEDICAL_PCT,
        }
    }
}

impl PayRules {
    pub fn new(basic: Decimal, hrent: Decimal, medical: Decimal) -> Self {
        fn or_default(value: Decimal, default: Decimal) -> Decimal {
            if value > Decimal::ZERO { value } else { default }
        }

        Self {
            basic_pct: or_default(basic, DEFAULT_BASIC_PCT),
            hrent_pct: or_default(hrent, DEFAULT_HRENT_PCT),
            medical_pct: or_default(medical, DEFAULT_MEDICAL_PCT),
        }
    }

    pub fn split(&self, gross: Decimal) -> SalaryBreakdown {
        SalaryBreakdown {
            basic: percent_of(gross, self.basic_pct),
            hrent: percent_of(gross, self.hrent_pct),
            medical: percent_of(gross, self.medical_pct),
            others: percent_of(gross, OTHERS_PCT),
        }
    }
}

impl From<&Company> for PayRules {
    fn from(company: &Company) -> Self {
        PayRules::new(company.basic, company.hrent, company.medical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct SalaryBreakdown {
    pub basic: Decimal,
    pub hrent: Decimal,
    pub medical: Decimal,
    pub others: Decimal,
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn percent_of(amount: Decimal, pct: Decimal) -> Decimal {
    round_money(amount * pct / dec!(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_percentages_fall_back_to_defaults() {
        let rules = PayRules::new(Decimal::ZERO, dec!(25), dec!(-1));
        assert_eq!(rules.basic_pct, dec!(50));
        assert_eq!(rules.hrent_pct, dec!(25));
        assert_eq!(rules.medical_pct, dec!(15));
    }

    #[test]
    fn default_split_of_gross() {
        let split = PayRules::default().split(dec!(20000));
        assert_eq!(split.basic, dec!(10000));
        assert_eq!(split.hrent, dec!(6000));
        assert_eq!(split.medical, dec!(3000));
        assert_eq!(split.others, dec!(1000));
    }

    #[test]
    fn split_rounds_to_cents() {
        let split = PayRules::new(dec!(33.33), dec!(30), dec!(15)).split(dec!(1000.01));
        assert_eq!(split.basic, dec!(333.30));
        assert_eq!(split.others, dec!(50.00));
    }

    #[test]
    fn company_rates_are_used_when_configured() {
        let company = Company {
            id: 7,
            com_name: "Acme".into(),
            basic: dec!(60),
            hrent: dec!(25),
            medical: dec!(10),
            is_inactive: false,
        };
        let split = PayRules::from(&company).split(dec!(10000));
        assert_eq!(split.basic, dec!(6000));
        assert_eq!(split.hrent, dec!(2500));
        assert_eq!(split.medical, dec!(1000));
        assert_eq!(split.others, dec!(500));
    }
}
