use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "com_id": 1,
        "emp_code": "EMP-001",
        "emp_name": "Rahim Uddin",
        "shift_id": 1,
        "dept_id": 2,
        "desig_id": 3,
        "gender": "male",
        "gross": "20000.00",
        "basic": "10000.00",
        "hrent": "6000.00",
        "medical": "3000.00",
        "others": "1000.00",
        "dt_join": "2024-01-01"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 1)]
    pub com_id: u64,

    #[schema(example = "EMP-001")]
    pub emp_code: String,

    #[schema(example = "Rahim Uddin")]
    pub emp_name: String,

    pub shift_id: u64,
    pub dept_id: u64,
    pub desig_id: u64,

    #[schema(example = "male")]
    pub gender: String,

    pub gross: Decimal,
    pub basic: Decimal,
    pub hrent: Decimal,
    pub medical: Decimal,
    pub others: Decimal,

    #[schema(
        example = "2024-01-01",
        value_type = String,
        format = "date"
    )]
    pub dt_join: NaiveDate,
}

/// Employee row joined with the names of everything it references.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct EmployeeView {
    pub id: u64,
    pub com_id: u64,
    pub emp_code: String,
    pub emp_name: String,
    pub com_name: Option<String>,
    pub shift_id: u64,
    pub shift_name: Option<String>,
    pub dept_id: u64,
    pub dept_name: Option<String>,
    pub desig_id: u64,
    pub desig_name: Option<String>,
    pub gender: String,
    pub gross: Decimal,
    pub basic: Decimal,
    pub hrent: Decimal,
    pub medical: Decimal,
    pub others: Decimal,
    #[schema(value_type = String, format = "date")]
    pub dt_join: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn gender_accepts_any_case() {
        assert_eq!(Gender::from_str("Female").unwrap(), Gender::Female);
        assert_eq!(Gender::from_str("MALE").unwrap(), Gender::Male);
        assert_eq!(Gender::Other.as_ref(), "other");
        assert!(Gender::from_str("x").is_err());
    }
}
