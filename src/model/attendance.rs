use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::shift::Shift;

/// Single-character attendance code stored in `attendances.att_status`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum AttStatus {
    #[strum(serialize = "P")]
    #[serde(rename = "P")]
    Present,
    #[strum(serialize = "L")]
    #[serde(rename = "L")]
    Late,
    #[strum(serialize = "A")]
    #[serde(rename = "A")]
    Absent,
}

impl AttStatus {
    /// Derives the status of one attendance record from the employee's shift.
    ///
    /// A record whose check-in or check-out is missing (or left at the
    /// `00:00` default) is absent. Otherwise the check-in is compared with
    /// the shift's late threshold, inclusive.
    pub fn derive(
        shift: &Shift,
        grace_minutes: u32,
        in_time: Option<NaiveTime>,
        out_time: Option<NaiveTime>,
    ) -> Self {
        let (Some(check_in), Some(_)) = (punched(in_time), punched(out_time)) else {
            return AttStatus::Absent;
        };

        if check_in <= shift.late_threshold(grace_minutes) {
            AttStatus::Present
        } else {
            AttStatus::Late
        }
    }
}

fn punched(time: Option<NaiveTime>) -> Option<NaiveTime> {
    time.filter(|t| t.num_seconds_from_midnight() != 0 || t.nanosecond() != 0)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attendance {
    pub id: u64,
    pub com_id: u64,
    pub emp_id: u64,
    pub dt_date: NaiveDate,
    pub att_status: String,
    pub in_time: Option<NaiveTime>,
    pub out_time: Option<NaiveTime>,
}

/// Attendance row with the employee it belongs to.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 10,
    "com_id": 1,
    "emp_id": 7,
    "emp_code": "EMP-007",
    "emp_name": "Karim",
    "dt_date": "2025-09-01",
    "att_status": "L",
    "in_time": "08:21:00",
    "out_time": "17:02:00"
}))]
pub struct AttendanceView {
    pub id: u64,
    pub com_id: u64,
    pub emp_id: u64,
    pub emp_code: Option<String>,
    pub emp_name: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub dt_date: NaiveDate,
    pub att_status: String,
    #[schema(value_type = Option<String>, format = "time")]
    pub in_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, format = "time")]
    pub out_time: Option<NaiveTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day_shift() -> Shift {
        Shift {
            id: 1,
            com_id: 1,
            shift_name: "Day".into(),
            in_time: t(8, 0),
            out_time: t(17, 0),
            late_time: None,
        }
    }

    #[test]
    fn on_time_and_boundary_are_present() {
        let shift = day_shift();
        assert_eq!(
            AttStatus::derive(&shift, 15, Some(t(7, 55)), Some(t(17, 0))),
            AttStatus::Present
        );
        assert_eq!(
            AttStatus::derive(&shift, 15, Some(t(8, 15)), Some(t(17, 0))),
            AttStatus::Present
        );
    }

    #[test]
    fn after_grace_is_late() {
        let shift = day_shift();
        assert_eq!(
            AttStatus::derive(&shift, 15, Some(t(8, 16)), Some(t(17, 0))),
            AttStatus::Late
        );
        assert_eq!(
            AttStatus::derive(&shift, 0, Some(t(8, 1)), Some(t(17, 0))),
            AttStatus::Late
        );
    }

    #[test]
    fn missing_or_zero_punch_is_absent() {
        let shift = day_shift();
        assert_eq!(
            AttStatus::derive(&shift, 15, None, Some(t(17, 0))),
            AttStatus::Absent
        );
        assert_eq!(
            AttStatus::derive(&shift, 15, Some(t(8, 0)), None),
            AttStatus::Absent
        );
        assert_eq!(
            AttStatus::derive(&shift, 15, Some(t(0, 0)), Some(t(17, 0))),
            AttStatus::Absent
        );
        assert_eq!(
            AttStatus::derive(&shift, 15, Some(t(8, 0)), Some(t(0, 0))),
            AttStatus::Absent
        );
    }

    #[test]
    fn codes_round_trip_through_strum() {
        assert_eq!(AttStatus::Late.as_ref(), "L");
        assert_eq!(AttStatus::from_str("A").unwrap(), AttStatus::Absent);
        assert!(AttStatus::from_str("X").is_err());
        assert_eq!(serde_json::to_string(&AttStatus::Present).unwrap(), "\"P\"");
    }
}
