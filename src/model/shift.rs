use chrono::{Duration, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "com_id": 1,
    "shift_name": "Day",
    "in_time": "08:00:00",
    "out_time": "17:00:00",
    "late_time": null
}))]
pub struct Shift {
    pub id: u64,
    pub com_id: u64,
    pub shift_name: String,
    #[schema(value_type = String, format = "time")]
    pub in_time: NaiveTime,
    #[schema(value_type = String, format = "time")]
    pub out_time: NaiveTime,
    /// Explicit lateness cut-off; start + grace when absent
    #[schema(value_type = Option<String>, format = "time", nullable = true)]
    pub late_time: Option<NaiveTime>,
}

impl Shift {
    /// Latest check-in that still counts as on time.
    pub fn late_threshold(&self, grace_minutes: u32) -> NaiveTime {
        if let Some(late) = self.late_time {
            return late;
        }

        let (threshold, wrapped) = self
            .in_time
            .overflowing_add_signed(Duration::minutes(i64::from(grace_minutes)));

        // a grace period never pushes the cut-off into the next day
        if wrapped != 0 {
            NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(self.in_time)
        } else {
            threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn shift(in_time: NaiveTime, late_time: Option<NaiveTime>) -> Shift {
        Shift {
            id: 1,
            com_id: 1,
            shift_name: "Day".into(),
            in_time,
            out_time: t(17, 0),
            late_time,
        }
    }

    #[test]
    fn threshold_is_start_plus_grace() {
        assert_eq!(shift(t(8, 0), None).late_threshold(15), t(8, 15));
        assert_eq!(shift(t(8, 0), None).late_threshold(0), t(8, 0));
    }

    #[test]
    fn explicit_late_time_wins() {
        assert_eq!(shift(t(8, 0), Some(t(8, 30))).late_threshold(15), t(8, 30));
    }

    #[test]
    fn threshold_does_not_wrap_past_midnight() {
        let threshold = shift(t(23, 50), None).late_threshold(30);
        assert_eq!(threshold, NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }
}
