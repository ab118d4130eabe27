pub mod attendance;
pub mod attendance_summary;
pub mod company;
pub mod department;
pub mod designation;
pub mod employee;
pub mod report;
pub mod salary;
pub mod shift;

use serde::Deserialize;
use utoipa::IntoParams;

/// Dropdown filter shared by the company-scoped master data lists.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ByCompany {
    pub com_id: Option<u64>,
}
