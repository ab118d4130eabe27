use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Designation {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1)]
    pub com_id: u64,
    #[schema(example = "Line Supervisor")]
    pub desig_name: String,
}
