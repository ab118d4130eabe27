pub mod attendance_import;
pub mod company_cache;
pub mod db_utils;
pub mod export;
