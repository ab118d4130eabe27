pub mod attendance;
pub mod attendance_summary;
pub mod company;
pub mod department;
pub mod designation;
pub mod employee;
pub mod role;
pub mod salary;
pub mod shift;
pub mod user;
