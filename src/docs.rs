use crate::api::{
    attendance::{AttendanceListResponse, CreateAttendance, EditAttendance, UploadResult},
    attendance_summary::GenerateSummary,
    company::CreateCompany,
    department::CreateDepartment,
    designation::CreateDesignation,
    employee::{CreateEmployee, EmployeeListResponse, UpdateEmployee},
    report::{AttendanceReport, AttendanceReportRow, EmployeeReportRow, SalaryReport},
    salary::{GenerateResult, GenerateSalary},
    shift::CreateShift,
};
use crate::model::{
    attendance::{AttStatus, AttendanceView},
    attendance_summary::{AttendanceSummary, AttendanceSummaryView},
    company::{Company, PayRules},
    department::Department,
    designation::Designation,
    employee::{Employee, EmployeeView, Gender},
    salary::{Salary, SalaryView},
    shift::Shift,
};
use crate::models::{LinkEmployeeReq, LoginReqDto, TokenPair, UserReq};
use crate::utils::export::ReportFormat;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HR Administration API",
        version = "1.0.0",
        description = r#"
## HR administration service

Master data, attendance and payroll for one or more companies. Every record
is scoped to a company (`com_id`).

### Features
- **Companies**, departments, designations and shifts
- **Employees** with salary components derived from company pay rules
- **Attendance**: manual entry, self-service check-in/check-out, CSV or
  XLSX upload and a downloadable template
- **Attendance summaries** rolled up per employee and month
- **Salaries** generated from gross pay and absent days
- **Reports** as JSON, CSV or XLSX

### Security
All `/api` endpoints require a JWT bearer token obtained from `/auth/login`.
Writes need the **HR** or **Admin** role; salary generation, payment and
deletion are **Admin** only.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::link_employee,

        crate::api::company::create_company,
        crate::api::company::list_companies,
        crate::api::company::get_company,
        crate::api::company::update_company,
        crate::api::company::delete_company,
        crate::api::company::pay_rules,

        crate::api::department::create_department,
        crate::api::department::list_departments,
        crate::api::department::get_department,
        crate::api::department::update_department,
        crate::api::department::delete_department,

        crate::api::designation::create_designation,
        crate::api::designation::list_designations,
        crate::api::designation::get_designation,
        crate::api::designation::update_designation,
        crate::api::designation::delete_designation,

        crate::api::shift::create_shift,
        crate::api::shift::list_shifts,
        crate::api::shift::get_shift,
        crate::api::shift::update_shift,
        crate::api::shift::delete_shift,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::attendance::create_attendance,
        crate::api::attendance::list_attendance,
        crate::api::attendance::get_attendance,
        crate::api::attendance::edit_attendance,
        crate::api::attendance::delete_attendance,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::upload_attendance,
        crate::api::attendance::download_template,

        crate::api::attendance_summary::generate_summary,
        crate::api::attendance_summary::list_summaries,
        crate::api::attendance_summary::get_summary,
        crate::api::attendance_summary::edit_summary,
        crate::api::attendance_summary::delete_summary,

        crate::api::salary::generate_salary,
        crate::api::salary::list_salaries,
        crate::api::salary::list_all_salaries,
        crate::api::salary::get_salary,
        crate::api::salary::toggle_payment,
        crate::api::salary::delete_salary,

        crate::api::report::employee_report,
        crate::api::report::attendance_report,
        crate::api::report::salary_report
    ),
    components(
        schemas(
            UserReq,
            LinkEmployeeReq,
            LoginReqDto,
            TokenPair,
            Company,
            CreateCompany,
            PayRules,
            Department,
            CreateDepartment,
            Designation,
            CreateDesignation,
            Shift,
            CreateShift,
            Gender,
            Employee,
            EmployeeView,
            CreateEmployee,
            UpdateEmployee,
            EmployeeListResponse,
            AttStatus,
            AttendanceView,
            CreateAttendance,
            EditAttendance,
            AttendanceListResponse,
            UploadResult,
            AttendanceSummary,
            AttendanceSummaryView,
            GenerateSummary,
            Salary,
            SalaryView,
            GenerateSalary,
            GenerateResult,
            ReportFormat,
            EmployeeReportRow,
            AttendanceReportRow,
            AttendanceReport,
            SalaryReport
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, registration and token rotation"),
        (name = "Company", description = "Companies and their pay rules"),
        (name = "Department", description = "Departments of a company"),
        (name = "Designation", description = "Designations of a company"),
        (name = "Shift", description = "Working shifts"),
        (name = "Employee", description = "Employee master data"),
        (name = "Attendance", description = "Daily attendance"),
        (name = "Attendance Summary", description = "Monthly attendance rollups"),
        (name = "Salary", description = "Monthly salary generation and payment"),
        (name = "Reports", description = "Exportable reports"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::PathItemType;

    #[test]
    fn document_lists_protected_routes_with_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/salary/generate"));
        assert!(doc.paths.paths.contains_key("/api/attendance/upload"));
        assert!(doc.paths.paths.contains_key("/auth/login"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn check_out_is_documented_as_put() {
        let doc = ApiDoc::openapi();
        let item = &doc.paths.paths["/api/attendance/check-out"];
        assert!(item.operations.contains_key(&PathItemType::Put));
        assert!(!item.operations.contains_key(&PathItemType::Post));
    }

    #[test]
    fn employee_link_route_is_documented() {
        let doc = ApiDoc::openapi();
        let item = &doc.paths.paths["/api/users/{user_id}/employee"];
        assert!(item.operations.contains_key(&PathItemType::Put));
    }
}
