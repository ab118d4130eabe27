use crate::{
    api::{
        attendance, attendance_summary, company, department, designation, employee, report,
        salary, shift,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Attendance sheets are larger than ordinary JSON bodies.
const UPLOAD_LIMIT_BYTES: usize = 5 * 1024 * 1024;

fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| {
            tracing::warn!(requests_per_min, "Invalid rate limit, using default limiter");
            GovernorConfig::default()
        });
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/company")
                    .service(
                        web::resource("")
                            .route(web::post().to(company::create_company))
                            .route(web::get().to(company::list_companies)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(company::get_company))
                            .route(web::put().to(company::update_company))
                            .route(web::delete().to(company::delete_company)),
                    )
                    .service(
                        web::resource("/{id}/pay-rules").route(web::get().to(company::pay_rules)),
                    ),
            )
            .service(
                web::scope("/department")
                    .service(
                        web::resource("")
                            .route(web::post().to(department::create_department))
                            .route(web::get().to(department::list_departments)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(department::get_department))
                            .route(web::put().to(department::update_department))
                            .route(web::delete().to(department::delete_department)),
                    ),
            )
            .service(
                web::scope("/designation")
                    .service(
                        web::resource("")
                            .route(web::post().to(designation::create_designation))
                            .route(web::get().to(designation::list_designations)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(designation::get_designation))
                            .route(web::put().to(designation::update_designation))
                            .route(web::delete().to(designation::delete_designation)),
                    ),
            )
            .service(
                web::scope("/shift")
                    .service(
                        web::resource("")
                            .route(web::post().to(shift::create_shift))
                            .route(web::get().to(shift::list_shifts)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(shift::get_shift))
                            .route(web::put().to(shift::update_shift))
                            .route(web::delete().to(shift::delete_shift)),
                    ),
            )
            .service(
                web::scope("/employee")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(
                        web::resource("")
                            .route(web::post().to(attendance::create_attendance))
                            .route(web::get().to(attendance::list_attendance)),
                    )
                    // literal segments before /{id}
                    .service(
                        web::resource("/check-in").route(web::post().to(attendance::check_in)),
                    )
                    .service(
                        web::resource("/check-out").route(web::put().to(attendance::check_out)),
                    )
                    .service(
                        web::resource("/upload")
                            .app_data(web::PayloadConfig::new(UPLOAD_LIMIT_BYTES))
                            .route(web::post().to(attendance::upload_attendance)),
                    )
                    .service(
                        web::resource("/template")
                            .route(web::get().to(attendance::download_template)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance::get_attendance))
                            .route(web::put().to(attendance::edit_attendance))
                            .route(web::delete().to(attendance::delete_attendance)),
                    ),
            )
            .service(
                web::scope("/attendance-summary")
                    .service(
                        web::resource("").route(web::get().to(attendance_summary::list_summaries)),
                    )
                    .service(
                        web::resource("/generate")
                            .route(web::post().to(attendance_summary::generate_summary)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance_summary::get_summary))
                            .route(web::put().to(attendance_summary::edit_summary))
                            .route(web::delete().to(attendance_summary::delete_summary)),
                    ),
            )
            .service(
                web::scope("/salary")
                    .service(web::resource("").route(web::get().to(salary::list_salaries)))
                    .service(
                        web::resource("/generate").route(web::post().to(salary::generate_salary)),
                    )
                    .service(web::resource("/all").route(web::get().to(salary::list_all_salaries)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(salary::get_salary))
                            .route(web::delete().to(salary::delete_salary)),
                    )
                    .service(
                        web::resource("/{id}/toggle-payment")
                            .route(web::put().to(salary::toggle_payment)),
                    ),
            )
            .service(
                web::resource("/users/{id}/employee")
                    .route(web::put().to(handlers::link_employee)),
            )
            .service(
                web::scope("/reports")
                    .service(
                        web::resource("/employees").route(web::get().to(report::employee_report)),
                    )
                    .service(
                        web::resource("/attendance")
                            .route(web::get().to(report::attendance_report)),
                    )
                    .service(web::resource("/salary").route(web::get().to(report::salary_report))),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_accepts_zero_and_large_rates() {
        let _ = build_limiter(0);
        let _ = build_limiter(120_000);
        let _ = build_limiter(60);
    }
}
