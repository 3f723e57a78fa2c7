/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    Router,
    routing::{get, get_service, post},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tower_http::services::fs::{ServeDir, ServeFile};

use scorbook::config;
use scorbook::inter;

const DEFAULT_CONFIG_FILE: &str = "scorbook.toml";

async fn catchall_error_handler(e: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Unhandled internal error: {}", &e)
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("scorbook")
        .build();
    TermLogger::init(
        scorbook::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned());
    let glob = match config::load_configuration(&config_path).await {
        Ok(glob) => Arc::new(glob),
        Err(e) => {
            log::error!("Unable to start: {}", &e);
            std::process::exit(1);
        },
    };
    let addr = glob.addr;

    let serve_root = get_service(ServeFile::new("data/index.html"))
        .handle_error(catchall_error_handler);

    let serve_static = get_service(ServeDir::new("static"))
        .handle_error(catchall_error_handler);

    let authed = Router::new()
        // super admin
        .route("/signup", post(inter::admin::signup))
        .route("/add-school", post(inter::admin::add_school))
        .route("/update-school", post(inter::admin::update_school))
        .route("/delete-school", post(inter::admin::delete_school))
        .route("/toggle-operations", post(inter::admin::toggle_operations))
        .route("/view-reports", get(inter::admin::view_reports))
        .route("/reports/status", post(inter::admin::report_status))
        // school admin
        .route("/add_student", post(inter::school::add_student))
        .route("/update_student", post(inter::school::update_student))
        .route("/delete_student", post(inter::school::delete_student))
        .route("/add-teacher", post(inter::school::add_teacher))
        .route("/assign-classes", post(inter::school::assign_classes))
        .route("/school-settings", post(inter::school::school_settings))
        .route(
            "/toggle-teacher-operations",
            post(inter::school::toggle_teacher_operations)
        )
        // teacher (reads shared with school admin)
        .route("/enter_scores", post(inter::teacher::enter_scores))
        .route("/publish_results", post(inter::teacher::publish_results))
        .route("/unpublish_results", post(inter::teacher::unpublish_results))
        .route("/rank_students", get(inter::teacher::rank_students))
        .route("/reports/export_csv", get(inter::teacher::export_csv))
        .route("/reports/export_xlsx", get(inter::teacher::export_xlsx))
        // student
        .route("/view-result", get(inter::student::view_result))
        // anyone logged in
        .route("/report_issue", post(inter::report_issue))
        .route_layer(middleware::from_fn(inter::key_authenticate));

    let app = Router::new()
        .route("/", serve_root)
        .nest("/static", serve_static)
        .route("/login", post(inter::login))
        .route("/check-result", post(inter::public::check_result))
        .merge(authed)
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
