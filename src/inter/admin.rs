/*!
Handlers for super admin users: school lifecycle, account creation,
the operations switch, and issue-report triage.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::header::HeaderMap,
    Json,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::school::School;
use crate::user::{BaseUser, Role, User};
use super::*;

pub async fn login(
    base: BaseUser,
    form: LoginData,
    glob: Arc<Glob>,
) -> Response {
    log::trace!(
        "admin::login( {:?}, [ form ], [ global state ] ) called.",
        &base.uname
    );

    let auth_response = glob.auth().check_password_and_issue_key(
        &base.uname,
        &form.password,
        &base.salt
    ).await;

    let auth_key = match auth_response {
        Err(e) => {
            log::error!(
                "Error: auth::Db::check_password_and_issue_key( {:?}, ... ): {}",
                &base.uname, &e
            );
            return html_500();
        },
        Ok(AuthResult::Key(k)) => k,
        Ok(AuthResult::BadPassword) => {
            return respond_bad_password();
        },
        Ok(x) => {
            log::warn!(
                "auth::Db::check_password_and_issue_key( {:?}, ... ) returned {:?}, which shouldn't happen.",
                &base.uname, &x
            );
            return respond_bad_password();
        }
    };

    let schools = match glob.data().get_schools().await {
        Ok(schools) => schools,
        Err(e) => { return respond_store_error(e); },
    };

    let data = json!({
        "uname": &base.uname,
        "key": &auth_key,
        "schools": &schools,
    });

    serve_template(
        StatusCode::OK,
        "super_admin",
        &data,
        vec![]
    )
}

/// Ensure the requesting account is a super admin before touching
/// anything; everyone else gets a 403.
async fn require_super_admin(
    headers: &HeaderMap,
    glob: &Arc<Glob>,
) -> Result<User, Response> {
    let u = request_user(headers, glob).await?;
    if u.role() != Role::SuperAdmin {
        return Err(respond_forbidden());
    }
    Ok(u)
}

/// Every role but super admin is scoped to a school, so signup for
/// those roles must name one.
fn required_school(role: Role, school: Option<&str>) -> Result<&str, String> {
    match role {
        Role::SuperAdmin => Ok(""),
        _ => match school.map(str::trim) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(format!("Role {} requires a school id.", role)),
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupData {
    pub uname: String,
    pub role: String,
    pub email: String,
    pub password: String,
    pub school: Option<String>,
    /// Teacher-only fields.
    pub name: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// Create an account of any role (with its auth DB entry).
pub async fn signup(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::signup( ... ) called.");

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    let data: SignupData = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize signup data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    let role: Role = match data.role.parse() {
        Ok(r) => r,
        Err(e) => { return respond_bad_request(e); },
    };

    let school = match required_school(role, data.school.as_deref()) {
        Ok(s) => s,
        Err(e) => { return respond_bad_request(e); },
    };
    if role != Role::SuperAdmin {
        // Catch a bogus school here rather than letting the insert's
        // foreign key turn it into a 500.
        if let Err(e) = glob.data().get_school(school).await {
            return match e {
                StoreError::NotFound => respond_bad_request(
                    format!("No school with id {:?}.", school)
                ),
                e => respond_store_error(e),
            };
        }
    }

    let insertion = match role {
        Role::SuperAdmin =>
            glob.data().insert_super_admin(&data.uname, &data.email).await,
        Role::SchoolAdmin =>
            glob.data().insert_school_admin(&data.uname, &data.email, school).await,
        Role::Teacher => {
            let name = data.name.as_deref().unwrap_or(&data.uname);
            glob.data().insert_teacher(
                &data.uname, &data.email, school, name, &data.classes
            ).await
        },
        Role::Student =>
            glob.data().insert_student_account(&data.uname, &data.email, school).await,
    };

    let salt = match insertion {
        Ok(salt) => salt,
        Err(e) => { return respond_store_error(e); },
    };

    if let Err(e) = glob.auth().add_user(&data.uname, &data.password, &salt).await {
        log::error!(
            "Account {:?} created in data DB but auth insert failed: {}",
            &data.uname, &e
        );
        return text_500(None);
    }

    (
        StatusCode::CREATED,
        format!("Account {:?} created with role {}.", &data.uname, role),
    ).into_response()
}

pub async fn add_school(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::add_school( ... ) called.");

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    let school: School = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(s)) => s,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize school data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    match glob.data().insert_school(&school).await {
        Ok(()) => (
            StatusCode::CREATED,
            format!("School {:?} created.", &school.id),
        ).into_response(),
        Err(e) => respond_store_error(e),
    }
}

pub async fn update_school(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::update_school( ... ) called.");

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    let school: School = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(s)) => s,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize school data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    match glob.data().update_school(&school).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

pub async fn delete_school(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::delete_school( ... ) called.");

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    let school_id = match body.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => {
            return respond_bad_request(
                "Request requires a school id in the body.".to_owned()
            );
        },
    };

    // Collect the school's account names first so their auth DB rows
    // can go too.
    let unames: Vec<String> = match glob.data().get_users(&school_id).await {
        Ok(map) => map.into_keys().collect(),
        Err(e) => { return respond_store_error(e); },
    };

    if let Err(e) = glob.data().delete_school(&school_id).await {
        return respond_store_error(e);
    }

    for uname in unames.iter() {
        if let Err(e) = glob.auth().delete_user(uname).await {
            log::error!(
                "School {:?} deleted, but removing auth record for {:?} failed: {}",
                &school_id, uname, &e
            );
        }
    }

    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ToggleData {
    pub school: String,
    pub enabled: bool,
}

pub async fn toggle_operations(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::toggle_operations( ... ) called.");

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    let data: ToggleData = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize toggle data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    match glob.data().set_operations_enabled(&data.school, data.enabled).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub status: Option<String>,
}

pub async fn view_reports(
    headers: HeaderMap,
    Query(query): Query<ReportQuery>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::view_reports( {:?} ) called.", &query);

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    match glob.data().load_reports(query.status.as_deref()).await {
        Ok(reports) => Json(reports).into_response(),
        Err(e) => respond_store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportStatusData {
    pub id: i64,
    /// One of the store's report statuses, or "delete".
    pub status: String,
}

pub async fn report_status(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("admin::report_status( ... ) called.");

    if let Err(resp) = require_super_admin(&headers, &glob).await {
        return resp;
    }

    let data: ReportStatusData = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize report status data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    let res = if data.status == "delete" {
        glob.data().delete_report(data.id).await
    } else {
        glob.data().set_report_status(data.id, &data.status).await
    };

    match res {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn signup_requires_a_school_for_scoped_roles() {
        ensure_logging();

        assert_eq!(required_school(Role::SuperAdmin, None).unwrap(), "");
        assert!(required_school(Role::SchoolAdmin, None).is_err());
        assert!(required_school(Role::Teacher, Some("   ")).is_err());
        assert_eq!(
            required_school(Role::Student, Some("kings")).unwrap(),
            "kings"
        );
    }
}
