/*!
Handlers for teacher users: score entry, publication, ranking, and
the CSV/XLSX exports.

The read-side handlers (ranking and exports) also accept school
admins, who can see every class; teachers only the classes they're
assigned.
*/
use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    Json,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::export;
use crate::grade;
use crate::school::{School, Term};
use crate::student::SubjectScores;
use crate::user::{Role, Teacher, User};
use super::*;

pub async fn login(
    teacher: Teacher,
    form: LoginData,
    glob: Arc<Glob>,
) -> Response {
    log::trace!(
        "teacher::login( {:?}, [ form ], [ global state ] ) called.",
        &teacher.base.uname
    );

    let auth_response = glob.auth().check_password_and_issue_key(
        &teacher.base.uname,
        &form.password,
        &teacher.base.salt
    ).await;

    let auth_key = match auth_response {
        Err(e) => {
            log::error!(
                "Error: auth::Db::check_password_and_issue_key( {:?}, ... ): {}",
                &teacher.base.uname, &e
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
                &teacher.base.uname, &x
            );
            return respond_bad_password();
        }
    };

    let school_id = match teacher.base.school.as_deref() {
        Some(s) => s,
        None => {
            log::error!("Teacher {:?} has no school.", &teacher.base.uname);
            return html_500();
        },
    };
    let school = match glob.data().get_school(school_id).await {
        Ok(s) => s,
        Err(e) => { return respond_store_error(e); },
    };

    let data = json!({
        "uname": &teacher.base.uname,
        "key": &auth_key,
        "name": &teacher.name,
        "classes": &teacher.classes,
        "school": &school,
    });

    serve_template(
        StatusCode::OK,
        "teacher",
        &data,
        vec![]
    )
}

/// Who's asking, and what classes they're allowed at.
struct Acting {
    uname: String,
    school: School,
    /// `None` means every class (school admins).
    classes: Option<Vec<String>>,
}

impl Acting {
    fn may_touch(&self, classname: &str) -> bool {
        match &self.classes {
            None => true,
            Some(classes) => classes.iter().any(|c| c == classname),
        }
    }
}

async fn require_staff(
    headers: &HeaderMap,
    glob: &Arc<Glob>,
    writing: bool,
) -> Result<Acting, Response> {
    let u = request_user(headers, glob).await?;

    let (role, classes) = match &u {
        User::SchoolAdmin(_) => (Role::SchoolAdmin, None),
        User::Teacher(t) => (Role::Teacher, Some(t.classes.clone())),
        _ => { return Err(respond_forbidden()); },
    };

    let school_id = match u.school() {
        Some(s) => s,
        None => {
            log::error!("Staff account {:?} has no school.", u.uname());
            return Err(text_500(None));
        },
    };

    let school = glob.data().get_school(school_id).await
        .map_err(respond_store_error)?;

    if writing && !school.writable_by(role) {
        let msg = if role == Role::Teacher && school.operations_enabled {
            "Teacher operations for this school are currently disabled."
        } else {
            "Operations for this school are currently disabled."
        };
        return Err(respond_read_only(msg));
    }

    Ok(Acting {
        uname: u.uname().to_owned(),
        school,
        classes,
    })
}

#[derive(Debug, Deserialize)]
pub struct EnterScoresData {
    pub student_id: String,
    pub term: Option<Term>,
    pub scores: HashMap<String, SubjectScores>,
    #[serde(default)]
    pub comment: String,
}

/**
Validate and save one student's score map.

Everything is checked against the school's configured bounds before the
write; an out-of-range value is rejected, never clamped. A published
class comes back 403.
*/
pub async fn enter_scores(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("teacher::enter_scores( ... ) called.");

    let acting = match require_staff(&headers, &glob, true).await {
        Ok(a) => a,
        Err(resp) => { return resp; },
    };

    let data: EnterScoresData = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize score data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    let stud = match glob.data().get_student(
        &acting.school.id, &data.student_id
    ).await {
        Ok(s) => s,
        Err(e) => { return respond_store_error(e); },
    };

    if !acting.may_touch(&stud.classname) {
        return respond_forbidden();
    }

    if let Err(e) = stud.validate_scores(&data.scores, &acting.school) {
        return respond_bad_request(e);
    }

    let term = data.term.unwrap_or(acting.school.current_term);
    let res = glob.data().save_scores(
        &acting.school.id,
        &data.student_id,
        term,
        &data.scores,
        &data.comment,
    ).await;

    match res {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishData {
    pub classname: String,
    pub term: Option<Term>,
}

pub async fn publish_results(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("teacher::publish_results( ... ) called.");

    let acting = match require_staff(&headers, &glob, true).await {
        Ok(a) => a,
        Err(resp) => { return resp; },
    };

    let data: PublishData = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize publish data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    if !acting.may_touch(&data.classname) {
        return respond_forbidden();
    }

    let term = data.term.unwrap_or(acting.school.current_term);
    match glob.data().publish_class(
        &acting.school, &data.classname, term, &acting.uname
    ).await {
        Ok(n) => (
            StatusCode::OK,
            format!("Published {} results for {} ({}).", n, &data.classname, term),
        ).into_response(),
        Err(e) => respond_store_error(e),
    }
}

pub async fn unpublish_results(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("teacher::unpublish_results( ... ) called.");

    let acting = match require_staff(&headers, &glob, true).await {
        Ok(a) => a,
        Err(resp) => { return resp; },
    };

    let data: PublishData = match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => d,
        Some(Err(e)) => {
            return respond_bad_request(
                format!("Unable to deserialize publish data: {}", &e)
            );
        },
        None => {
            return respond_bad_request("Request requires a JSON body.".to_owned());
        },
    };

    if !acting.may_touch(&data.classname) {
        return respond_forbidden();
    }

    let term = data.term.unwrap_or(acting.school.current_term);
    match glob.data().unpublish_class(
        &acting.school.id, &data.classname, term
    ).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassQuery {
    pub classname: String,
}

async fn ranked_class(
    acting: &Acting,
    classname: &str,
    glob: &Arc<Glob>,
) -> Result<Vec<grade::Ranked>, Response> {
    if !acting.may_touch(classname) {
        return Err(respond_forbidden());
    }

    let studs = glob.data().get_class(&acting.school.id, classname).await
        .map_err(respond_store_error)?;
    if studs.is_empty() {
        return Err(respond_store_error(crate::store::StoreError::NotFound));
    }

    Ok(grade::rank_class(&studs, &acting.school))
}

pub async fn rank_students(
    headers: HeaderMap,
    Query(query): Query<ClassQuery>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("teacher::rank_students( {:?} ) called.", &query.classname);

    let acting = match require_staff(&headers, &glob, false).await {
        Ok(a) => a,
        Err(resp) => { return resp; },
    };

    match ranked_class(&acting, &query.classname, &glob).await {
        Ok(ranked) => Json(ranked).into_response(),
        Err(resp) => resp,
    }
}

fn attachment_headers(
    content_type: &'static str,
    filename: &str,
) -> Result<Vec<(HeaderName, HeaderValue)>, Response> {
    let disposition = HeaderValue::from_str(
        &format!("attachment; filename=\"{}\"", filename)
    ).map_err(|e| {
        log::error!(
            "Unable to build disposition header for {:?}: {}",
            filename, &e
        );
        text_500(None)
    })?;

    Ok(vec![
        (
            HeaderName::from_static("content-type"),
            HeaderValue::from_static(content_type),
        ),
        (
            HeaderName::from_static("content-disposition"),
            disposition,
        ),
    ])
}

pub async fn export_csv(
    headers: HeaderMap,
    Query(query): Query<ClassQuery>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("teacher::export_csv( {:?} ) called.", &query.classname);

    let acting = match require_staff(&headers, &glob, false).await {
        Ok(a) => a,
        Err(resp) => { return resp; },
    };

    let ranked = match ranked_class(&acting, &query.classname, &glob).await {
        Ok(r) => r,
        Err(resp) => { return resp; },
    };

    let term = acting.school.current_term;
    let bytes = match export::csv_report(
        &acting.school.name, &query.classname, term, &ranked
    ) {
        Ok(b) => b,
        Err(e) => {
            log::error!("Error generating CSV export: {}", &e);
            return text_500(None);
        },
    };

    let headers = match attachment_headers(
        "text/csv",
        &export::report_filename(&query.classname, term, "csv"),
    ) {
        Ok(h) => h,
        Err(resp) => { return resp; },
    };

    (StatusCode::OK, bytes).add_headers(headers)
}

pub async fn export_xlsx(
    headers: HeaderMap,
    Query(query): Query<ClassQuery>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("teacher::export_xlsx( {:?} ) called.", &query.classname);

    let acting = match require_staff(&headers, &glob, false).await {
        Ok(a) => a,
        Err(resp) => { return resp; },
    };

    let ranked = match ranked_class(&acting, &query.classname, &glob).await {
        Ok(r) => r,
        Err(resp) => { return resp; },
    };

    let term = acting.school.current_term;
    let bytes = match export::xlsx_report(
        &acting.school.name, &query.classname, term, &ranked
    ) {
        Ok(b) => b,
        Err(e) => {
            log::error!("Error generating XLSX export: {}", &e);
            return text_500(None);
        },
    };

    let headers = match attachment_headers(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        &export::report_filename(&query.classname, term, "xlsx"),
    ) {
        Ok(h) => h,
        Err(resp) => { return resp; },
    };

    (StatusCode::OK, bytes).add_headers(headers)
}
