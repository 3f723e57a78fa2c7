/*!
Handlers for school admin users: enrollment, staff accounts, school
settings, and the teacher-operations switch.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::school::School;
use crate::student::{Student, StudentId, normalize_classname};
use crate::user::{BaseUser, Role};
use super::*;

pub async fn login(
    base: BaseUser,
    form: LoginData,
    glob: Arc<Glob>,
) -> Response {
    log::trace!(
        "school::login( {:?}, [ form ], [ global state ] ) called.",
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

    let school_id = match base.school.as_deref() {
        Some(s) => s,
        None => {
            log::error!("School admin {:?} has no school.", &base.uname);
            return html_500();
        },
    };
    let school = match glob.data().get_school(school_id).await {
        Ok(s) => s,
        Err(e) => { return respond_store_error(e); },
    };
    let classnames = match glob.data().get_classnames(school_id).await {
        Ok(c) => c,
        Err(e) => { return respond_store_error(e); },
    };

    let data = json!({
        "uname": &base.uname,
        "key": &auth_key,
        "school": &school,
        "classnames": &classnames,
    });

    serve_template(
        StatusCode::OK,
        "school_admin",
        &data,
        vec![]
    )
}

/**
Ensure the requesting account is a school admin and resolve their
school.

With `writing` set, the school's operations toggle is also consulted,
and a switched-off school gets the read-only response.
*/
async fn require_school_admin(
    headers: &HeaderMap,
    glob: &Arc<Glob>,
    writing: bool,
) -> Result<School, Response> {
    let u = request_user(headers, glob).await?;
    if u.role() != Role::SchoolAdmin {
        return Err(respond_forbidden());
    }

    let school_id = match u.school() {
        Some(s) => s,
        None => {
            log::error!("School admin {:?} has no school.", u.uname());
            return Err(text_500(None));
        },
    };

    let school = glob.data().get_school(school_id).await
        .map_err(respond_store_error)?;

    if writing && !school.writable_by(Role::SchoolAdmin) {
        return Err(respond_read_only(
            "Operations for this school are currently disabled."
        ));
    }

    Ok(school)
}

fn parse_body<'a, T: Deserialize<'a>>(
    body: &'a Option<String>,
    what: &str,
) -> Result<T, Response> {
    match body.as_deref().map(serde_json::from_str) {
        Some(Ok(d)) => Ok(d),
        Some(Err(e)) => Err(respond_bad_request(
            format!("Unable to deserialize {}: {}", what, &e)
        )),
        None => Err(respond_bad_request(
            "Request requires a JSON body.".to_owned()
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddStudentData {
    pub firstname: String,
    pub classname: String,
    pub subjects: Vec<String>,
    /// Explicit id; omit to have one generated.
    pub student_id: Option<String>,
    #[serde(default)]
    pub email: String,
    pub password: String,
}

/**
Enroll a student: the record, the login account (uname is the student
id), and the auth DB entry, in that order.
*/
pub async fn add_student(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::add_student( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let data: AddStudentData = match parse_body(&body, "student data") {
        Ok(d) => d,
        Err(resp) => { return resp; },
    };

    // Either way the id is stored (and used as the account uname) in
    // its canonical spelling.
    let id = match data.student_id {
        Some(id) => match id.parse::<StudentId>() {
            Ok(sid) => sid.to_string(),
            Err(e) => { return respond_bad_request(e); },
        },
        None => {
            let seq = match glob.data().next_student_seq(&school.id).await {
                Ok(n) => n,
                Err(e) => { return respond_store_error(e); },
            };
            let year = time::OffsetDateTime::now_utc().year();
            match StudentId::new(year, seq, &data.classname) {
                Ok(sid) => sid.to_string(),
                Err(e) => { return respond_bad_request(e); },
            }
        },
    };

    let stud = Student {
        school: school.id.clone(),
        id: id.clone(),
        firstname: data.firstname,
        classname: normalize_classname(&data.classname),
        term: school.current_term,
        subjects: data.subjects,
        scores: Default::default(),
        comment: String::new(),
    };

    if let Err(e) = glob.data().insert_student(&stud).await {
        return respond_store_error(e);
    }

    let salt = match glob.data().insert_student_account(
        &id, &data.email, &school.id
    ).await {
        Ok(salt) => salt,
        Err(e) => { return respond_store_error(e); },
    };

    if let Err(e) = glob.auth().add_user(&id, &data.password, &salt).await {
        log::error!(
            "Student {:?} enrolled but auth insert failed: {}",
            &id, &e
        );
        return text_500(None);
    }

    (
        StatusCode::CREATED,
        id,
    ).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentData {
    pub student_id: String,
    pub firstname: String,
    pub classname: String,
    pub subjects: Vec<String>,
}

pub async fn update_student(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::update_student( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let data: UpdateStudentData = match parse_body(&body, "student data") {
        Ok(d) => d,
        Err(resp) => { return resp; },
    };

    let res = glob.data().update_student_details(
        &school.id,
        &data.student_id,
        &data.firstname,
        &normalize_classname(&data.classname),
        &data.subjects,
    ).await;

    match res {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

pub async fn delete_student(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::delete_student( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let id = match body.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => {
            return respond_bad_request(
                "Request requires a student id in the body.".to_owned()
            );
        },
    };

    if let Err(e) = glob.data().delete_student(&school.id, &id).await {
        return respond_store_error(e);
    }

    // The login account goes with the record.
    if let Err(e) = glob.data().delete_user(&id).await {
        log::error!(
            "Student {:?} deleted, but removing the account failed: {}",
            &id, &e
        );
    }
    if let Err(e) = glob.auth().delete_user(&id).await {
        log::error!(
            "Student {:?} deleted, but removing the auth record failed: {}",
            &id, &e
        );
    }

    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
pub struct AddTeacherData {
    pub uname: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

pub async fn add_teacher(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::add_teacher( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let data: AddTeacherData = match parse_body(&body, "teacher data") {
        Ok(d) => d,
        Err(resp) => { return resp; },
    };

    let salt = match glob.data().insert_teacher(
        &data.uname, &data.email, &school.id, &data.name, &data.classes
    ).await {
        Ok(salt) => salt,
        Err(e) => { return respond_store_error(e); },
    };

    if let Err(e) = glob.auth().add_user(&data.uname, &data.password, &salt).await {
        log::error!(
            "Teacher {:?} created in data DB but auth insert failed: {}",
            &data.uname, &e
        );
        return text_500(None);
    }

    (
        StatusCode::CREATED,
        format!("Teacher account {:?} created.", &data.uname),
    ).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AssignClassesData {
    pub uname: String,
    pub classes: Vec<String>,
}

pub async fn assign_classes(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::assign_classes( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let data: AssignClassesData = match parse_body(&body, "class assignment") {
        Ok(d) => d,
        Err(resp) => { return resp; },
    };

    match glob.data().set_teacher_classes(
        &school.id, &data.uname, &data.classes
    ).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

/// Update the school's own settings. The id in the body must be the
/// admin's own school; anything else is masked as NotFound.
pub async fn school_settings(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::school_settings( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let mut updated: School = match parse_body(&body, "school settings") {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    if updated.id != school.id {
        return respond_store_error(crate::store::StoreError::NotFound);
    }
    // The toggles have their own endpoints; don't let a settings PUT
    // flip them.
    updated.operations_enabled = school.operations_enabled;
    updated.teacher_operations_enabled = school.teacher_operations_enabled;

    match glob.data().update_school(&updated).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TeacherToggleData {
    pub enabled: bool,
}

pub async fn toggle_teacher_operations(
    headers: HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("school::toggle_teacher_operations( ... ) called.");

    let school = match require_school_admin(&headers, &glob, true).await {
        Ok(s) => s,
        Err(resp) => { return resp; },
    };

    let data: TeacherToggleData = match parse_body(&body, "toggle data") {
        Ok(d) => d,
        Err(resp) => { return resp; },
    };

    match glob.data().set_teacher_operations_enabled(
        &school.id, data.enabled
    ).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => respond_store_error(e),
    }
}
