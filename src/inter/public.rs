/*!
The public result-lookup portal.

No session, no key: a student id and password come in on a form, and
either the published snapshot comes back or a deliberately vague
failure. Whether an id exists, belongs to some school, or merely has
the wrong password must all look the same from outside.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    Form,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::grade::ordinal;
use crate::school::Term;
use crate::store::StoreError;
use crate::user::User;
use super::*;

#[derive(Debug, Deserialize)]
pub struct CheckResultData {
    pub student_id: String,
    pub password: String,
    pub term: Option<Term>,
}

fn respond_bad_lookup() -> Response {
    let data = json!({
        "error_message": "Invalid student ID or password."
    });

    serve_template(
        StatusCode::UNAUTHORIZED,
        "login_error",
        &data,
        vec![]
    )
}

pub async fn check_result(
    Form(form): Form<CheckResultData>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("public::check_result( [ form ] ) called.");

    // A student account's uname is their student id.
    let user = match glob.data().get_user_by_uname(&form.student_id).await {
        Ok(Some(u)) => u,
        Ok(None) => { return respond_bad_lookup(); },
        Err(StoreError::Db(e)) => {
            log::error!("Database error in result lookup: {}", &e);
            return text_500(None);
        },
        Err(_) => { return respond_bad_lookup(); },
    };

    let base = match user {
        User::Student(base) => base,
        // Non-student accounts don't exist as far as the portal knows.
        _ => { return respond_bad_lookup(); },
    };

    match glob.auth().check_password(
        &base.uname, &form.password, &base.salt
    ).await {
        Ok(AuthResult::Ok) => {},
        Ok(_) => { return respond_bad_lookup(); },
        Err(e) => {
            log::error!("Auth DB error in result lookup: {}", &e);
            return text_500(None);
        },
    }

    let school_id = match base.school.as_deref() {
        Some(s) => s,
        None => {
            log::error!("Student account {:?} has no school.", &base.uname);
            return text_500(None);
        },
    };
    let school = match glob.data().get_school(school_id).await {
        Ok(s) => s,
        Err(e) => { return respond_store_error(e); },
    };

    let term = form.term.unwrap_or(school.current_term);
    let result = match glob.data().get_published_result(
        school_id, &base.uname, term
    ).await {
        Ok(r) => r,
        Err(StoreError::NotFound) => {
            let data = json!({
                "error_message": format!(
                    "No published result is available for {}.", term
                )
            });
            return serve_template(
                StatusCode::NOT_FOUND,
                "login_error",
                &data,
                vec![]
            );
        },
        Err(e) => { return respond_store_error(e); },
    };

    let data = json!({
        "school_name": &school.name,
        "result": &result,
        "position": ordinal(result.position as usize),
        "term": term.to_string(),
    });

    serve_template(
        StatusCode::OK,
        "result",
        &data,
        vec![]
    )
}
