/*!
Handlers for student users: login and viewing their own published
result.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::header::HeaderMap,
    response::Response,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::grade::ordinal;
use crate::school::Term;
use crate::user::{BaseUser, Role};
use super::*;

pub async fn login(
    base: BaseUser,
    form: LoginData,
    glob: Arc<Glob>,
) -> Response {
    log::trace!(
        "student::login( {:?}, [ form ], [ global state ] ) called.",
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

    let data = json!({
        "uname": &base.uname,
        "key": &auth_key,
    });

    serve_template(
        StatusCode::OK,
        "student",
        &data,
        vec![]
    )
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    pub term: Option<Term>,
}

/// A student's own published snapshot. The uname of a student account
/// is their student id.
pub async fn view_result(
    headers: HeaderMap,
    Query(query): Query<ResultQuery>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("student::view_result( {:?} ) called.", &query);

    let u = match request_user(&headers, &glob).await {
        Ok(u) => u,
        Err(resp) => { return resp; },
    };
    if u.role() != Role::Student {
        return respond_forbidden();
    }

    let school_id = match u.school() {
        Some(s) => s,
        None => {
            log::error!("Student account {:?} has no school.", u.uname());
            return text_500(None);
        },
    };
    let school = match glob.data().get_school(school_id).await {
        Ok(s) => s,
        Err(e) => { return respond_store_error(e); },
    };

    let term = query.term.unwrap_or(school.current_term);
    let result = match glob.data().get_published_result(
        school_id, u.uname(), term
    ).await {
        Ok(r) => r,
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
