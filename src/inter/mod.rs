/*!
Interoperation between the client (user) and server.

(Not the application and the database; that's covered by `auth` and
`store`.)

The front page `POST /login` lands here and gets dispatched to the
appropriate role submodule; everything behind `key_authenticate` lives
in those submodules too. The public result-lookup portal is in
`public`, which deliberately shares nothing with the authenticated
paths.
*/
use std::{
    fmt::Debug,
    path::Path,
    sync::Arc,
};

use axum::{
    extract::Extension,
    http::{Request, StatusCode},
    http::header::{HeaderName, HeaderValue},
    middleware::Next,
    response::{Html, IntoResponse, Response},
    Form,
};
use handlebars::Handlebars;
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;

use crate::auth::AuthResult;
use crate::config::Glob;
use crate::store::StoreError;
use crate::user::User;

pub mod admin;
pub mod public;
pub mod school;
pub mod student;
pub mod teacher;

pub const UNAME_HEADER: &str = "x-scorbook-uname";
pub const KEY_HEADER: &str = "x-scorbook-key";

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>scorbook | Error</title>
<link rel="stylesheet" href="/static/scorbook.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the form data from a front-page login request.
#[derive(serde::Deserialize, Debug)]
pub struct LoginData {
    pub uname: String,
    pub password: String,
}

/**
Initializes the resources used in this module. This function should be called
before any functionality of this module or any of its submodules is used.

Currently the only thing that happens here is loading the templates used by
`serve_template()`, which will panic unless `init()` has been called first.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    match TEMPLATES.get().unwrap().render(template_name, data) {
        Ok(response_body) => (
            code,
            Html(response_body)
        ).add_headers(addl_headers),
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

pub fn respond_bad_password() -> Response {
    log::trace!("respond_bad_password() called.");

    let data = json!({
        "error_message": "Invalid username/password combination."
    });

    serve_template(
        StatusCode::UNAUTHORIZED,
        "login_error",
        &data,
        vec![]
    )
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

pub fn respond_forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        "You are not allowed to do that.".to_owned(),
    ).into_response()
}

/// The school's operation toggle (or the teacher-specific one) is off.
pub fn respond_read_only(msg: &str) -> Response {
    log::trace!("respond_read_only( {:?} ) called.", msg);

    (
        StatusCode::FORBIDDEN,
        msg.to_owned(),
    ).into_response()
}

/// Map a `Store` failure onto the client-facing status codes.
pub fn respond_store_error(e: StoreError) -> Response {
    match e {
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            "No such record.".to_owned(),
        ).into_response(),
        StoreError::Invalid(msg) => respond_bad_request(msg),
        StoreError::Conflict(msg) => (
            StatusCode::CONFLICT,
            msg,
        ).into_response(),
        StoreError::Locked(msg) => (
            StatusCode::FORBIDDEN,
            msg,
        ).into_response(),
        StoreError::Db(e) => {
            log::error!("Database error fielding request: {}", &e);
            text_500(None)
        },
    }
}

/**
Pull the requesting user's record from the data DB.

By the time a handler calls this, `key_authenticate` has already
vouched for the uname/key pair, so a missing header or unknown uname
means something is wrong with the plumbing, not the request.
*/
pub async fn request_user(
    req_headers: &axum::http::HeaderMap,
    glob: &Arc<Glob>,
) -> Result<User, Response> {
    let uname = match req_headers.get(UNAME_HEADER).map(|v| v.to_str()) {
        Some(Ok(s)) => s,
        _ => {
            log::error!("Authenticated request missing a readable uname header.");
            return Err(text_500(None));
        },
    };

    match glob.data().get_user_by_uname(uname).await {
        Ok(Some(u)) => Ok(u),
        Ok(None) => {
            log::error!(
                "Authenticated uname {:?} has no record in the data DB.",
                uname
            );
            Err(text_500(None))
        },
        Err(e) => Err(respond_store_error(e)),
    }
}

/**
Dispatch a front-page login to the appropriate role submodule.

An unknown uname gets exactly the same response as a bad password.
*/
pub async fn login(
    Form(form): Form<LoginData>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("login( {:?}, [ global state ] ) called.", &form.uname);

    let user = match glob.data().get_user_by_uname(&form.uname).await {
        Err(e) => { return respond_store_error(e); },
        Ok(None) => { return respond_bad_password(); },
        Ok(Some(u)) => u,
    };

    match user {
        User::SuperAdmin(base) => admin::login(base, form, glob).await,
        User::SchoolAdmin(base) => school::login(base, form, glob).await,
        User::Teacher(t) => teacher::login(t, form, glob).await,
        User::Student(base) => student::login(base, form, glob).await,
    }
}

/// Any authenticated user can file an issue report.
pub async fn report_issue(
    headers: axum::http::HeaderMap,
    body: Option<String>,
    Extension(glob): Extension<Arc<Glob>>,
) -> Response {
    log::trace!("report_issue( ... ) called.");

    let u = match request_user(&headers, &glob).await {
        Ok(u) => u,
        Err(resp) => { return resp; },
    };

    let body = match body {
        Some(body) => body,
        None => {
            return respond_bad_request(
                "Request requires a report in the body.".to_owned()
            );
        },
    };

    match glob.data().save_report(u.uname(), &body).await {
        Ok(id) => (
            StatusCode::CREATED,
            format!("Report {} submitted.", id),
        ).into_response(),
        Err(e) => respond_store_error(e),
    }
}

pub async fn key_authenticate<B>(
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let glob: &Arc<Glob> = req.extensions().get().unwrap();

    let key = match req.headers().get(KEY_HEADER) {
        Some(k_val) => match k_val.to_str() {
            Ok(s) => s,
            Err(e) => {
                log::error!(
                    "Failed converting auth key value {:?} to &str: {}",
                    k_val, &e
                );
                return respond_bad_request(
                    format!("{} value unrecognizable.", KEY_HEADER)
                );
            },
        },
        None => {
            return respond_bad_request(
                format!("Request must have an {} header.", KEY_HEADER)
            );
        },
    };

    let uname = match req.headers().get(UNAME_HEADER) {
        Some(u_val) => match u_val.to_str() {
            Ok(s) => s,
            Err(e) => {
                log::error!(
                    "Failed converting uname value {:?} to &str: {}",
                    u_val, &e
                );
                return respond_bad_request(
                    format!("{} value unrecognizable.", UNAME_HEADER)
                );
            },
        },
        None => {
            return respond_bad_request(
                format!("Request must have an {} header.", UNAME_HEADER)
            );
        },
    };

    let res = glob.auth().check_key(uname, key).await;

    match res {
        Err(e) => {
            log::error!(
                "auth::Db::check_key( {:?}, [ key ] ) returned error: {}",
                uname, &e
            );

            return text_500(None);
        },
        Ok(AuthResult::InvalidKey) => {
            return (
                StatusCode::UNAUTHORIZED,
                "Invalid authorization key.".to_owned(),
            ).into_response();
        },
        Ok(AuthResult::Ok) => {
            // This is the good path. We will just fall through and call the
            // next layer after the match.
        }
        Ok(x) => {
            log::warn!(
                "auth::Db::check_key() returned {:?}, which should never happen.",
                &x
            );
            return text_500(None);
        },
    }

    next.run(req).await
}
