/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use crate::{
    auth, auth::AuthResult,
    inter,
    store::Store,
};

#[derive(Deserialize)]
struct ConfigFile {
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    admin_uname: Option<String>,
    admin_password: Option<String>,
    admin_email: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    templates_dir: Option<String>,
}

#[derive(Debug)]
pub struct Cfg {
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub default_admin_uname: String,
    pub default_admin_password: String,
    pub default_admin_email: String,
    pub addr: SocketAddr,
    pub templates_dir: String,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            auth_db_connect_string: "host=localhost user=scorbook_test password='scorbook_test' dbname=scorbook_auth_test".to_owned(),
            data_db_connect_string: "host=localhost user=scorbook_test password='scorbook_test' dbname=scorbook_store_test".to_owned(),
            default_admin_uname: "root".to_owned(),
            default_admin_password: "toot".to_owned(),
            default_admin_email: "admin@scorbook.not.an.address".to_owned(),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
            templates_dir: "templates/".to_owned(),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.admin_uname {
            c.default_admin_uname = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(s) = cf.templates_dir {
            c.templates_dir = s;
        }

        c.apply_env_overrides()?;

        Ok(c)
    }

    /// Environment variables outrank the config file.
    fn apply_env_overrides(&mut self) -> Result<(), String> {
        if let Ok(s) = std::env::var("DATABASE_URL") {
            self.data_db_connect_string = s;
        }
        if let Ok(s) = std::env::var("AUTH_DATABASE_URL") {
            self.auth_db_connect_string = s;
        }
        if let Ok(s) = std::env::var("HOST") {
            self.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing HOST value {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Ok(s) = std::env::var("PORT") {
            self.addr.set_port(
                s.parse().map_err(|e| format!(
                    "Error parsing PORT value {:?}: {}",
                    &s, &e
                ))?
            );
        }
        Ok(())
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.

Both database handles are connection-string holders, not pooled
connections, so sharing him immutably is all the handlers need.
*/
pub struct Glob {
    pub auth: auth::Db,
    pub data: Store,
    pub addr: SocketAddr,
}

impl std::fmt::Debug for Glob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Glob")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}

impl Glob {
    pub fn auth(&self) -> &auth::Db { &self.auth }
    pub fn data(&self) -> &Store { &self.data }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default super admin.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = match Cfg::from_file(path.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::warn!(
                "Error reading config file {:?} ({}); using defaults.",
                path.as_ref().display(), &e
            );
            let mut c = Cfg::default();
            c.apply_env_overrides()?;
            c
        },
    };
    log::info!("Configuration:\n{:#?}", &cfg);

    log::trace!("Checking state of auth DB...");
    let auth_db = auth::Db::new(cfg.auth_db_connect_string.clone());
    if let Err(e) = auth_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    log::trace!("Checking state of data DB...");
    let data_db = Store::new(cfg.data_db_connect_string.clone());
    if let Err(e) = data_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default super admin in data DB...");
    let default_admin = match data_db.get_user_by_uname(
        &cfg.default_admin_uname
    ).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default super admin ({}) in data DB: {}",
                &cfg.default_admin_uname, &e
            );
            return Err(estr);
        },
        Ok(None) => {
            log::info!(
                "Default super admin ({}) doesn't exist in data DB; inserting.",
                &cfg.default_admin_uname
            );
            if let Err(e) = data_db.insert_super_admin(
                &cfg.default_admin_uname,
                &cfg.default_admin_email
            ).await {
                let estr = format!(
                    "Error inserting default super admin into data DB: {}",
                    &e
                );
                return Err(estr);
            }
            match data_db.get_user_by_uname(&cfg.default_admin_uname).await {
                Err(e) => {
                    let estr = format!("Error attempting to retrieve newly-inserted default super admin: {}", &e);
                    return Err(estr);
                },
                Ok(None) => {
                    return Err(
                        "Newly-inserted default super admin still not there for some reason.".to_owned()
                    );
                },
                Ok(Some(u)) => u,
            }
        },
        Ok(Some(u)) => u,
    };
    log::trace!("Default super admin OK in data DB.");

    log::trace!("Checking existence of default super admin in auth DB...");
    match auth_db.check_password(
        default_admin.uname(),
        &cfg.default_admin_password,
        default_admin.salt(),
    ).await {
        Err(e) => {
            let estr = format!("Error checking existence of default super admin in auth DB: {}", &e);
            return Err(estr);
        },
        Ok(AuthResult::BadPassword) => {
            log::warn!(
                "Default super admin ({}) not using default password.",
                default_admin.uname()
            );
        },
        Ok(AuthResult::NoSuchUser) => {
            log::info!(
                "Default super admin ({}) doesn't exist in auth DB; inserting.",
                default_admin.uname()
            );
            if let Err(e) = auth_db.add_user(
                default_admin.uname(),
                &cfg.default_admin_password,
                default_admin.salt()
            ).await {
                let estr = format!("Error inserting default super admin into auth DB: {}", &e);
                return Err(estr);
            };
            log::trace!("Default super admin inserted into auth DB.");
        },
        Ok(AuthResult::Ok) => {
            log::trace!("Default super admin password check OK.");
        },
        Ok(x) => {
            let estr = format!(
                "Default super admin password check resulted in {:?}, which just doesn't make sense.",
                &x
            );
            return Err(estr);
        },
    }
    log::trace!("Default super admin OK in auth DB.");

    inter::init(&cfg.templates_dir)?;

    let glob = Glob {
        auth: auth_db,
        data: data_db,
        addr: cfg.addr,
    };

    Ok(glob)
}
