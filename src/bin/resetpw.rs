/*!
Reset any account's password from the command line.

```text
resetpw <uname> <new password> [config file]
```

Useful when the default super admin's password has been lost, which is
exactly the situation where logging in to change it is not an option.
*/
use scorbook::auth;
use scorbook::config::Cfg;
use scorbook::store::Store;

fn usage() -> ! {
    eprintln!("usage: resetpw <uname> <new password> [config file]");
    std::process::exit(2);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut args = std::env::args().skip(1);
    let uname = match args.next() {
        Some(u) => u,
        None => usage(),
    };
    let password = match args.next() {
        Some(p) => p,
        None => usage(),
    };

    let cfg = match args.next() {
        Some(path) => match Cfg::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error reading config file {:?}: {}", &path, &e);
                std::process::exit(1);
            },
        },
        None => Cfg::default(),
    };

    let data_db = Store::new(cfg.data_db_connect_string.clone());
    let user = match data_db.get_user_by_uname(&uname).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            eprintln!("No account with uname {:?}.", &uname);
            std::process::exit(1);
        },
        Err(e) => {
            eprintln!("Error reading data DB: {}", &e);
            std::process::exit(1);
        },
    };

    let auth_db = auth::Db::new(cfg.auth_db_connect_string.clone());
    if let Err(e) = auth_db.set_password(
        user.uname(), &password, user.salt()
    ).await {
        eprintln!("Error setting password: {}", &e);
        std::process::exit(1);
    }
    // Any outstanding session key is stale now.
    if let Err(e) = auth_db.clear_key(user.uname()).await {
        eprintln!("Password set, but error clearing session key: {}", &e);
        std::process::exit(1);
    }

    println!("Password for {:?} reset.", user.uname());
}
