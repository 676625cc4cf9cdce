use std::env::{self, VarError};

use rearch::{CData, CapsuleHandle, Container};
use sea_orm::{ConnectOptions, Database, DbConn};
use tracing::{info, instrument, warn};
use url::Url;

use crate::paste_repo::ensure_schema;

const MAX_DB_CONNECTIONS: u32 = 10;

/// # Errors
/// Will return [`Err`] if the connection to the database fails
/// or the `pastes` table cannot be created.
#[instrument]
pub async fn init_container() -> anyhow::Result<Container> {
    info!("Initializing container");
    let container = Container::new();

    let (db_connection_options, set_db_conn) =
        container.read((db_connection_options_capsule, db_conn_init_action));

    info!(?db_connection_options, "Connecting to database");
    let db = Database::connect(db_connection_options).await?;
    ensure_schema(&db).await?;
    set_db_conn(db);

    info!("Container initialized");
    Ok(container)
}

/// # Panics
/// Panics when environment variable is not set or is invalid.
#[must_use]
pub fn db_connection_options_capsule(_: CapsuleHandle) -> ConnectOptions {
    const ENV_VAR_NAME: &str = "DATABASE_URL";
    let url = env::var(ENV_VAR_NAME).unwrap_or_else(|err| match err {
        VarError::NotPresent => panic!("{ENV_VAR_NAME} is not set"),
        VarError::NotUnicode(actual) => {
            panic!("{ENV_VAR_NAME} is invalid unicode: {}", actual.display());
        }
    });

    let mut options = ConnectOptions::new(url);
    options.max_connections(MAX_DB_CONNECTIONS);
    options
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<DbConn>, impl use<> + CData + Fn(Option<DbConn>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(db))
}

/// # Panics
/// Panics when the [`DbConn`] was not set via [`db_conn_init_action`].
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> DbConn {
    let db_conn = get.as_ref(db_conn_manager).0.clone();
    db_conn.expect("DbConn should've been set via db_conn_init_action!")
}

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    const ENV_VAR_NAME: &str = "ADDR";
    const DEFAULT_ADDR: &str = "127.0.0.1:3000";

    match env::var(ENV_VAR_NAME) {
        Ok(addr) => {
            info!(addr, "{ENV_VAR_NAME} environment variable set");
            addr
        }
        Err(VarError::NotPresent) => {
            warn!(
                addr = DEFAULT_ADDR,
                "{ENV_VAR_NAME} environment variable not set; defaulting to {DEFAULT_ADDR}"
            );
            DEFAULT_ADDR.to_string()
        }
        Err(VarError::NotUnicode(actual)) => {
            panic!(
                "{ENV_VAR_NAME} environment variable is invalid: {}",
                actual.display()
            );
        }
    }
}

/// Whether the `x-test-now-ms` request header may override the current time.
/// Only the exact value `1` turns it on.
pub fn test_mode_capsule(_: CapsuleHandle) -> bool {
    const ENV_VAR_NAME: &str = "TEST_MODE";

    let enabled = env::var(ENV_VAR_NAME).is_ok_and(|value| value == "1");
    if enabled {
        warn!("{ENV_VAR_NAME} is enabled; clients can override the current time");
    }
    enabled
}

/// # Panics
/// Panics when environment variable is set but is not an absolute URL.
pub fn public_url_capsule(_: CapsuleHandle) -> Option<Url> {
    const ENV_VAR_NAME: &str = "PUBLIC_URL";

    match env::var(ENV_VAR_NAME) {
        Ok(public_url) => {
            info!(public_url, "{ENV_VAR_NAME} environment variable set");
            Some(Url::parse(&public_url).unwrap_or_else(|err| {
                panic!("{ENV_VAR_NAME} environment variable is not a valid URL: {err}")
            }))
        }
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(actual)) => {
            panic!(
                "{ENV_VAR_NAME} environment variable is invalid: {}",
                actual.display()
            );
        }
    }
}
