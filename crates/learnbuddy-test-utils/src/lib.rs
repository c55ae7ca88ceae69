//! Throwaway task databases for integration tests.
//!
//! All databases of one test binary live on a single PostgreSQL server:
//! the one named by `LEARNBUDDY_TEST_PG_URL` (server root, no database
//! name), or else a container started on first use. Every test gets its own
//! freshly migrated database.

use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use learnbuddy_db::config::DbConfig;
use learnbuddy_db::pool;

pub const SERVER_URL_ENV: &str = "LEARNBUDDY_TEST_PG_URL";

struct Server {
    root_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var(SERVER_URL_ENV) {
        return Server {
            root_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("start PostgreSQL container");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");
    Server {
        root_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Connection settings for database `name` on the shared test server.
pub async fn test_db_config(name: &str) -> DbConfig {
    let server = SERVER.get_or_init(start_server).await;
    DbConfig::new(format!("{}/{name}", server.root_url))
}

/// Create and migrate a uniquely named database.
///
/// Returns `(pool, db_name)`; pass the name to [`drop_test_db`] afterwards.
pub async fn create_test_db() -> (PgPool, String) {
    let name = format!("learnbuddy_test_{}", Uuid::new_v4().simple());
    let config = test_db_config(&name).await;
    let (pool, _) = pool::prepare_database(&config)
        .await
        .unwrap_or_else(|e| panic!("prepare test database {name}: {e:#}"));
    (pool, name)
}

/// Drop a database made by [`create_test_db`].
pub async fn drop_test_db(name: &str) {
    let config = test_db_config(name).await;
    if let Err(e) = pool::drop_database(&config).await {
        eprintln!("could not drop test database {name}: {e:#}");
    }
}
