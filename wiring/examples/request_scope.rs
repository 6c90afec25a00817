//! Request-scoped resolution with a shared root.
//!
//! Run with `RUST_LOG=wiring_container=debug` to watch registrations and
//! scope changes.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use wiring::prelude::*;

trait Logger: Send + Sync {
    fn log(&self, msg: &str);
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log(&self, msg: &str) {
        println!("[LOG] {msg}");
    }
}

#[derive(Clone, Default)]
struct Config {
    database_url: String,
}

struct Database {
    url: String,
    logger: Arc<dyn Logger>,
}

impl Database {
    fn query(&self, sql: &str) -> String {
        self.logger.log(&format!("Executing: {sql}"));
        format!("Results from {}", self.url)
    }
}

#[derive(Clone, Debug, Default)]
struct RequestId(u64);

#[derive(Default, Inject)]
struct UserHandler {
    #[ioc]
    request: RequestId,
    #[ioc]
    db: Option<Arc<Database>>,
}

impl UserHandler {
    fn handle(&self, user: u64) -> String {
        match &self.db {
            Some(db) => format!(
                "request {}: {}",
                self.request.0,
                db.query(&format!("SELECT * FROM users WHERE id = {user}"))
            ),
            None => "no database".to_string(),
        }
    }
}

struct StorageModule;

impl Module for StorageModule {
    fn register(&self, registry: &Registry) -> Result<()> {
        registry.bind(Config {
            database_url: "postgres://localhost/app".into(),
        })?;
        registry
            .bind(Arc::new(ConsoleLogger))?
            .assignable_to(|logger| logger as Arc<dyn Logger>);
        registry.shared_factory(
            |config: Config, logger: Arc<dyn Logger>| -> Result<Option<Arc<Database>>> {
                logger.log("Connecting to database");
                Ok(Some(Arc::new(Database {
                    url: config.database_url,
                    logger,
                })))
            },
        )?;
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let root: Root<u64> = Root::new();
    root.registry().install(&StorageModule)?;
    root.registry().validate()?;

    for id in 1..=3 {
        let scope = root.enter(id);
        scope.bind(RequestId(id))?;

        let handler: UserHandler = root.scope(&id).construct()?;
        info!(request = id, "Handled");
        println!("{}", handler.handle(id * 10));

        root.leave(&id);
    }

    Ok(())
}
