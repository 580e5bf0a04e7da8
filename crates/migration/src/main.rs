use config::{Config, Environment, File};
use sea_orm_migration::prelude::*;
use std::env;

/// Resolve `DATABASE_URL` the same way the server does: environment first,
/// then `config.yaml` (with `__`-separated env overrides).
fn database_url_from_config() -> Option<String> {
    let settings = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()
        .ok()?;
    settings.get_string("database_url").ok()
}

#[tokio::main]
async fn main() {
    if env::var("DATABASE_URL").is_err() {
        match database_url_from_config() {
            Some(url) => env::set_var("DATABASE_URL", url),
            None => eprintln!("DATABASE_URL is not set and config.yaml has no database_url"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
