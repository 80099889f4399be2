use crate::commands::CommandResult;
use barkline_core::config::{AppConfig, LoadOptions};
use barkline_db::fixtures::apply_demo_seed;
use barkline_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        apply_demo_seed(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let (groomers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM groomers")
            .fetch_one(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        let (clients,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<(i64, i64), (&'static str, String, u8)> =
            if groomers == 0 || clients == 0 {
                Err((
                    "seed_verification",
                    format!(
                        "demo dataset incomplete after load ({groomers} groomers, {clients} clients)"
                    ),
                    6u8,
                ))
            } else {
                Ok((groomers, clients))
            };

        pool.close().await;
        run_result
    });

    match result {
        Ok((groomers, clients)) => CommandResult::success(
            "seed",
            format!("demo salon seeded: {groomers} groomers, {clients} clients"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
