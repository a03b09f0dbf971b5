#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Selects a backend from the environment, probes it and runs a few chained
//! statements against whichever backend ends up active.
//!
//! Without `STRATA_REMOTE_URL`/`STRATA_REMOTE_KEY` this runs entirely on the
//! in-memory store.

use strata_database::{
    Database as _,
    models::{NewUser, USERS_TABLE, User},
    query::{FilterableQuery as _, SortDirection},
};
use strata_database_connection::{ConnectionConfig, StorageMode, init_from_env, select_backend};
use strata_env::simulator::SimulatorEnv;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _layer = strata_logging::init(None)?;

    println!("=== Backend selection ===\n");

    let forced = select_backend(&ConnectionConfig::from_env(&SimulatorEnv::from_vars([(
        "STRATA_STORAGE_MODE",
        "in_memory",
    )])));
    println!(
        "Simulated in-memory config -> {} ({:?})",
        forced.backend(),
        forced.fallback_reason()
    );

    let forced_remote = ConnectionConfig {
        storage_mode: StorageMode::Remote,
        remote_url: Some("http://localhost:54321".to_string()),
        remote_key: Some("anon-key".to_string()),
        ..ConnectionConfig::default()
    };
    println!(
        "Plain http remote URL -> {:?}",
        select_backend(&forced_remote).fallback_reason()
    );

    let connection = init_from_env();
    let connected = connection.init().await;
    println!(
        "Process environment -> {} (probe: {connected})\n",
        connection.backend()
    );

    println!("=== Chained statements ===\n");

    for user in [
        NewUser::new("ada").full_name("Ada Lovelace").role("teacher"),
        NewUser::new("alan").role("student").grade(11),
        NewUser::new("grace").role("student").grade(12),
    ] {
        let response = connection
            .table(USERS_TABLE)
            .insert()
            .values(user.into_values())
            .execute_first(&connection)
            .await
            .decode::<User>();

        match response.into_result() {
            Ok(Some(user)) => println!("Created user {} with id {}", user.username, user.id),
            Ok(None) => println!("Insert returned no row"),
            Err(e) => log::error!("Insert failed: {e}"),
        }
    }

    let response = connection
        .table(USERS_TABLE)
        .select()
        .where_eq("username", "grace")
        .execute_first(&connection)
        .await
        .decode::<User>();
    if let Some(error) = response.error {
        log::error!("Lookup failed: {error}");
    } else {
        println!("Lookup by username -> {:?}", response.data.map(|x| x.id));
    }

    let students = connection
        .table(USERS_TABLE)
        .select()
        .where_eq("role", "student")
        .sort("grade", SortDirection::Desc)
        .limit(5)
        .execute(&connection)
        .await
        .decode::<User>();
    println!(
        "Students by grade -> {:?}",
        students
            .data
            .iter()
            .map(|x| x.username.as_str())
            .collect::<Vec<_>>()
    );

    let updated = connection
        .table(USERS_TABLE)
        .update()
        .value("role", "admin")
        .where_eq("username", "ada")
        .execute(&connection)
        .await;
    println!(
        "Update returned {} row(s), error: {:?}",
        updated.data.len(),
        updated.error
    );

    let courses = connection.table("courses").select().execute(&connection).await;
    println!("Untyped table 'courses' -> {} row(s)", courses.data.len());

    Ok(())
}
