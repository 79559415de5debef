//! BonsCompte Admin CLI
//!
//! Usage:
//!   bonscompte-admin approve <username>   # Approve a user (sets state to active)
//!   bonscompte-admin revoke <username>    # Revoke a user's access
//!   bonscompte-admin list-users           # List all users
//!   bonscompte-admin force-sweep          # Force a recurring-expense sweep now
//!   bonscompte-admin sweep-deletions      # Force the account-deletion grace-period sweep now
//!   bonscompte-admin verify-history       # Verify the history-log hash chain

use clap::{Parser, Subcommand};

use bonscompte_backend::{
    config::Config,
    db,
    models::UserState,
    services::{
        account_lifecycle,
        recurring_engine::{self, Clock, SystemClock},
        BalanceCache, HistoryService,
    },
};

#[derive(Parser)]
#[command(name = "bonscompte-admin")]
#[command(about = "BonsCompte administration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Approve a user (sets state to active)
    Approve {
        /// Username to approve
        username: String,
    },
    /// Revoke a user's access (sets state to revoked)
    Revoke {
        /// Username to revoke
        username: String,
    },
    /// List all users with their states
    ListUsers,
    /// Force a recurring-expense sweep right now, regardless of the configured interval
    ForceSweep,
    /// Anonymize every account whose deletion grace period has elapsed, right now
    SweepDeletions,
    /// Walk the history log and report the first point of tampering, if any
    VerifyHistory,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let pool = db::init_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Approve { username } => {
            let user: Option<(i64, String, i64)> = sqlx::query_as(
                "SELECT id, user_state, token_version FROM users WHERE username = ?",
            )
            .bind(&username)
            .fetch_optional(&pool)
            .await?;

            let (user_id, current_state, current_version) = match user {
                Some(u) => u,
                None => {
                    eprintln!("Error: User '{}' not found", username);
                    std::process::exit(1);
                }
            };

            if current_state == UserState::Active.as_str() {
                println!("User '{}' is already active", username);
                return Ok(());
            }

            sqlx::query("UPDATE users SET user_state = ? WHERE id = ?")
                .bind(UserState::Active.as_str())
                .bind(user_id)
                .execute(&pool)
                .await?;

            println!("User '{}' approved", username);
            println!("Previous state: {}", current_state);
            println!("New state: active");
            println!("Token version: {} (unchanged)", current_version);
        }

        Commands::Revoke { username } => {
            let user: Option<(i64, String, i64)> = sqlx::query_as(
                "SELECT id, user_state, token_version FROM users WHERE username = ?",
            )
            .bind(&username)
            .fetch_optional(&pool)
            .await?;

            let (user_id, current_state, current_version) = match user {
                Some(u) => u,
                None => {
                    eprintln!("Error: User '{}' not found", username);
                    std::process::exit(1);
                }
            };

            if current_state == UserState::Revoked.as_str() {
                println!("User '{}' is already revoked", username);
                return Ok(());
            }

            let new_version = current_version + 1;
            sqlx::query("UPDATE users SET user_state = ?, token_version = ? WHERE id = ?")
                .bind(UserState::Revoked.as_str())
                .bind(new_version)
                .bind(user_id)
                .execute(&pool)
                .await?;

            println!("User '{}' revoked", username);
            println!("Previous state: {}", current_state);
            println!("New state: revoked");
            println!(
                "Token version: {} -> {} (all tokens invalidated)",
                current_version, new_version
            );
        }

        Commands::ListUsers => {
            let users: Vec<(i64, String, Option<String>, String, i64, String)> = sqlx::query_as(
                "SELECT id, username, display_name, user_state, token_version, created_at FROM users ORDER BY id",
            )
            .fetch_all(&pool)
            .await?;

            if users.is_empty() {
                println!("No users found");
            } else {
                println!(
                    "{:<5} {:<20} {:<20} {:<18} {:<8} Created",
                    "ID", "Username", "Display Name", "State", "TokVer"
                );
                println!("{}", "-".repeat(90));
                for (id, username, display_name, state, token_version, created_at) in users {
                    println!(
                        "{:<5} {:<20} {:<20} {:<18} {:<8} {}",
                        id,
                        username,
                        display_name.unwrap_or_else(|| "-".to_string()),
                        state,
                        token_version,
                        created_at
                    );
                }
            }
        }

        Commands::ForceSweep => {
            let cache = BalanceCache::new(config.balance_cache_ttl_seconds);
            let now = SystemClock.today();
            let outcome = recurring_engine::generate_due(&pool, &cache, now).await?;

            println!("Rules examined: {}", outcome.rules_examined);
            println!("Occurrences generated: {}", outcome.occurrences_generated);
            println!("Rules deactivated: {}", outcome.rules_deactivated);
            if !outcome.errors.is_empty() {
                println!("Errors:");
                for err in &outcome.errors {
                    println!("  {}", err);
                }
            }
        }

        Commands::SweepDeletions => {
            let outcome = account_lifecycle::sweep(&pool, &account_lifecycle::SystemClock).await?;

            println!("Users examined: {}", outcome.users_examined);
            println!("Users anonymized: {}", outcome.users_anonymized);
        }

        Commands::VerifyHistory => {
            let verification = HistoryService::verify_chain(&pool).await?;

            println!("Total entries: {}", verification.total_entries);
            if verification.is_valid {
                println!("Chain is valid.");
            } else {
                eprintln!("Chain is INVALID: {}", verification.message);
                if let Some(id) = verification.first_broken_id {
                    eprintln!("First broken entry: {}", id);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
