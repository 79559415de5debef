//! Warms the balance cache for every active group by forcing a fresh
//! computation, and reports each group's net-balance zero-sum check.
//!
//! Usage: cargo run --bin recalculate-contributions

use bonscompte_backend::{config::Config, db, services::BalanceCache};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let pool = db::init_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    let cache = BalanceCache::new(config.balance_cache_ttl_seconds);

    let group_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM groups WHERE deleted_at IS NULL ORDER BY id")
            .fetch_all(&pool)
            .await?;

    println!("Recomputing balances for {} groups", group_ids.len());

    let mut total_groups = 0;
    let mut unbalanced_groups = 0;

    for group_id in group_ids {
        cache.invalidate(group_id).await;
        let summary = cache.get_or_compute(&pool, group_id).await?;

        let net_sum: i64 = summary.balances.iter().map(|b| b.net_balance).sum();
        total_groups += 1;

        if net_sum != 0 {
            unbalanced_groups += 1;
            println!(
                "Group {}: balances do not sum to zero (residual {})",
                group_id, net_sum
            );
        }
    }

    println!(
        "Done. {} groups recomputed, {} flagged as unbalanced.",
        total_groups, unbalanced_groups
    );

    Ok(())
}
