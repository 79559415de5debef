//! End-to-end coverage of the accounting kernel's worked examples: expense
//! splitting (equal/weighted), settlement confirmation reducing debt, and
//! circular debts collapsing to zero simplified edges. Each scenario wires
//! users/groups/memberships directly against an in-memory sqlite pool and
//! drives the same service functions the HTTP routes call.

use bonscompte_backend::db;
use bonscompte_backend::models::{
    CreateExpense, CreateSettlement, ItemInput, PayerInput, ShareMode, SplitInput,
};
use bonscompte_backend::services::{balance_cache::BalanceCache, balance_engine, expense_service, settlement_service};
use sqlx::SqlitePool;

async fn test_pool() -> SqlitePool {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

async fn make_user(pool: &SqlitePool, username: &str) -> i64 {
    sqlx::query("INSERT INTO users (username, password_hash, display_name) VALUES (?, ?, ?)")
        .bind(username)
        .bind("hash")
        .bind(username)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

async fn make_group(pool: &SqlitePool, owner_user_id: i64) -> i64 {
    sqlx::query(
        "INSERT INTO groups (name, owner_user_id, join_code, default_currency) VALUES ('Trip', ?, 'ABCDEFGH', 'USD')",
    )
    .bind(owner_user_id)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

async fn add_member(pool: &SqlitePool, group_id: i64, user_id: i64, role: &str) -> i64 {
    sqlx::query("INSERT INTO memberships (group_id, user_id, role) VALUES (?, ?, ?)")
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

fn equal_split(member_id: i64) -> SplitInput {
    SplitInput {
        member_id,
        share_mode: ShareMode::Equal,
        weight: None,
        exact_amount: None,
    }
}

async fn pay_equal_split(
    pool: &SqlitePool,
    cache: &BalanceCache,
    group_id: i64,
    creator: i64,
    actor_user_id: i64,
    payer: i64,
    amount: &str,
    beneficiaries: &[i64],
) {
    let input = CreateExpense {
        name: "expense".to_string(),
        category: None,
        currency: "USD".to_string(),
        expense_date: "2025-01-01".to_string(),
        items: vec![ItemInput {
            name: "item".to_string(),
            quantity: 1,
            unit_value: amount.to_string(),
            splits: beneficiaries.iter().map(|&m| equal_split(m)).collect(),
        }],
        payers: vec![PayerInput {
            member_id: payer,
            amount: amount.to_string(),
        }],
    };

    expense_service::create_expense(pool, cache, group_id, creator, actor_user_id, "USD", input)
        .await
        .unwrap();
}

/// Scenario 1: Group {Alice, Bob}, USD. Alice pays $100 for groceries, split
/// equally. Expected: Alice +5000, Bob -5000, one edge Bob -> Alice $50.
#[tokio::test]
async fn simple_reimbursement() {
    let pool = test_pool().await;
    let cache = BalanceCache::new(60);

    let alice_user = make_user(&pool, "alice").await;
    let bob_user = make_user(&pool, "bob").await;
    let group_id = make_group(&pool, alice_user).await;
    let alice = add_member(&pool, group_id, alice_user, "owner").await;
    let bob = add_member(&pool, group_id, bob_user, "member").await;

    pay_equal_split(
        &pool, &cache, group_id, alice, alice_user, alice, "100.00", &[alice, bob],
    )
    .await;

    let summary = balance_engine::compute_balances(&pool, group_id).await.unwrap();
    let net = |id: i64| summary.balances.iter().find(|b| b.member_id == id).unwrap().net_balance;
    assert_eq!(net(alice), 5000);
    assert_eq!(net(bob), -5000);

    assert_eq!(summary.simplified.len(), 1);
    assert_eq!(summary.simplified[0].from_member_id, bob);
    assert_eq!(summary.simplified[0].to_member_id, alice);
    assert_eq!(summary.simplified[0].amount, 5000);
}

/// Scenario 2: Group {A,B,C}, USD. A pays $90 split equally. Balances:
/// A +6000, B -3000, C -3000. Two edges of $30 each into A.
#[tokio::test]
async fn three_way_equal_split() {
    let pool = test_pool().await;
    let cache = BalanceCache::new(60);

    let a_user = make_user(&pool, "a").await;
    let b_user = make_user(&pool, "b").await;
    let c_user = make_user(&pool, "c").await;
    let group_id = make_group(&pool, a_user).await;
    let a = add_member(&pool, group_id, a_user, "owner").await;
    let b = add_member(&pool, group_id, b_user, "member").await;
    let c = add_member(&pool, group_id, c_user, "member").await;

    pay_equal_split(&pool, &cache, group_id, a, a_user, a, "90.00", &[a, b, c]).await;

    let summary = balance_engine::compute_balances(&pool, group_id).await.unwrap();
    let net = |id: i64| summary.balances.iter().find(|bal| bal.member_id == id).unwrap().net_balance;
    assert_eq!(net(a), 6000);
    assert_eq!(net(b), -3000);
    assert_eq!(net(c), -3000);

    assert_eq!(summary.simplified.len(), 2);
    let total: i64 = summary.simplified.iter().map(|e| e.amount).sum();
    assert_eq!(total, 6000);
    for edge in &summary.simplified {
        assert_eq!(edge.to_member_id, a);
        assert_eq!(edge.amount, 3000);
    }
}

/// Scenario 3: Group {A,B,C}, USD. A pays $10.00 weighted 1:1:1. Shares
/// [334, 333, 333] by largest-remainder-by-index, A's own share absorbs the
/// extra cent. Balances: A +666, B -333, C -333.
#[tokio::test]
async fn weighted_split_with_remainder() {
    let pool = test_pool().await;
    let cache = BalanceCache::new(60);

    let a_user = make_user(&pool, "a").await;
    let b_user = make_user(&pool, "b").await;
    let c_user = make_user(&pool, "c").await;
    let group_id = make_group(&pool, a_user).await;
    let a = add_member(&pool, group_id, a_user, "owner").await;
    let b = add_member(&pool, group_id, b_user, "member").await;
    let c = add_member(&pool, group_id, c_user, "member").await;

    let input = CreateExpense {
        name: "dinner".to_string(),
        category: None,
        currency: "USD".to_string(),
        expense_date: "2025-01-01".to_string(),
        items: vec![ItemInput {
            name: "dinner".to_string(),
            quantity: 1,
            unit_value: "10.00".to_string(),
            splits: vec![
                SplitInput { member_id: a, share_mode: ShareMode::Weighted, weight: Some(1), exact_amount: None },
                SplitInput { member_id: b, share_mode: ShareMode::Weighted, weight: Some(1), exact_amount: None },
                SplitInput { member_id: c, share_mode: ShareMode::Weighted, weight: Some(1), exact_amount: None },
            ],
        }],
        payers: vec![PayerInput { member_id: a, amount: "10.00".to_string() }],
    };

    expense_service::create_expense(&pool, &cache, group_id, a, a_user, "USD", input)
        .await
        .unwrap();

    let summary = balance_engine::compute_balances(&pool, group_id).await.unwrap();
    let net = |id: i64| summary.balances.iter().find(|bal| bal.member_id == id).unwrap().net_balance;
    assert_eq!(net(a), 666);
    assert_eq!(net(b), -333);
    assert_eq!(net(c), -333);

    let total_simplified: i64 = summary.simplified.iter().map(|e| e.amount).sum();
    assert_eq!(total_simplified, 666);
}

/// Scenario 4: continuing scenario 1, Bob creates a $20 settlement to Alice
/// and Alice (the payee) confirms it. New balances: Alice +3000, Bob -3000.
#[tokio::test]
async fn settlement_confirmation_reduces_debt() {
    let pool = test_pool().await;
    let cache = BalanceCache::new(60);

    let alice_user = make_user(&pool, "alice").await;
    let bob_user = make_user(&pool, "bob").await;
    let group_id = make_group(&pool, alice_user).await;
    let alice = add_member(&pool, group_id, alice_user, "owner").await;
    let bob = add_member(&pool, group_id, bob_user, "member").await;

    pay_equal_split(
        &pool, &cache, group_id, alice, alice_user, alice, "100.00", &[alice, bob],
    )
    .await;

    let settlement = settlement_service::create_settlement(
        &pool,
        group_id,
        "USD",
        bob,
        CreateSettlement {
            payer_member_id: bob,
            payee_member_id: alice,
            amount: "20.00".to_string(),
            currency: None,
            note: None,
        },
    )
    .await
    .unwrap();

    settlement_service::confirm(&pool, &cache, group_id, settlement.id, alice)
        .await
        .unwrap();

    let summary = balance_engine::compute_balances(&pool, group_id).await.unwrap();
    let net = |id: i64| summary.balances.iter().find(|bal| bal.member_id == id).unwrap().net_balance;
    assert_eq!(net(alice), 3000);
    assert_eq!(net(bob), -3000);

    assert_eq!(summary.simplified.len(), 1);
    assert_eq!(summary.simplified[0].amount, 3000);
    assert_eq!(summary.simplified[0].from_member_id, bob);
    assert_eq!(summary.simplified[0].to_member_id, alice);
}

/// Scenario 5: Group {A,B,C}. A pays $30 split with B; B pays $30 split
/// with C; C pays $30 split with A. Every pairwise split nets to zero, so
/// the simplifier should emit no edges at all.
#[tokio::test]
async fn circular_debts_resolve_to_zero_edges() {
    let pool = test_pool().await;
    let cache = BalanceCache::new(60);

    let a_user = make_user(&pool, "a").await;
    let b_user = make_user(&pool, "b").await;
    let c_user = make_user(&pool, "c").await;
    let group_id = make_group(&pool, a_user).await;
    let a = add_member(&pool, group_id, a_user, "owner").await;
    let b = add_member(&pool, group_id, b_user, "member").await;
    let c = add_member(&pool, group_id, c_user, "member").await;

    pay_equal_split(&pool, &cache, group_id, a, a_user, a, "30.00", &[a, b]).await;
    pay_equal_split(&pool, &cache, group_id, b, b_user, b, "30.00", &[b, c]).await;
    pay_equal_split(&pool, &cache, group_id, c, c_user, c, "30.00", &[c, a]).await;

    let summary = balance_engine::compute_balances(&pool, group_id).await.unwrap();
    for bal in &summary.balances {
        assert_eq!(bal.net_balance, 0, "member {} should net to zero", bal.member_id);
    }
    assert!(summary.simplified.is_empty());
}

/// Zero-sum invariant (§8): across an arbitrary sequence of expenses and a
/// confirmed settlement, net balances sum to exactly zero after residual
/// reconciliation, regardless of how many items introduced rounding.
#[tokio::test]
async fn zero_sum_holds_across_mixed_mutations() {
    let pool = test_pool().await;
    let cache = BalanceCache::new(60);

    let a_user = make_user(&pool, "a").await;
    let b_user = make_user(&pool, "b").await;
    let c_user = make_user(&pool, "c").await;
    let group_id = make_group(&pool, a_user).await;
    let a = add_member(&pool, group_id, a_user, "owner").await;
    let b = add_member(&pool, group_id, b_user, "member").await;
    let c = add_member(&pool, group_id, c_user, "member").await;

    pay_equal_split(&pool, &cache, group_id, a, a_user, a, "10.01", &[a, b, c]).await;
    pay_equal_split(&pool, &cache, group_id, b, b_user, b, "7.77", &[a, b, c]).await;

    let settlement = settlement_service::create_settlement(
        &pool,
        group_id,
        "USD",
        c,
        CreateSettlement {
            payer_member_id: c,
            payee_member_id: a,
            amount: "1.00".to_string(),
            currency: None,
            note: None,
        },
    )
    .await
    .unwrap();
    settlement_service::confirm(&pool, &cache, group_id, settlement.id, a)
        .await
        .unwrap();

    let summary = balance_engine::compute_balances(&pool, group_id).await.unwrap();
    let total: i64 = summary.balances.iter().map(|b| b.net_balance).sum();
    assert_eq!(total, 0);
}
