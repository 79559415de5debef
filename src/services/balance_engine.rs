//! Pure balance computation: who paid, who owes, and the smallest set of
//! transfers that settles the group. All amounts are integer minor units in
//! the group's single currency (cross-currency expenses are rejected at
//! write time, so no conversion ever happens here).

use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::error::AppResult;
use crate::models::MemberIdentity;

#[derive(Debug, Clone, Serialize)]
pub struct MemberBalance {
    pub member_id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub total_paid: i64,
    pub total_owed: i64,
    pub net_balance: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DebtEdge {
    pub from_member_id: i64,
    pub from_display_name: String,
    pub to_member_id: i64,
    pub to_display_name: String,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct BalanceSummary {
    pub balances: Vec<MemberBalance>,
    pub simplified: Vec<DebtEdge>,
    pub pairwise: Vec<DebtEdge>,
}

/// Fetches every active member's identity, ordered by membership id - the
/// deterministic order the residual-reconciliation step depends on.
async fn member_identities(pool: &SqlitePool, group_id: i64) -> AppResult<Vec<MemberIdentity>> {
    let rows: Vec<(i64, i64, Option<String>, String)> = sqlx::query_as(
        "SELECT m.id, m.user_id, u.display_name, u.username
         FROM memberships m JOIN users u ON u.id = m.user_id
         WHERE m.group_id = ? AND m.status = 'active'
         ORDER BY m.id ASC",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(member_id, user_id, display_name, username)| MemberIdentity {
            member_id,
            user_id,
            display_name: display_name.unwrap_or(username),
        })
        .collect())
}

/// Computes net balances for every active member of a group: money paid on
/// non-deleted expenses plus confirmed settlements, minus computed expense
/// shares plus the settlement amounts received. The sum of every net balance
/// is exactly zero - a rounding residual, if any, lands on the
/// lowest-member-id active member so the invariant holds exactly rather than
/// approximately.
pub async fn compute_balances(pool: &SqlitePool, group_id: i64) -> AppResult<BalanceSummary> {
    let identities = member_identities(pool, group_id).await?;

    let mut paid: HashMap<i64, i64> = identities.iter().map(|m| (m.member_id, 0)).collect();
    let mut owed: HashMap<i64, i64> = identities.iter().map(|m| (m.member_id, 0)).collect();

    let payer_rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT ep.member_id, ep.amount FROM expense_payers ep
         JOIN expenses e ON e.id = ep.expense_id
         WHERE e.group_id = ? AND e.deleted_at IS NULL",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    for (member_id, amount) in payer_rows {
        *paid.entry(member_id).or_insert(0) += amount;
    }

    let share_rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT eim.member_id, eim.computed_share FROM expense_item_members eim
         JOIN expense_items ei ON ei.id = eim.item_id
         JOIN expenses e ON e.id = ei.expense_id
         WHERE e.group_id = ? AND e.deleted_at IS NULL",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    for (member_id, share) in share_rows {
        *owed.entry(member_id).or_insert(0) += share;
    }

    // A confirmed settlement is accounted for exactly like an expense the
    // payer fully paid for the payee: it increases the payer's "paid" and
    // the payee's "owed" by the settled amount, closing out that much debt.
    let settlement_rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        "SELECT payer_member_id, payee_member_id, amount FROM settlements
         WHERE group_id = ? AND status = 'confirmed'",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    for (payer_member_id, payee_member_id, amount) in settlement_rows {
        *paid.entry(payer_member_id).or_insert(0) += amount;
        *owed.entry(payee_member_id).or_insert(0) += amount;
    }

    let mut balances: Vec<MemberBalance> = identities
        .iter()
        .map(|m| {
            let total_paid = *paid.get(&m.member_id).unwrap_or(&0);
            let total_owed = *owed.get(&m.member_id).unwrap_or(&0);
            MemberBalance {
                member_id: m.member_id,
                user_id: m.user_id,
                display_name: m.display_name.clone(),
                total_paid,
                total_owed,
                net_balance: total_paid - total_owed,
            }
        })
        .collect();

    let residual: i64 = balances.iter().map(|b| b.net_balance).sum();
    if residual != 0 {
        if let Some(first) = balances.first_mut() {
            first.net_balance -= residual;
        }
    }

    let simplified = simplify(&balances);
    let pairwise = pairwise_debts(pool, group_id, &identities).await?;

    Ok(BalanceSummary {
        balances,
        simplified,
        pairwise,
    })
}

/// Greedy debt simplification: sort debtors and creditors by magnitude
/// descending and match largest against largest until both sides are
/// exhausted. This does not guarantee the theoretical minimum transaction
/// count in every case, but it is deterministic, cheap, and never produces
/// more edges than there are non-zero balances.
pub fn simplify(balances: &[MemberBalance]) -> Vec<DebtEdge> {
    // A member left at ±1 minor unit by residual reconciliation isn't a
    // real debt - it's the reconciliation rounding error. Ignore anyone
    // within that tolerance so they don't generate a spurious one-cent edge.
    const TOLERANCE: i64 = 1;

    let mut debtors: Vec<(i64, &str, i64)> = balances
        .iter()
        .filter(|b| b.net_balance < -TOLERANCE)
        .map(|b| (b.member_id, b.display_name.as_str(), -b.net_balance))
        .collect();

    let mut creditors: Vec<(i64, &str, i64)> = balances
        .iter()
        .filter(|b| b.net_balance > TOLERANCE)
        .map(|b| (b.member_id, b.display_name.as_str(), b.net_balance))
        .collect();

    debtors.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    creditors.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));

    let mut edges = Vec::new();
    let mut d_idx = 0;
    let mut c_idx = 0;

    while d_idx < debtors.len() && c_idx < creditors.len() {
        let (debtor_id, debtor_name, debtor_amount) = &mut debtors[d_idx];
        let (creditor_id, creditor_name, creditor_amount) = &mut creditors[c_idx];

        let transfer = (*debtor_amount).min(*creditor_amount);

        if transfer > 0 {
            edges.push(DebtEdge {
                from_member_id: *debtor_id,
                from_display_name: debtor_name.to_string(),
                to_member_id: *creditor_id,
                to_display_name: creditor_name.to_string(),
                amount: transfer,
            });
        }

        *debtor_amount -= transfer;
        *creditor_amount -= transfer;

        if *debtor_amount == 0 {
            d_idx += 1;
        }
        if *creditor_amount == 0 {
            c_idx += 1;
        }
    }

    edges
}

/// Unsimplified view: the direct net debt between every ordered pair of
/// members, derived straight from who paid for whom rather than through the
/// simplifier. Useful to show "why" a simplified edge exists.
async fn pairwise_debts(
    pool: &SqlitePool,
    group_id: i64,
    identities: &[MemberIdentity],
) -> AppResult<Vec<DebtEdge>> {
    let name_of: HashMap<i64, &str> = identities
        .iter()
        .map(|m| (m.member_id, m.display_name.as_str()))
        .collect();

    // net[a][b] = amount a paid toward b's share, across every expense and
    // confirmed settlement, minus what b paid toward a's share.
    let mut net: HashMap<(i64, i64), i64> = HashMap::new();

    // amount, subtotal, and payer amount let us attribute each ower's share
    // to a payer in proportion to what that payer contributed to the
    // expense - exact for the single-payer case, proportional otherwise.
    let expense_rows: Vec<(i64, i64, i64, i64, i64)> = sqlx::query_as(
        "SELECT ep.member_id AS payer, ep.amount AS payer_amount, e.subtotal,
                eim.member_id AS ower, eim.computed_share AS share
         FROM expenses e
         JOIN expense_payers ep ON ep.expense_id = e.id
         JOIN expense_items ei ON ei.expense_id = e.id
         JOIN expense_item_members eim ON eim.item_id = ei.id
         WHERE e.group_id = ? AND e.deleted_at IS NULL",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    for (payer, payer_amount, subtotal, ower, share) in expense_rows {
        if payer == ower || subtotal == 0 {
            continue;
        }
        let attributed = share * payer_amount / subtotal;
        *net.entry((payer, ower)).or_insert(0) += attributed;
    }

    let settlement_rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        "SELECT payer_member_id, payee_member_id, amount FROM settlements
         WHERE group_id = ? AND status = 'confirmed'",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    for (payer_member_id, payee_member_id, amount) in settlement_rows {
        *net.entry((payer_member_id, payee_member_id)).or_insert(0) += amount;
    }

    let mut edges = Vec::new();
    let mut seen: std::collections::HashSet<(i64, i64)> = std::collections::HashSet::new();

    for (&(a, b), _) in net.iter() {
        let pair = if a < b { (a, b) } else { (b, a) };
        if !seen.insert(pair) {
            continue;
        }
        let a_paid_for_b = *net.get(&(a, b)).unwrap_or(&0);
        let b_paid_for_a = *net.get(&(b, a)).unwrap_or(&0);
        let net_amount = a_paid_for_b - b_paid_for_a;

        if net_amount > 0 {
            edges.push(DebtEdge {
                from_member_id: b,
                from_display_name: name_of.get(&b).map(|s| s.to_string()).unwrap_or_default(),
                to_member_id: a,
                to_display_name: name_of.get(&a).map(|s| s.to_string()).unwrap_or_default(),
                amount: net_amount,
            });
        } else if net_amount < 0 {
            edges.push(DebtEdge {
                from_member_id: a,
                from_display_name: name_of.get(&a).map(|s| s.to_string()).unwrap_or_default(),
                to_member_id: b,
                to_display_name: name_of.get(&b).map(|s| s.to_string()).unwrap_or_default(),
                amount: -net_amount,
            });
        }
    }

    edges.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then(a.from_member_id.cmp(&b.from_member_id))
    });

    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(member_id: i64, name: &str, net: i64) -> MemberBalance {
        MemberBalance {
            member_id,
            user_id: member_id,
            display_name: name.to_string(),
            total_paid: net.max(0),
            total_owed: (-net).max(0),
            net_balance: net,
        }
    }

    #[test]
    fn simplify_two_party_settles_in_one_edge() {
        let balances = vec![balance(1, "Carl", 10_000), balance(2, "David", -10_000)];
        let edges = simplify(&balances);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from_member_id, 2);
        assert_eq!(edges[0].to_member_id, 1);
        assert_eq!(edges[0].amount, 10_000);
    }

    #[test]
    fn simplify_produces_zero_edges_when_all_balanced() {
        let balances = vec![balance(1, "Carl", 0), balance(2, "David", 0)];
        assert!(simplify(&balances).is_empty());
    }

    #[test]
    fn simplify_ignores_residual_off_by_one_balances() {
        // A net of +/-1 minor unit is reconciliation rounding error, not a
        // real debt, and must not produce a one-cent edge.
        let balances = vec![balance(1, "Carl", 1), balance(2, "David", -1)];
        assert!(simplify(&balances).is_empty());
    }

    #[test]
    fn simplify_still_nets_real_debt_alongside_a_residual_member() {
        let balances = vec![
            balance(1, "Creditor", 10_000),
            balance(2, "Debtor", -10_000),
            balance(3, "Residual", 0),
        ];
        let edges = simplify(&balances);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].amount, 10_000);
    }

    #[test]
    fn simplify_never_exceeds_one_edge_per_debtor() {
        // Three debtors owing one creditor: each debtor appears in exactly
        // one edge no matter how the creditor's capacity is split.
        let balances = vec![
            balance(1, "Creditor", 300),
            balance(2, "A", -100),
            balance(3, "B", -100),
            balance(4, "C", -100),
        ];
        let edges = simplify(&balances);
        assert_eq!(edges.len(), 3);
        let total: i64 = edges.iter().map(|e| e.amount).sum();
        assert_eq!(total, 300);
    }

    #[test]
    fn simplify_handles_many_to_many() {
        let balances = vec![
            balance(1, "A", 500),
            balance(2, "B", 300),
            balance(3, "C", -400),
            balance(4, "D", -400),
        ];
        let edges = simplify(&balances);
        let total: i64 = edges.iter().map(|e| e.amount).sum();
        assert_eq!(total, 800);
        for edge in &edges {
            assert!(edge.amount > 0);
        }
    }
}
