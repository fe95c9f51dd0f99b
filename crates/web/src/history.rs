//! Unified payment history over deposits (payment intents) and
//! cashouts (payouts).
//!
//! Single-kind requests paginate in SQL. Combined requests fetch up to
//! [`COMBINED_FETCH_CAP`] rows per source, merge, sort newest first and
//! slice the page in memory; beyond the cap the merged ordering would
//! be approximate, which is acceptable for a history view.

use anyhow::Result;
use serde::Serialize;

use common::db::AsyncDb;
use common::store;
use common::types::{mask_destination, PaymentKind, PaymentRecord};

pub const COMBINED_FETCH_CAP: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug)]
pub struct HistoryView {
    pub payments: Vec<PaymentRecord>,
    pub pagination: Pagination,
}

pub fn total_pages(total: i64, limit: u32) -> i64 {
    if limit == 0 {
        return 0;
    }
    (total + i64::from(limit) - 1) / i64::from(limit)
}

/// Merge two pre-sorted source lists, newest first, then slice one page.
/// Ties keep the left (deposit) side first; the sort is stable.
fn merge_and_slice(
    deposits: Vec<PaymentRecord>,
    payouts: Vec<PaymentRecord>,
    skip: u32,
    limit: u32,
) -> Vec<PaymentRecord> {
    let mut all = deposits;
    all.extend(payouts);
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    all.into_iter()
        .skip(skip as usize)
        .take(limit as usize)
        .collect()
}

/// Raw payout destinations never leave this module unmasked.
fn mask_destinations(payments: &mut [PaymentRecord]) {
    for payment in payments {
        if let Some(destination) = payment.destination.take() {
            payment.destination = Some(mask_destination(&destination));
        }
    }
}

pub async fn fetch_history(
    db: &AsyncDb,
    user_id: &str,
    kind: Option<PaymentKind>,
    status: Option<&str>,
    page: u32,
    limit: u32,
) -> Result<HistoryView> {
    anyhow::ensure!(page >= 1 && limit >= 1, "page and limit must be positive");
    // Both operands are caller-controlled; the product must not wrap.
    let Some(skip) = (page - 1).checked_mul(limit) else {
        anyhow::bail!("pagination window out of range: page={page} limit={limit}");
    };
    let status_owned = status.map(str::to_string);

    let (mut payments, total) = match kind {
        Some(PaymentKind::Deposit) => {
            let (uid_rows, uid_count) = (user_id.to_string(), user_id.to_string());
            let (status_rows, status_count) = (status_owned.clone(), status_owned);
            tokio::try_join!(
                db.call_named("deposits_page", move |conn| {
                    store::deposits_for_user(conn, &uid_rows, status_rows.as_deref(), skip, limit)
                }),
                db.call_named("deposit_count", move |conn| {
                    store::deposit_count(conn, &uid_count, status_count.as_deref())
                }),
            )?
        }
        Some(PaymentKind::Cashout) => {
            let (uid_rows, uid_count) = (user_id.to_string(), user_id.to_string());
            let (status_rows, status_count) = (status_owned.clone(), status_owned);
            tokio::try_join!(
                db.call_named("payouts_page", move |conn| {
                    store::payouts_for_user(conn, &uid_rows, status_rows.as_deref(), skip, limit)
                }),
                db.call_named("payout_count", move |conn| {
                    store::payout_count(conn, &uid_count, status_count.as_deref())
                }),
            )?
        }
        None => {
            let (uid_d, uid_p, uid_dc, uid_pc) = (
                user_id.to_string(),
                user_id.to_string(),
                user_id.to_string(),
                user_id.to_string(),
            );
            let (st_d, st_p, st_dc, st_pc) = (
                status_owned.clone(),
                status_owned.clone(),
                status_owned.clone(),
                status_owned,
            );
            let (deposits, payouts, deposit_total, payout_total) = tokio::try_join!(
                db.call_named("deposits_page", move |conn| {
                    store::deposits_for_user(conn, &uid_d, st_d.as_deref(), 0, COMBINED_FETCH_CAP)
                }),
                db.call_named("payouts_page", move |conn| {
                    store::payouts_for_user(conn, &uid_p, st_p.as_deref(), 0, COMBINED_FETCH_CAP)
                }),
                db.call_named("deposit_count", move |conn| {
                    store::deposit_count(conn, &uid_dc, st_dc.as_deref())
                }),
                db.call_named("payout_count", move |conn| {
                    store::payout_count(conn, &uid_pc, st_pc.as_deref())
                }),
            )?;
            (
                merge_and_slice(deposits, payouts, skip, limit),
                deposit_total + payout_total,
            )
        }
    };

    mask_destinations(&mut payments);

    Ok(HistoryView {
        payments,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total_pages(total, limit),
        },
    })
}
