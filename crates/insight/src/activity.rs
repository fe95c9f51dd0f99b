//! Read-side aggregation of a user's recent wallet activity.
//!
//! The wallet list and the transaction window are fetched concurrently,
//! then folded into an [`ActivityAggregate`]. All numbers downstream of
//! this module (narrative, persona context) come from here.

use anyhow::Result;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use common::db::AsyncDb;
use common::store;
use common::types::{TransactionRecord, TxKind, TxStatus, WalletSummary};

/// Look-back window for the activity snapshot.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Hard cap on transactions fetched for one snapshot, newest first.
pub const TRANSACTION_FETCH_CAP: u32 = 50;

/// Transactions quoted verbatim in the narrative detail section.
pub const VERBATIM_TRANSACTION_LIMIT: usize = 20;

/// Summary statistics over one user's recent activity.
///
/// Counts cover every fetched transaction; the per-kind totals cover
/// successful transactions only, so failed or blocked movements never
/// inflate the flow figures.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityAggregate {
    pub window_days: i64,
    pub total_balance: Decimal,
    pub tx_count: usize,
    pub success_count: usize,
    pub pending_or_review_count: usize,
    pub blocked_count: usize,
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub transfer_count: usize,
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub total_transfers: Decimal,
    pub high_risk: Vec<TransactionRecord>,
    /// The fetched window, newest first.
    pub transactions: Vec<TransactionRecord>,
}

impl ActivityAggregate {
    pub fn compute(
        wallets: &[WalletSummary],
        transactions: Vec<TransactionRecord>,
        window_days: i64,
    ) -> Self {
        let total_balance = wallets.iter().map(|w| w.balance).sum();

        let mut success_count = 0;
        let mut pending_or_review_count = 0;
        let mut blocked_count = 0;
        let mut deposit_count = 0;
        let mut withdrawal_count = 0;
        let mut transfer_count = 0;
        let mut total_deposits = Decimal::ZERO;
        let mut total_withdrawals = Decimal::ZERO;
        let mut total_transfers = Decimal::ZERO;

        for tx in &transactions {
            match tx.status {
                TxStatus::Success => success_count += 1,
                TxStatus::Pending | TxStatus::Review => pending_or_review_count += 1,
                TxStatus::Blocked => blocked_count += 1,
            }
            if tx.status == TxStatus::Success {
                match tx.kind {
                    TxKind::Deposit => {
                        deposit_count += 1;
                        total_deposits += tx.amount;
                    }
                    TxKind::Withdrawal => {
                        withdrawal_count += 1;
                        total_withdrawals += tx.amount;
                    }
                    TxKind::Transfer => {
                        transfer_count += 1;
                        total_transfers += tx.amount;
                    }
                }
            }
        }

        let high_risk: Vec<TransactionRecord> = transactions
            .iter()
            .filter(|tx| tx.is_high_risk())
            .cloned()
            .collect();

        Self {
            window_days,
            total_balance,
            tx_count: transactions.len(),
            success_count,
            pending_or_review_count,
            blocked_count,
            deposit_count,
            withdrawal_count,
            transfer_count,
            total_deposits,
            total_withdrawals,
            total_transfers,
            high_risk,
            transactions,
        }
    }

    /// Deposits minus withdrawals minus outgoing transfers, over the
    /// successful transactions in the window.
    pub fn net_flow(&self) -> Decimal {
        self.total_deposits - self.total_withdrawals - self.total_transfers
    }

    /// Average days between transactions, `None` when the window is empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_frequency_days(&self) -> Option<f64> {
        if self.tx_count == 0 {
            return None;
        }
        Some(self.window_days as f64 / self.tx_count as f64)
    }

    /// Newest transactions eligible for verbatim quotation.
    pub fn recent(&self) -> &[TransactionRecord] {
        let end = self.transactions.len().min(VERBATIM_TRANSACTION_LIMIT);
        &self.transactions[..end]
    }
}

/// Wallets plus the aggregate computed over them.
#[derive(Debug, Clone)]
pub struct ActivitySnapshot {
    pub wallets: Vec<WalletSummary>,
    pub aggregate: ActivityAggregate,
}

/// Fetch wallets and the recent transaction window concurrently and
/// fold them into a snapshot.
pub async fn aggregate_activity(
    db: &AsyncDb,
    user_id: &str,
    window_days: i64,
) -> Result<ActivitySnapshot> {
    let cutoff = Utc::now() - Duration::days(window_days);
    let uid_wallets = user_id.to_string();
    let uid_txs = user_id.to_string();

    let (wallets, transactions) = tokio::try_join!(
        db.call_named("wallets_for_user", move |conn| {
            store::wallets_for_user(conn, &uid_wallets)
        }),
        db.call_named("transactions_since", move |conn| {
            store::transactions_since(conn, &uid_txs, cutoff, TRANSACTION_FETCH_CAP)
        }),
    )?;

    let aggregate = ActivityAggregate::compute(&wallets, transactions, window_days);
    Ok(ActivitySnapshot { wallets, aggregate })
}
