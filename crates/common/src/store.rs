//! Typed read queries against the wallet store. All read-only.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::types::{
    PaymentKind, PaymentRecord, TransactionRecord, TxKind, TxStatus, User, WalletRef,
    WalletSummary,
};

fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("invalid amount in store: {raw}"))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("invalid timestamp in store: {raw}"))
}

fn parse_metadata(raw: Option<String>) -> Result<serde_json::Value> {
    match raw {
        None => Ok(serde_json::Value::Null),
        Some(s) => serde_json::from_str(&s).with_context(|| "invalid metadata JSON in store"),
    }
}

/// Resolve a bearer session token to its user. Expired sessions resolve
/// to `None`, same as unknown tokens.
pub fn user_for_session(conn: &Connection, token: &str, now: DateTime<Utc>) -> Result<Option<User>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.first_name, u.last_name, u.created_at
         FROM sessions s JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1 AND s.expires_at > ?2",
    )?;
    let mut rows = stmt.query_map(
        rusqlite::params![token, now.to_rfc3339()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    )?;
    match rows.next().transpose()? {
        None => Ok(None),
        Some((id, email, first_name, last_name, created_at)) => Ok(Some(User {
            id,
            email,
            first_name,
            last_name,
            created_at: parse_ts(&created_at)?,
        })),
    }
}

/// All wallets owned by a user. Wallet counts are small; no pagination.
pub fn wallets_for_user(conn: &Connection, user_id: &str) -> Result<Vec<WalletSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, balance, currency FROM wallets WHERE user_id = ?1 ORDER BY name",
    )?;
    let raw: Vec<(String, String, String, String)> = stmt
        .query_map(rusqlite::params![user_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?
        .collect::<std::result::Result<_, _>>()?;
    raw.into_iter()
        .map(|(id, name, balance, currency)| {
            Ok(WalletSummary {
                id,
                name,
                balance: parse_amount(&balance)?,
                currency,
            })
        })
        .collect()
}

/// Transactions where the user owns either side, newest first, capped.
///
/// The cap bounds worst-case narrative size and query cost; activity
/// older or lower-ranked within the window is silently excluded once
/// more than `cap` rows exist.
pub fn transactions_since(
    conn: &Connection,
    user_id: &str,
    cutoff: DateTime<Utc>,
    cap: u32,
) -> Result<Vec<TransactionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.type, t.status, t.amount, t.currency, t.description,
                t.fraud_score, t.is_inter_wallet, t.created_at
         FROM transactions t
         WHERE (t.source_wallet_id IN (SELECT id FROM wallets WHERE user_id = ?1)
             OR t.destination_wallet_id IN (SELECT id FROM wallets WHERE user_id = ?1))
           AND t.created_at >= ?2
         ORDER BY t.created_at DESC
         LIMIT ?3",
    )?;
    type Row = (
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        Option<i64>,
        bool,
        String,
    );
    let raw: Vec<Row> = stmt
        .query_map(
            rusqlite::params![user_id, cutoff.to_rfc3339(), cap],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            },
        )?
        .collect::<std::result::Result<_, _>>()?;
    raw.into_iter()
        .map(
            |(id, kind, status, amount, currency, description, fraud_score, inter, created_at)| {
                Ok(TransactionRecord {
                    id,
                    kind: TxKind::parse(&kind)
                        .ok_or_else(|| anyhow!("unknown transaction type: {kind}"))?,
                    status: TxStatus::parse(&status)
                        .ok_or_else(|| anyhow!("unknown transaction status: {status}"))?,
                    amount: parse_amount(&amount)?,
                    currency,
                    description,
                    fraud_score,
                    is_inter_wallet: inter,
                    created_at: parse_ts(&created_at)?,
                })
            },
        )
        .collect()
}

type PaymentRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

fn payment_rows(
    conn: &Connection,
    sql: &str,
    user_id: &str,
    status: Option<&str>,
    skip: u32,
    take: u32,
) -> Result<Vec<PaymentRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, status, take, skip], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
            ))
        })?
        .collect::<std::result::Result<_, _>>()?;
    Ok(rows)
}

fn into_payment(kind: PaymentKind, row: PaymentRow) -> Result<PaymentRecord> {
    let (
        id,
        amount,
        currency,
        status,
        metadata,
        created_at,
        updated_at,
        wallet_id,
        wallet_name,
        method,
        destination,
    ) = row;
    Ok(PaymentRecord {
        id,
        kind,
        amount: parse_amount(&amount)?,
        currency,
        status,
        method,
        destination,
        wallet: WalletRef {
            id: wallet_id,
            name: wallet_name,
        },
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        metadata: parse_metadata(metadata)?,
    })
}

/// Deposits (payment intents) for a user, newest first. `destination`
/// and `method` are absent on this source.
pub fn deposits_for_user(
    conn: &Connection,
    user_id: &str,
    status: Option<&str>,
    skip: u32,
    take: u32,
) -> Result<Vec<PaymentRecord>> {
    let rows = payment_rows(
        conn,
        "SELECT p.id, p.amount, p.currency, p.status, p.metadata,
                p.created_at, p.updated_at, w.id, w.name, NULL, NULL
         FROM payment_intents p JOIN wallets w ON w.id = p.wallet_id
         WHERE p.user_id = ?1 AND (?2 IS NULL OR p.status = ?2)
         ORDER BY p.created_at DESC
         LIMIT ?3 OFFSET ?4",
        user_id,
        status,
        skip,
        take,
    )?;
    rows.into_iter()
        .map(|row| into_payment(PaymentKind::Deposit, row))
        .collect()
}

/// Cashouts (payouts) for a user, newest first. The destination column
/// comes back RAW here; callers must mask before the record leaves the
/// service boundary.
pub fn payouts_for_user(
    conn: &Connection,
    user_id: &str,
    status: Option<&str>,
    skip: u32,
    take: u32,
) -> Result<Vec<PaymentRecord>> {
    let rows = payment_rows(
        conn,
        "SELECT p.id, p.amount, p.currency, p.status, p.metadata,
                p.created_at, p.updated_at, w.id, w.name, p.method, p.destination
         FROM payouts p JOIN wallets w ON w.id = p.wallet_id
         WHERE p.user_id = ?1 AND (?2 IS NULL OR p.status = ?2)
         ORDER BY p.created_at DESC
         LIMIT ?3 OFFSET ?4",
        user_id,
        status,
        skip,
        take,
    )?;
    rows.into_iter()
        .map(|row| into_payment(PaymentKind::Cashout, row))
        .collect()
}

pub fn deposit_count(conn: &Connection, user_id: &str, status: Option<&str>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM payment_intents
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)",
        rusqlite::params![user_id, status],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

pub fn payout_count(conn: &Connection, user_id: &str, status: Option<&str>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM payouts
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)",
        rusqlite::params![user_id, status],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Duration;

    fn seed_user(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO users (id, email, first_name, last_name, created_at)
             VALUES (?1, ?1 || '@example.com', 'Marie', 'Martin', '2023-01-15T09:00:00+00:00')",
            rusqlite::params![id],
        )
        .unwrap();
    }

    fn seed_wallet(conn: &Connection, id: &str, user_id: &str, balance: &str) {
        conn.execute(
            "INSERT INTO wallets (id, user_id, name, balance, currency)
             VALUES (?1, ?2, 'Wallet ' || ?1, ?3, 'EUR')",
            rusqlite::params![id, user_id, balance],
        )
        .unwrap();
    }

    fn seed_tx(conn: &Connection, id: &str, wallet: &str, kind: &str, created_at: &str) {
        conn.execute(
            "INSERT INTO transactions
                (id, type, status, amount, currency, description, fraud_score,
                 is_inter_wallet, source_wallet_id, created_at)
             VALUES (?1, ?2, 'SUCCESS', '10.00', 'EUR', NULL, NULL, 0, ?3, ?4)",
            rusqlite::params![id, kind, wallet, created_at],
        )
        .unwrap();
    }

    #[test]
    fn test_wallets_for_user_parses_balance() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_wallet(&db.conn, "w1", "u1", "1250.75");
        let wallets = wallets_for_user(&db.conn, "u1").unwrap();
        assert_eq!(wallets.len(), 1);
        assert_eq!(wallets[0].balance.to_string(), "1250.75");
    }

    #[test]
    fn test_transactions_since_filters_window_and_caps() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_wallet(&db.conn, "w1", "u1", "0");
        seed_tx(&db.conn, "t-old", "w1", "DEPOSIT", "2024-01-01T00:00:00+00:00");
        seed_tx(&db.conn, "t-new", "w1", "DEPOSIT", "2024-03-01T00:00:00+00:00");
        let cutoff = "2024-02-01T00:00:00+00:00"
            .parse::<DateTime<Utc>>()
            .unwrap();
        let txs = transactions_since(&db.conn, "u1", cutoff, 50).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, "t-new");
    }

    #[test]
    fn test_transactions_since_orders_descending() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_wallet(&db.conn, "w1", "u1", "0");
        for (id, ts) in [
            ("t1", "2024-03-01T10:00:00+00:00"),
            ("t2", "2024-03-03T10:00:00+00:00"),
            ("t3", "2024-03-02T10:00:00+00:00"),
        ] {
            seed_tx(&db.conn, id, "w1", "DEPOSIT", ts);
        }
        let cutoff = "2024-01-01T00:00:00+00:00"
            .parse::<DateTime<Utc>>()
            .unwrap();
        let txs = transactions_since(&db.conn, "u1", cutoff, 50).unwrap();
        let ids: Vec<&str> = txs.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t1"]);
    }

    #[test]
    fn test_transactions_since_excludes_other_users() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_user(&db.conn, "u2");
        seed_wallet(&db.conn, "w1", "u1", "0");
        seed_wallet(&db.conn, "w2", "u2", "0");
        seed_tx(&db.conn, "mine", "w1", "DEPOSIT", "2024-03-01T00:00:00+00:00");
        seed_tx(&db.conn, "theirs", "w2", "DEPOSIT", "2024-03-01T00:00:00+00:00");
        let cutoff = "2024-01-01T00:00:00+00:00"
            .parse::<DateTime<Utc>>()
            .unwrap();
        let txs = transactions_since(&db.conn, "u1", cutoff, 50).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, "mine");
    }

    #[test]
    fn test_user_for_session_rejects_expired() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        let now = Utc::now();
        let expired = (now - Duration::hours(1)).to_rfc3339();
        let valid = (now + Duration::hours(1)).to_rfc3339();
        db.conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES ('dead', 'u1', ?1)",
                rusqlite::params![expired],
            )
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES ('live', 'u1', ?1)",
                rusqlite::params![valid],
            )
            .unwrap();
        assert!(user_for_session(&db.conn, "dead", now).unwrap().is_none());
        assert!(user_for_session(&db.conn, "missing", now).unwrap().is_none());
        let user = user_for_session(&db.conn, "live", now).unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.display_first_name(), "Marie");
    }

    #[test]
    fn test_payout_queries_keep_raw_destination() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_wallet(&db.conn, "w1", "u1", "0");
        db.conn
            .execute(
                "INSERT INTO payouts
                    (id, user_id, wallet_id, amount, currency, status, method,
                     destination, metadata, created_at, updated_at)
                 VALUES ('po1', 'u1', 'w1', '40.00', 'EUR', 'paid', 'bank_transfer',
                         'FR7630006000011234567890189', NULL,
                         '2024-03-01T00:00:00+00:00', '2024-03-01T00:00:00+00:00')",
                [],
            )
            .unwrap();
        let payouts = payouts_for_user(&db.conn, "u1", None, 0, 10).unwrap();
        assert_eq!(payouts.len(), 1);
        // Raw at this layer; masking happens at the view boundary.
        assert_eq!(
            payouts[0].destination.as_deref(),
            Some("FR7630006000011234567890189")
        );
        assert_eq!(payouts[0].kind, PaymentKind::Cashout);
    }

    #[test]
    fn test_deposit_count_honors_status_filter() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_wallet(&db.conn, "w1", "u1", "0");
        for (id, status) in [("pi1", "succeeded"), ("pi2", "pending"), ("pi3", "succeeded")] {
            db.conn
                .execute(
                    "INSERT INTO payment_intents
                        (id, user_id, wallet_id, amount, currency, status, metadata,
                         created_at, updated_at)
                     VALUES (?1, 'u1', 'w1', '10.00', 'EUR', ?2, NULL,
                             '2024-03-01T00:00:00+00:00', '2024-03-01T00:00:00+00:00')",
                    rusqlite::params![id, status],
                )
                .unwrap();
        }
        assert_eq!(deposit_count(&db.conn, "u1", None).unwrap(), 3);
        assert_eq!(
            deposit_count(&db.conn, "u1", Some("succeeded")).unwrap(),
            2
        );
        assert_eq!(deposit_count(&db.conn, "u1", Some("failed")).unwrap(), 0);
    }

    #[test]
    fn test_deposits_pagination_skip_take() {
        let db = Database::open(":memory:").unwrap();
        seed_user(&db.conn, "u1");
        seed_wallet(&db.conn, "w1", "u1", "0");
        for i in 1..=5 {
            db.conn
                .execute(
                    "INSERT INTO payment_intents
                        (id, user_id, wallet_id, amount, currency, status, metadata,
                         created_at, updated_at)
                     VALUES (?1, 'u1', 'w1', '10.00', 'EUR', 'succeeded', NULL, ?2, ?2)",
                    rusqlite::params![
                        format!("pi{i}"),
                        format!("2024-03-0{i}T00:00:00+00:00")
                    ],
                )
                .unwrap();
        }
        let page = deposits_for_user(&db.conn, "u1", None, 2, 2).unwrap();
        let ids: Vec<&str> = page.iter().map(|p| p.id.as_str()).collect();
        // Newest first: pi5 pi4 | pi3 pi2 | pi1
        assert_eq!(ids, vec!["pi3", "pi2"]);
    }
}
