//! Deterministic French narrative context fed to the model.
//!
//! Same snapshot in, same document out. Money is always rendered with
//! two decimals and the currency code appended; no symbols, so the
//! model never has to guess a locale.

use rust_decimal::Decimal;

use common::types::{TransactionRecord, User, WalletSummary};

use crate::activity::ActivityAggregate;

/// Two-decimal rendering used for every monetary value in the context.
pub fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn tx_line(tx: &TransactionRecord) -> String {
    let description = tx.description.as_deref().unwrap_or("Sans description");
    let mut line = format!(
        "- [{}] {}: {} {} - \"{}\" ({})",
        tx.status.as_str(),
        tx.kind.as_str(),
        money(tx.amount),
        tx.currency,
        description,
        tx.created_at.format("%d/%m/%Y"),
    );
    if let Some(score) = tx.fraud_score {
        if score > 0 {
            line.push_str(&format!(" ⚠️ Score fraude: {score}/100"));
        }
    }
    line
}

/// Build the full analysis context document for one user.
pub fn build_context(
    user: &User,
    wallets: &[WalletSummary],
    aggregate: &ActivityAggregate,
) -> String {
    let mut out = String::new();

    out.push_str("## INFORMATIONS UTILISATEUR\n");
    out.push_str(&format!("- Prénom: {}\n", user.display_first_name()));
    if let Some(last_name) = &user.last_name {
        out.push_str(&format!("- Nom: {last_name}\n"));
    }
    out.push_str(&format!(
        "- Membre depuis: {}\n\n",
        user.created_at.format("%d/%m/%Y")
    ));

    out.push_str(&format!("## PORTEFEUILLES ({})\n", wallets.len()));
    for wallet in wallets {
        out.push_str(&format!(
            "- {}: {} {}\n",
            wallet.name,
            money(wallet.balance),
            wallet.currency
        ));
    }
    out.push_str(&format!(
        "**Solde total: {} EUR**\n\n",
        money(aggregate.total_balance)
    ));

    out.push_str(&format!(
        "## ACTIVITÉ DES {} DERNIERS JOURS\n\n",
        aggregate.window_days
    ));

    out.push_str("### Vue d'ensemble\n");
    out.push_str(&format!(
        "- Nombre total de transactions: {}\n",
        aggregate.tx_count
    ));
    out.push_str(&format!(
        "- Transactions réussies: {}\n",
        aggregate.success_count
    ));
    out.push_str(&format!(
        "- Transactions en attente/vérification: {}\n",
        aggregate.pending_or_review_count
    ));
    out.push_str(&format!(
        "- Transactions bloquées: {}\n",
        aggregate.blocked_count
    ));
    match aggregate.avg_frequency_days() {
        Some(days) => out.push_str(&format!(
            "- Fréquence moyenne: 1 transaction tous les {days:.1} jours\n\n"
        )),
        None => out.push_str("- Fréquence moyenne: N/A\n\n"),
    }

    out.push_str("### Flux financiers\n");
    out.push_str("| Type | Nombre | Montant total |\n");
    out.push_str("|------|--------|---------------|\n");
    out.push_str(&format!(
        "| Dépôts | {} | +{} EUR |\n",
        aggregate.deposit_count,
        money(aggregate.total_deposits)
    ));
    out.push_str(&format!(
        "| Retraits | {} | -{} EUR |\n",
        aggregate.withdrawal_count,
        money(aggregate.total_withdrawals)
    ));
    out.push_str(&format!(
        "| Transferts envoyés | {} | {} EUR |\n",
        aggregate.transfer_count,
        money(aggregate.total_transfers)
    ));
    out.push_str(&format!(
        "\n**Bilan net sur {}j: {} EUR**\n\n",
        aggregate.window_days,
        money(aggregate.net_flow())
    ));

    let recent = aggregate.recent();
    out.push_str(&format!(
        "### Détail des {} dernières transactions\n",
        recent.len()
    ));
    for tx in recent {
        out.push_str(&tx_line(tx));
        out.push('\n');
    }
    out.push('\n');

    if aggregate.high_risk.is_empty() {
        out.push_str("### ✅ SÉCURITÉ\n");
        out.push_str("Aucune transaction suspecte détectée.\n");
    } else {
        out.push_str(&format!(
            "### ⚠️ ALERTES SÉCURITÉ ({} transaction(s) à risque)\n",
            aggregate.high_risk.len()
        ));
        for tx in &aggregate.high_risk {
            out.push_str(&tx_line(tx));
            out.push('\n');
        }
    }

    out
}

/// Condensed context for persona generation. A handful of key figures
/// is enough to pick an archetype and keeps the prompt small.
pub fn condensed_context(user: &User, aggregate: &ActivityAggregate) -> String {
    let mut out = String::new();
    out.push_str(&format!("Utilisateur: {}\n", user.display_first_name()));
    out.push_str(&format!(
        "Solde total: {} EUR\n",
        money(aggregate.total_balance)
    ));
    out.push_str(&format!(
        "Transactions ({}j): {}\n",
        aggregate.window_days, aggregate.tx_count
    ));
    out.push_str(&format!(
        "Dépôts: {} (+{} EUR)\n",
        aggregate.deposit_count,
        money(aggregate.total_deposits)
    ));
    out.push_str(&format!(
        "Retraits: {} (-{} EUR)\n",
        aggregate.withdrawal_count,
        money(aggregate.total_withdrawals)
    ));
    out.push_str(&format!(
        "Transferts envoyés: {} ({} EUR)\n",
        aggregate.transfer_count,
        money(aggregate.total_transfers)
    ));
    out.push_str(&format!(
        "Transactions à risque: {}\n",
        aggregate.high_risk.len()
    ));
    out.push_str(&format!("Bilan net: {} EUR\n", money(aggregate.net_flow())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityAggregate;
    use chrono::{TimeZone, Utc};
    use common::types::{TxKind, TxStatus};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "marie@example.com".to_string(),
            first_name: Some("Marie".to_string()),
            last_name: Some("Dupont".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
        }
    }

    fn tx(id: &str, status: TxStatus, fraud_score: Option<i64>) -> common::types::TransactionRecord {
        common::types::TransactionRecord {
            id: id.to_string(),
            kind: TxKind::Deposit,
            status,
            amount: dec("42.5"),
            currency: "EUR".to_string(),
            description: Some("Salaire".to_string()),
            fraud_score,
            is_inter_wallet: false,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn wallets() -> Vec<WalletSummary> {
        vec![WalletSummary {
            id: "w1".to_string(),
            name: "Principal".to_string(),
            balance: dec("1234.5"),
            currency: "EUR".to_string(),
        }]
    }

    #[test]
    fn test_build_context_is_deterministic() {
        let user = user();
        let wallets = wallets();
        let agg = ActivityAggregate::compute(&wallets, vec![tx("t1", TxStatus::Success, None)], 30);
        assert_eq!(
            build_context(&user, &wallets, &agg),
            build_context(&user, &wallets, &agg)
        );
    }

    #[test]
    fn test_build_context_sections_and_money_format() {
        let user = user();
        let wallets = wallets();
        let agg = ActivityAggregate::compute(&wallets, vec![tx("t1", TxStatus::Success, None)], 30);
        let doc = build_context(&user, &wallets, &agg);

        assert!(doc.contains("## INFORMATIONS UTILISATEUR"));
        assert!(doc.contains("- Prénom: Marie"));
        assert!(doc.contains("- Membre depuis: 15/03/2024"));
        assert!(doc.contains("## PORTEFEUILLES (1)"));
        // Two decimals, currency code appended.
        assert!(doc.contains("- Principal: 1234.50 EUR"));
        assert!(doc.contains("**Solde total: 1234.50 EUR**"));
        assert!(doc.contains("| Dépôts | 1 | +42.50 EUR |"));
        assert!(doc.contains("**Bilan net sur 30j: 42.50 EUR**"));
        assert!(doc.contains("[SUCCESS] DEPOSIT: 42.50 EUR - \"Salaire\""));
    }

    #[test]
    fn test_build_context_no_alerts_section() {
        let user = user();
        let agg = ActivityAggregate::compute(&[], vec![tx("t1", TxStatus::Success, Some(10))], 30);
        let doc = build_context(&user, &[], &agg);
        // Below the alert threshold: annotated in the detail lines, but
        // no security-alert block.
        assert!(doc.contains("Aucune transaction suspecte détectée."));
        assert!(!doc.contains("ALERTES SÉCURITÉ"));
        assert!(doc.contains("⚠️ Score fraude: 10/100"));
    }

    #[test]
    fn test_build_context_flags_high_risk() {
        let user = user();
        let agg = ActivityAggregate::compute(&[], vec![tx("t1", TxStatus::Review, Some(85))], 30);
        let doc = build_context(&user, &[], &agg);
        assert!(doc.contains("### ⚠️ ALERTES SÉCURITÉ (1 transaction(s) à risque)"));
        assert!(doc.contains("⚠️ Score fraude: 85/100"));
    }

    #[test]
    fn test_build_context_quotes_at_most_twenty() {
        let user = user();
        let txs: Vec<_> = (0..50)
            .map(|i| tx(&format!("t{i}"), TxStatus::Success, None))
            .collect();
        let agg = ActivityAggregate::compute(&[], txs, 30);
        let doc = build_context(&user, &[], &agg);
        assert!(doc.contains("- Nombre total de transactions: 50"));
        assert!(doc.contains("### Détail des 20 dernières transactions"));
        assert_eq!(doc.matches("[SUCCESS] DEPOSIT:").count(), 20);
    }

    #[test]
    fn test_build_context_empty_window() {
        let user = User {
            first_name: None,
            last_name: None,
            ..user()
        };
        let agg = ActivityAggregate::compute(&[], vec![], 30);
        let doc = build_context(&user, &[], &agg);
        assert!(doc.contains("- Prénom: Utilisateur"));
        assert!(!doc.contains("- Nom:"));
        assert!(doc.contains("- Fréquence moyenne: N/A"));
        assert!(doc.contains("**Bilan net sur 30j: 0.00 EUR**"));
    }

    #[test]
    fn test_condensed_context_key_figures() {
        let user = user();
        let wallets = wallets();
        let agg = ActivityAggregate::compute(&wallets, vec![tx("t1", TxStatus::Success, None)], 30);
        let doc = condensed_context(&user, &agg);
        assert!(doc.contains("Utilisateur: Marie"));
        assert!(doc.contains("Solde total: 1234.50 EUR"));
        assert!(doc.contains("Transactions (30j): 1"));
        assert!(doc.contains("Bilan net: 42.50 EUR"));
    }

    #[test]
    fn test_money_rounds_to_two_decimals() {
        assert_eq!(money(dec("10")), "10.00");
        assert_eq!(money(dec("10.555")), "10.56");
        assert_eq!(money(dec("-3.1")), "-3.10");
    }
}
