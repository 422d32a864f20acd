//! Demo finance database for a fresh checkout.

use crate::error::AgentError;
use crate::Result;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

/// A small construction-company book with due dates relative to today.
pub fn demo_database() -> Value {
    let now = Utc::now();
    let day = |offset: i64| (now + Duration::days(offset)).date_naive().to_string();

    json!({
        "company": {
            "name": "Shree Constructions Pvt Ltd",
            "gstin": "27AABCS1234F1Z5",
            "city": "Mumbai"
        },
        "metadata": {"version": "1.0", "created": now.to_rfc3339()},
        "bank_accounts": [
            {
                "account_id": "acc_001",
                "bank_name": "HDFC Bank",
                "account_number": "XXXX1234",
                "account_type": "Current",
                "balance": 2800000.0,
                "cc_limit": 5000000.0,
                "last_updated": day(0)
            },
            {
                "account_id": "acc_002",
                "bank_name": "State Bank of India",
                "account_number": "XXXX5678",
                "account_type": "Current",
                "balance": 650000.0,
                "last_updated": day(0)
            }
        ],
        "vendors": [
            {
                "vendor_id": "ven_001",
                "name": "UltraTech Cement",
                "gstin": "27AAACU1234A1Z1",
                "category": "Raw Material",
                "credit_days": 30,
                "is_active": true
            },
            {
                "vendor_id": "ven_002",
                "name": "Tata Steel",
                "gstin": "27AAACT2727Q1ZW",
                "category": "Raw Material",
                "credit_days": 45,
                "is_active": true
            },
            {
                "vendor_id": "ven_003",
                "name": "Sai Transport Co",
                "category": "Logistics",
                "credit_days": 15,
                "is_active": false
            }
        ],
        "clients": [
            {"client_id": "cli_001", "name": "Lodha Group", "payment_terms_days": 60},
            {"client_id": "cli_002", "name": "PWD Maharashtra", "payment_terms_days": 90}
        ],
        "projects": [
            {"project_id": "prj_001", "name": "Lodha Palava Tower C", "client_id": "cli_001", "status": "Active"},
            {"project_id": "prj_002", "name": "Thane Flyover Repairs", "client_id": "cli_002", "status": "Active"},
            {"project_id": "prj_003", "name": "Warehouse Bhiwandi", "client_id": "cli_001", "status": "Completed"}
        ],
        "payables": [
            {
                "invoice_id": "inv_p_001",
                "vendor_id": "ven_001",
                "vendor_name": "UltraTech Cement",
                "total_amount": 4500000.0,
                "net_payable": 4500000.0,
                "due_date": day(2),
                "status": "pending"
            },
            {
                "invoice_id": "inv_p_002",
                "vendor_id": "ven_002",
                "vendor_name": "Tata Steel",
                "total_amount": 1200000.0,
                "net_payable": 1176000.0,
                "due_date": day(-3),
                "status": "overdue"
            }
        ],
        "receivables": [
            {
                "invoice_id": "inv_r_001",
                "client_id": "cli_001",
                "client_name": "Lodha Group",
                "total_amount": 1500000.0,
                "balance_due": 1500000.0,
                "due_date": day(-5),
                "status": "overdue"
            },
            {
                "invoice_id": "inv_r_002",
                "client_id": "cli_002",
                "client_name": "PWD Maharashtra",
                "total_amount": 3200000.0,
                "balance_due": 2000000.0,
                "due_date": day(20),
                "status": "pending"
            }
        ],
        "cheque_register": [
            {"cheque_id": "chq_001", "type": "Issued", "party": "Tata Steel", "amount": 300000.0, "date": day(-1), "status": "Pending"},
            {"cheque_id": "chq_002", "type": "Received", "party": "Lodha Group", "amount": 500000.0, "date": day(-2), "status": "Pending"}
        ],
        "financial_goals": [
            {
                "goal_id": "goal_001",
                "title": "Keep 30 days of operating cash",
                "target_amount": 3500000.0,
                "deadline": day(90),
                "status": "active"
            }
        ]
    })
}

/// Write [`demo_database`] to `path`, creating parent directories. An
/// existing file is only replaced when `force` is set.
pub async fn seed_database(path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await? {
        return Err(AgentError::Store(format!(
            "{} already exists, pass --force to replace it",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(&demo_database())?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| AgentError::Store(format!("cannot write {}: {}", path.display(), e)))?;

    info!(path = %path.display(), "Demo finance database written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChequeDirection, FinanceStore, JsonFileStore};

    fn target() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("cfo-seed-{}", uuid::Uuid::new_v4()))
            .join("data")
            .join("database.json")
    }

    #[tokio::test]
    async fn test_seeded_database_opens_with_figures() {
        let path = target();
        seed_database(&path, false).await.unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.total_bank_balance().await.unwrap(), 3_450_000.0);
        assert_eq!(store.pending_payables().await.unwrap().len(), 2);
        assert_eq!(store.overdue_receivables().await.unwrap().len(), 1);
        assert_eq!(store.active_vendors().await.unwrap().len(), 2);
        assert_eq!(store.uncleared_cheques(ChequeDirection::Issued).await.unwrap().len(), 1);
        assert_eq!(store.financial_goals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_seed_keeps_existing_file_unless_forced() {
        let path = target();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, r#"{"company": {"name": "Mine"}}"#).await.unwrap();

        assert!(seed_database(&path, false).await.is_err());
        let kept = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(kept.company_info().await.unwrap().get("name"), Some(&json!("Mine")));

        seed_database(&path, true).await.unwrap();
        let seeded = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(
            seeded.company_info().await.unwrap().get("name"),
            Some(&json!("Shree Constructions Pvt Ltd"))
        );
    }
}
