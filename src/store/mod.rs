//! Finance data store
//!
//! Read accessors return plain key-value records; the reasoning layer only
//! folds them into prompts. Writes are idempotent upserts keyed by each
//! collection's id field.

use crate::error::AgentError;
use crate::models::Record;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub mod format;
pub mod seed;

pub use format::{
    format_currency, format_master, format_records, format_summary, format_uncleared_cheques,
    number,
};

/// Top-level collections of the finance database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    BankAccounts,
    Vendors,
    Clients,
    Projects,
    Payables,
    Receivables,
    ChequeRegister,
    FinancialGoals,
}

impl Collection {
    pub fn key(self) -> &'static str {
        match self {
            Collection::BankAccounts => "bank_accounts",
            Collection::Vendors => "vendors",
            Collection::Clients => "clients",
            Collection::Projects => "projects",
            Collection::Payables => "payables",
            Collection::Receivables => "receivables",
            Collection::ChequeRegister => "cheque_register",
            Collection::FinancialGoals => "financial_goals",
        }
    }

    /// Field that identifies a record for upserts and lookups.
    pub fn id_field(self) -> &'static str {
        match self {
            Collection::BankAccounts => "account_id",
            Collection::Vendors => "vendor_id",
            Collection::Clients => "client_id",
            Collection::Projects => "project_id",
            Collection::Payables | Collection::Receivables => "invoice_id",
            Collection::ChequeRegister => "cheque_id",
            Collection::FinancialGoals => "goal_id",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChequeDirection {
    Issued,
    Received,
}

/// Trait for finance data access
#[async_trait]
pub trait FinanceStore: Send + Sync {
    async fn company_info(&self) -> Result<Record>;
    async fn metadata(&self) -> Result<Record>;
    async fn records(&self, collection: Collection) -> Result<Vec<Record>>;

    /// Insert `record`, or merge it into the record with the same id.
    async fn upsert(&self, collection: Collection, record: Record) -> Result<UpsertOutcome>;

    /// Set an account balance. `false` when the account is unknown.
    async fn update_bank_balance(&self, account_id: &str, balance: f64) -> Result<bool>;

    async fn bank_accounts(&self) -> Result<Vec<Record>> {
        self.records(Collection::BankAccounts).await
    }

    async fn vendors(&self) -> Result<Vec<Record>> {
        self.records(Collection::Vendors).await
    }

    async fn clients(&self) -> Result<Vec<Record>> {
        self.records(Collection::Clients).await
    }

    async fn projects(&self) -> Result<Vec<Record>> {
        self.records(Collection::Projects).await
    }

    async fn payables(&self) -> Result<Vec<Record>> {
        self.records(Collection::Payables).await
    }

    async fn receivables(&self) -> Result<Vec<Record>> {
        self.records(Collection::Receivables).await
    }

    async fn cheque_register(&self) -> Result<Vec<Record>> {
        self.records(Collection::ChequeRegister).await
    }

    async fn financial_goals(&self) -> Result<Vec<Record>> {
        self.records(Collection::FinancialGoals).await
    }

    async fn find(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let id_field = collection.id_field();
        Ok(self
            .records(collection)
            .await?
            .into_iter()
            .find(|r| text_field(r, id_field) == Some(id)))
    }

    async fn active_vendors(&self) -> Result<Vec<Record>> {
        Ok(self
            .vendors()
            .await?
            .into_iter()
            .filter(|v| v.get("is_active").and_then(Value::as_bool).unwrap_or(true))
            .collect())
    }

    async fn active_projects(&self) -> Result<Vec<Record>> {
        Ok(self
            .projects()
            .await?
            .into_iter()
            .filter(|p| status_is(p, "active"))
            .collect())
    }

    async fn pending_payables(&self) -> Result<Vec<Record>> {
        Ok(pending(self.payables().await?))
    }

    async fn overdue_payables(&self) -> Result<Vec<Record>> {
        Ok(overdue(self.payables().await?))
    }

    async fn pending_receivables(&self) -> Result<Vec<Record>> {
        Ok(pending(self.receivables().await?))
    }

    async fn overdue_receivables(&self) -> Result<Vec<Record>> {
        Ok(overdue(self.receivables().await?))
    }

    async fn uncleared_cheques(&self, direction: ChequeDirection) -> Result<Vec<Record>> {
        Ok(uncleared(&self.cheque_register().await?, direction))
    }

    async fn vendor_by_name(&self, name: &str) -> Result<Option<Record>> {
        Ok(by_name(self.vendors().await?, name))
    }

    async fn client_by_name(&self, name: &str) -> Result<Option<Record>> {
        Ok(by_name(self.clients().await?, name))
    }

    async fn total_bank_balance(&self) -> Result<f64> {
        Ok(sum_field(&self.bank_accounts().await?, "balance"))
    }

    async fn total_pending_payables(&self) -> Result<f64> {
        Ok(sum_field(&self.pending_payables().await?, "net_payable"))
    }

    async fn total_pending_receivables(&self) -> Result<f64> {
        Ok(sum_field(&self.pending_receivables().await?, "balance_due"))
    }
}

fn text_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn status_is(record: &Record, status: &str) -> bool {
    text_field(record, "status").is_some_and(|s| s.eq_ignore_ascii_case(status))
}

/// Records not yet settled (anything but paid or cancelled).
pub fn pending(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| !status_is(r, "paid") && !status_is(r, "cancelled"))
        .collect()
}

pub fn overdue(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().filter(|r| status_is(r, "overdue")).collect()
}

/// Cheques in one direction that have not cleared yet.
pub fn uncleared(cheques: &[Record], direction: ChequeDirection) -> Vec<Record> {
    let wanted = match direction {
        ChequeDirection::Issued => "issued",
        ChequeDirection::Received => "received",
    };
    cheques
        .iter()
        .filter(|c| text_field(c, "type").is_some_and(|t| t.eq_ignore_ascii_case(wanted)))
        .filter(|c| !status_is(c, "cleared"))
        .cloned()
        .collect()
}

pub fn sum_field(records: &[Record], field: &str) -> f64 {
    records
        .iter()
        .filter_map(|r| r.get(field))
        .map(number)
        .sum()
}

fn by_name(records: Vec<Record>, name: &str) -> Option<Record> {
    let needle = name.to_lowercase();
    records.into_iter().find(|r| {
        text_field(r, "name").is_some_and(|n| n.to_lowercase().contains(&needle))
    })
}

/// JSON-file backed store. Every write goes straight back to disk.
pub struct JsonFileStore {
    path: Option<PathBuf>,
    data: RwLock<Value>,
}

impl JsonFileStore {
    /// Open an existing database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = read_database(&path).await?;
        info!(path = %path.display(), "Finance store loaded");
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Store over an in-memory document; writes are not persisted.
    pub fn from_value(data: Value) -> Result<Self> {
        if !data.is_object() {
            return Err(AgentError::Store("database root must be an object".to_string()));
        }
        Ok(Self {
            path: None,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &mut Value) -> Result<()> {
        if let Some(root) = data.as_object_mut() {
            let metadata = root.entry("metadata").or_insert_with(|| json!({}));
            if let Some(meta) = metadata.as_object_mut() {
                meta.insert("last_updated".to_string(), json!(Utc::now().to_rfc3339()));
            }
        }

        let Some(path) = &self.path else {
            return Ok(());
        };

        // write beside the target, then rename over it
        let body = serde_json::to_vec_pretty(data)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| AgentError::Store(format!("cannot write {}: {}", staging.display(), e)))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| AgentError::Store(format!("cannot replace {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Finance store written");
        Ok(())
    }
}

async fn read_database(path: &Path) -> Result<Value> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AgentError::Store(format!("Database not found at {}: {}", path.display(), e)))?;
    let data: Value = serde_json::from_slice(&bytes)?;
    if !data.is_object() {
        return Err(AgentError::Store(format!(
            "{} does not hold a JSON object",
            path.display()
        )));
    }
    Ok(data)
}

fn object_at(data: &Value, key: &str) -> Record {
    data.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl FinanceStore for JsonFileStore {
    async fn company_info(&self) -> Result<Record> {
        Ok(object_at(&*self.data.read().await, "company"))
    }

    async fn metadata(&self) -> Result<Record> {
        Ok(object_at(&*self.data.read().await, "metadata"))
    }

    async fn records(&self, collection: Collection) -> Result<Vec<Record>> {
        let data = self.data.read().await;
        Ok(data
            .get(collection.key())
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|v| v.as_object().cloned()).collect())
            .unwrap_or_default())
    }

    async fn upsert(&self, collection: Collection, record: Record) -> Result<UpsertOutcome> {
        let id_field = collection.id_field();
        let id = text_field(&record, id_field)
            .map(str::to_string)
            .ok_or_else(|| {
                AgentError::Store(format!("{} record is missing `{}`", collection, id_field))
            })?;

        let mut data = self.data.write().await;
        let mut next = data.clone();
        let root = next
            .as_object_mut()
            .ok_or_else(|| AgentError::Store("database root must be an object".to_string()))?;
        let items = root
            .entry(collection.key())
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .ok_or_else(|| AgentError::Store(format!("`{}` is not a list", collection)))?;

        let existing = items.iter_mut().filter_map(Value::as_object_mut).find(|r| {
            r.get(id_field).and_then(Value::as_str) == Some(id.as_str())
        });

        let outcome = match existing {
            Some(current) => {
                current.extend(record);
                UpsertOutcome::Updated
            }
            None => {
                items.push(Value::Object(record));
                UpsertOutcome::Inserted
            }
        };

        self.persist(&mut next).await?;
        *data = next;
        info!(collection = %collection, id = %id, outcome = ?outcome, "Finance record upserted");
        Ok(outcome)
    }

    async fn update_bank_balance(&self, account_id: &str, balance: f64) -> Result<bool> {
        let mut data = self.data.write().await;
        let mut next = data.clone();

        let account = next
            .get_mut(Collection::BankAccounts.key())
            .and_then(Value::as_array_mut)
            .and_then(|accounts| {
                accounts.iter_mut().filter_map(Value::as_object_mut).find(|a| {
                    a.get("account_id").and_then(Value::as_str) == Some(account_id)
                })
            });

        let Some(account) = account else {
            return Ok(false);
        };

        account.insert("balance".to_string(), json!(balance));
        account.insert(
            "last_updated".to_string(),
            json!(Utc::now().date_naive().to_string()),
        );

        self.persist(&mut next).await?;
        *data = next;
        Ok(true)
    }
}
