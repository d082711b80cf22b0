use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;
use tally_core::{CategoryAssignment, Money, Selector, Transaction};
use tally_pipeline::TransactionStore;
use thiserror::Error;
use tracing::debug;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Invalid tags column: {0}")]
    Tags(#[from] serde_json::Error),
    #[error("Corrupt {column} value '{value}'")]
    Corrupt { column: &'static str, value: String },
    #[error("Transaction appears twice in one batch and would share a natural key: {transaction}")]
    DuplicateInBatch { transaction: Box<Transaction> },
}

/// Row predicate for [`select_transactions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Uncategorized,
    Bank(String),
    Category(String),
}

type Row = (NaiveDate, String, String, String, Option<String>, Option<String>, String);

pub async fn create_db(path: &Path) -> Result<DbPool, StorageError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            bank TEXT NOT NULL,
            amount TEXT NOT NULL,
            category TEXT,
            selector TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (date, description, bank, amount)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions (category)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Amounts are keyed in normalized form so that `500` and `500.00` collide.
fn amount_key(amount: Money) -> String {
    amount.as_decimal().normalize().to_string()
}

fn tags_json(tags: &BTreeSet<String>) -> Result<String, StorageError> {
    Ok(serde_json::to_string(tags)?)
}

fn from_row(row: Row) -> Result<Transaction, StorageError> {
    let (date, description, bank, amount, category, selector, tags) = row;

    let amount = Decimal::from_str(&amount).map_err(|_| StorageError::Corrupt {
        column: "amount",
        value: amount.clone(),
    })?;
    let mut tx = Transaction::new(date, &description, bank, Money::from_decimal(amount));

    if let Some(name) = category {
        let selector = match selector {
            Some(s) => s
                .parse::<Selector>()
                .map_err(|_| StorageError::Corrupt {
                    column: "selector",
                    value: s.clone(),
                })?,
            None => Selector::Manual,
        };
        tx.category = Some(CategoryAssignment::new(name, selector));
    }
    tx.tags = serde_json::from_str(&tags)?;
    Ok(tx)
}

pub async fn select_transactions(pool: &DbPool, filter: &Filter) -> Result<Vec<Transaction>, StorageError> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT date, description, bank, amount, category, selector, tags FROM transactions",
    );
    match filter {
        Filter::All => {}
        Filter::Uncategorized => {
            query.push(" WHERE category IS NULL");
        }
        Filter::Bank(bank) => {
            query.push(" WHERE bank = ").push_bind(bank);
        }
        Filter::Category(category) => {
            query.push(" WHERE category = ").push_bind(category);
        }
    }
    query.push(" ORDER BY date, id");

    let rows = query.build_query_as::<Row>().fetch_all(pool).await?;
    rows.into_iter().map(from_row).collect()
}

/// Inserts new transactions; rows whose natural key already exists in the
/// database are ignored. Two rows of the same batch sharing a key are an
/// error and nothing is inserted. Returns the number of rows inserted.
pub async fn insert_transactions(pool: &DbPool, transactions: &[Transaction]) -> Result<u64, StorageError> {
    let mut seen = HashSet::with_capacity(transactions.len());
    if let Some(dup) = transactions.iter().find(|tx| !seen.insert(*tx)) {
        return Err(StorageError::DuplicateInBatch {
            transaction: Box::new(dup.clone()),
        });
    }

    let mut db_tx = pool.begin().await?;
    let mut inserted = 0;

    for tx in transactions {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO transactions (date, description, bank, amount, category, selector, tags) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.date)
        .bind(&tx.description)
        .bind(&tx.bank)
        .bind(amount_key(tx.amount))
        .bind(tx.category_name())
        .bind(tx.selector().map(|s| s.to_string()))
        .bind(tags_json(&tx.tags)?)
        .execute(&mut *db_tx)
        .await?;
        inserted += result.rows_affected();
    }

    db_tx.commit().await?;
    debug!(inserted, skipped = transactions.len() as u64 - inserted, "transactions inserted");
    Ok(inserted)
}

/// Writes category, provenance and tags back by natural key.
pub async fn update_transactions(pool: &DbPool, transactions: &[Transaction]) -> Result<u64, StorageError> {
    let mut db_tx = pool.begin().await?;
    let mut updated = 0;

    for tx in transactions {
        let result = sqlx::query(
            "UPDATE transactions SET category = ?, selector = ?, tags = ? WHERE date = ? AND description = ? AND bank = ? AND amount = ?",
        )
        .bind(tx.category_name())
        .bind(tx.selector().map(|s| s.to_string()))
        .bind(tags_json(&tx.tags)?)
        .bind(tx.date)
        .bind(&tx.description)
        .bind(&tx.bank)
        .bind(amount_key(tx.amount))
        .execute(&mut *db_tx)
        .await?;
        updated += result.rows_affected();
    }

    db_tx.commit().await?;
    debug!(updated, "transactions updated");
    Ok(updated)
}

pub async fn delete_transactions(pool: &DbPool, transactions: &[Transaction]) -> Result<u64, StorageError> {
    let mut db_tx = pool.begin().await?;
    let mut deleted = 0;

    for tx in transactions {
        let result = sqlx::query(
            "DELETE FROM transactions WHERE date = ? AND description = ? AND bank = ? AND amount = ?",
        )
        .bind(tx.date)
        .bind(&tx.description)
        .bind(&tx.bank)
        .bind(amount_key(tx.amount))
        .execute(&mut *db_tx)
        .await?;
        deleted += result.rows_affected();
    }

    db_tx.commit().await?;
    Ok(deleted)
}

/// The SQLite database as the pipeline's storage collaborator.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: DbPool,
}

impl Ledger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl TransactionStore for Ledger {
    type Error = StorageError;

    async fn fetch_uncategorized(&self) -> Result<Vec<Transaction>, StorageError> {
        select_transactions(&self.pool, &Filter::Uncategorized).await
    }

    async fn commit(&self, transactions: &[Transaction]) -> Result<(), StorageError> {
        update_transactions(&self.pool, transactions).await.map(|_| ())
    }
}
