pub mod db;

pub use db::{
    create_db, delete_transactions, insert_transactions, select_transactions,
    update_transactions, DbPool, Filter, Ledger, StorageError,
};
