pub mod kv_store;
pub mod ledger;
pub mod oracle_client;
pub mod session;
