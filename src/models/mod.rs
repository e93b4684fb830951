pub mod account;
pub mod transaction;

pub use account::{Account, AccountId, AMOUNT_SCALE};
pub use transaction::{TransactionKind, TransactionRecord};
