pub mod ledger_service;

pub use ledger_service::{
    DepositReceipt, LedgerService, OperationStage, TransferReceipt, DEFAULT_MAX_HISTORY_LIMIT,
};
