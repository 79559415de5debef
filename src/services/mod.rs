pub mod account_lifecycle;
pub mod balance_cache;
pub mod balance_engine;
pub mod expense_service;
pub mod group_service;
pub mod history;
pub mod notification_service;
pub mod recurring_engine;
pub mod settlement_service;

pub use balance_cache::BalanceCache;
pub use history::HistoryService;
