pub mod circuit_breaker;
pub mod fees;
pub mod idempotency;
pub mod ledger;
pub mod orchestrator;
pub mod retry;
pub mod selector;

pub use circuit_breaker::CircuitBreaker;
pub use fees::FeeSplitCalculator;
pub use idempotency::IdempotencyStore;
pub use ledger::TransactionLedger;
pub use orchestrator::PaymentOrchestrator;
pub use retry::RetryExecutor;
pub use selector::ProviderSelector;
