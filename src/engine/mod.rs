//! Draw execution: weighted pool, secure randomness, per-tier selection,
//! orchestration and runner-up promotion.

pub mod orchestrator;
pub mod pool;
pub mod promoter;
pub mod random;
pub mod tier;

pub use orchestrator::{DrawOrchestrator, DrawOutcome};
pub use pool::WeightedPool;
pub use promoter::{Promotion, RunnerUpPromoter};
pub use random::{OsRandom, SecureRandom};
pub use tier::{select_tier, TierSelection};
