// ============================================================================
// Optimistic Mutation Module
// ============================================================================
//
// Implements the reconciliation core: every write applies a local projection
// first, then reconciles with the authoritative refetch or rolls back to the
// captured snapshot.
//
// Design Patterns Used:
// - State Pattern: mutation lifecycle (Idle, OptimisticApplied, terminal)
// - Command Pattern: restore tokens carrying the reversible pre-image
//
// ============================================================================

pub mod executor;
pub mod patch;
pub mod state;

pub use executor::MutationExecutor;
pub use state::{MutationId, MutationRecord, MutationState};
