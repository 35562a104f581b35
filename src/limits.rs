//! Hard limits. Everything user-supplied is bounded before it touches the
//! engine.

pub const MAX_QUOTAS_PER_EVENT: usize = 10_000;

/// Item plus variation entries per quota scope.
pub const MAX_SCOPE_ENTRIES: usize = 1_000;

pub const MAX_NAME_LEN: usize = 200;

/// Quota ids per bulk availability call.
pub const MAX_BULK_QUOTAS: usize = 1_000;
