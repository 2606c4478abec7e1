use proptest::prelude::*;

/// One step applied to a circuit breaker and its reference model
#[derive(Debug, Clone, Copy)]
pub enum BreakerOp {
    Success,
    Failure,
    Allow,
    /// Advance the paused clock by this many milliseconds
    Advance(u64),
}

pub fn breaker_op_strategy(max_advance_ms: u64) -> impl Strategy<Value = BreakerOp> {
    prop_oneof![
        3 => Just(BreakerOp::Success),
        4 => Just(BreakerOp::Failure),
        3 => Just(BreakerOp::Allow),
        1 => (1..=max_advance_ms).prop_map(BreakerOp::Advance),
    ]
}

pub fn breaker_ops_strategy(max_advance_ms: u64) -> impl Strategy<Value = Vec<BreakerOp>> {
    prop::collection::vec(breaker_op_strategy(max_advance_ms), 1..120)
}

/// Raw task priorities, including out-of-range values that clamp
pub fn priority_strategy() -> impl Strategy<Value = u8> {
    prop_oneof![8 => 1u8..=5, 1 => Just(0u8), 1 => 6u8..=u8::MAX]
}

pub fn priorities_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(priority_strategy(), 0..64)
}
