//! Counters for the dispatcher and host adapter.
//!
//! [`DispatchMetrics`] is owned by the dispatcher and [`HostMetrics`] by
//! the host adapter. Both are cumulative for the life of a session and
//! surface in the [`ShutdownReport`](crate::ShutdownReport).

/// Dispatcher-side counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    /// Records popped from the command ring.
    pub received: u64,
    /// Commands whose routine ran to completion.
    pub completed: u64,
    /// Commands answered with a failure code.
    pub failed: u64,
    /// Records that did not decode.
    pub decode_failures: u64,
    /// Commands refused after the dispatcher halted.
    pub refused_after_halt: u64,
    /// Result pushes that found the ring full and backed off.
    pub result_retries: u64,
    /// Results dropped after the retry bound was exhausted.
    pub results_dropped: u64,
    /// Time spent inside kernels, in microseconds.
    pub kernel_us: u64,
}

/// Host-side counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostMetrics {
    /// Commands accepted by the command ring.
    pub submitted: u64,
    /// Submits rejected because the command ring was full.
    pub saturated_rejections: u64,
    /// Results popped from the result ring.
    pub results_received: u64,
    /// Dropped-result diagnostics received.
    pub drops_reported: u64,
    /// Results or drops that matched no outstanding handle.
    pub unmatched: u64,
    /// Unclaimed results discarded after the retention window.
    pub expired: u64,
    /// Submit-to-result time summed over matched results, in microseconds.
    pub round_trip_us: u64,
    /// Longest single submit-to-result time, in microseconds.
    pub max_round_trip_us: u64,
}
