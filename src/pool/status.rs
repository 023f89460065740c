use serde::Serialize;

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_conn: usize,
    /// Idle connections ready for reuse.
    pub free: usize,
    /// Connections currently checked out.
    pub used: usize,
    pub disposed: bool,
    pub pooling_disabled: bool,
}

impl PoolStatus {
    /// Physical connections held by the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.free + self.used
    }

    /// Share of capacity checked out, 0.0 to 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.max_conn == 0 {
            0.0
        } else {
            self.used as f64 / self.max_conn as f64
        }
    }

    /// The next keyless checkout would fail with `Exhausted`.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        !self.pooling_disabled && self.free == 0 && self.used >= self.max_conn
    }
}
