use rdt_protocol::COUNTS_PER_UNIT;
use serde::Serialize;

/// One offset-adjusted force/torque reading
///
/// `counts` holds device counts in fx, fy, fz, tx, ty, tz order with the
/// calibration offset already subtracted; the accessors convert to newtons
/// and newton-meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub sequence: u32,
    pub status: u32,
    pub counts: [f64; 6],
}

impl Measurement {
    /// fx, fy, fz, tx, ty, tz in engineering units
    pub fn wrench(&self) -> [f64; 6] {
        self.counts.map(|c| c / COUNTS_PER_UNIT)
    }

    /// Force in newtons
    pub fn force(&self) -> [f64; 3] {
        let w = self.wrench();
        [w[0], w[1], w[2]]
    }

    /// Torque in newton-meters
    pub fn torque(&self) -> [f64; 3] {
        let w = self.wrench();
        [w[3], w[4], w[5]]
    }

    pub fn force_counts(&self) -> [f64; 3] {
        [self.counts[0], self.counts[1], self.counts[2]]
    }

    pub fn torque_counts(&self) -> [f64; 3] {
        [self.counts[3], self.counts[4], self.counts[5]]
    }
}
