use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;

pub const DEFAULT_HIGH_WATER_MARK: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub checked_out: u32,
    pub size: u32,
}

impl PoolStatus {
    pub fn utilization(&self) -> f64 {
        if self.size == 0 {
            return 1.0;
        }
        f64::from(self.checked_out) / f64::from(self.size)
    }
}

/// Refuses work while the shared pool is at or above its high-water mark.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionControl {
    high_water_mark: f64,
}

impl AdmissionControl {
    pub fn new(high_water_mark: f64) -> Self {
        Self { high_water_mark }
    }

    pub fn high_water_mark(&self) -> f64 {
        self.high_water_mark
    }

    pub fn admit(&self, status: PoolStatus) -> Result<(), CoordinatorError> {
        let utilization = status.utilization();
        if utilization >= self.high_water_mark {
            return Err(CoordinatorError::Saturated(format!(
                "{}/{} connections checked out ({:.0}% >= {:.0}%)",
                status.checked_out,
                status.size,
                utilization * 100.0,
                self.high_water_mark * 100.0
            )));
        }
        Ok(())
    }
}

impl Default for AdmissionControl {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATER_MARK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(checked_out: u32, size: u32) -> PoolStatus {
        PoolStatus { checked_out, size }
    }

    #[test]
    fn test_admits_below_high_water_mark() {
        let control = AdmissionControl::default();
        assert!(control.admit(status(0, 5)).is_ok());
        assert!(control.admit(status(3, 5)).is_ok());
    }

    #[test]
    fn test_rejects_at_high_water_mark() {
        let control = AdmissionControl::default();
        assert!(matches!(
            control.admit(status(4, 5)),
            Err(CoordinatorError::Saturated(_))
        ));
        assert!(control.admit(status(5, 5)).is_err());
    }

    #[test]
    fn test_empty_pool_counts_as_saturated() {
        assert!(AdmissionControl::new(1.0).admit(status(0, 0)).is_err());
    }
}
