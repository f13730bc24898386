//! Maps `Box<dyn Error>` from the `FrontEnd` seam to `RecoverableError`.
//!
//! The traits in `trimcal_traits` use `Box<dyn Error + Send + Sync>` so any
//! board driver can plug in; this module converts those to our typed error,
//! with an optional feature-gated path for `trimcal_hardware::HwError`.

use crate::error::RecoverableError;

/// Map a trait-boundary error to a typed `RecoverableError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> RecoverableError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<trimcal_hardware::HwError>() {
            return match hw {
                trimcal_hardware::HwError::Timeout => RecoverableError::Timeout,
                trimcal_hardware::HwError::Link(msg) => RecoverableError::Hardware(msg.clone()),
                other => RecoverableError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        RecoverableError::Timeout
    } else {
        RecoverableError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_errors_fall_back_to_message() {
        let e: Box<dyn std::error::Error + Send + Sync> = "reply Timeout on e-link".into();
        assert_eq!(map_hw_error(e.as_ref()), RecoverableError::Timeout);
        let e: Box<dyn std::error::Error + Send + Sync> = "crc mismatch".into();
        assert_eq!(
            map_hw_error(e.as_ref()),
            RecoverableError::Hardware("crc mismatch".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn typed_hardware_errors_are_downcast() {
        use trimcal_hardware::HwError;
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::Timeout);
        assert_eq!(map_hw_error(e.as_ref()), RecoverableError::Timeout);
        let e: Box<dyn std::error::Error + Send + Sync> =
            Box::new(HwError::InvalidChannel { unit: 1, channel: 70 });
        assert!(matches!(
            map_hw_error(e.as_ref()),
            RecoverableError::HardwareFault(_)
        ));
    }
}
