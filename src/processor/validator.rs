use crate::clock::{Clock, SystemClock};
use crate::error::ValidationError;
use crate::events::{Timestamp, TypedEvent};
use chrono::Duration;
use std::sync::Arc;

/// Validates typed events before they are accepted for storage
///
/// Timestamps must fall within `(now - max_age, now + max_future_skew]`, and
/// every event needs an app version, platform, device and session. Scene
/// loads additionally need a scene name, exceptions and crashes a
/// fingerprint.
pub struct Validator {
    max_age: Duration,
    max_future_skew: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Validator {
    /// Create a validator with the default limits (7 days old, 1 hour ahead)
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(clock, Duration::days(7), Duration::hours(1))
    }

    /// Create a validator with custom timestamp limits
    pub fn with_limits(clock: Arc<dyn Clock>, max_age: Duration, max_future_skew: Duration) -> Self {
        Self {
            max_age,
            max_future_skew,
            clock,
        }
    }

    /// Validate a decoded event
    ///
    /// # Errors
    ///
    /// Returns the first rule the event violates.
    pub fn validate(&self, event: &TypedEvent) -> Result<(), ValidationError> {
        let context = event.context();

        self.validate_timestamp(context.timestamp)?;
        if context.app_version.is_empty() {
            return Err(ValidationError::MissingAppVersion);
        }
        if context.platform.is_empty() {
            return Err(ValidationError::MissingPlatform);
        }
        if context.device_id.is_empty() {
            return Err(ValidationError::MissingDeviceId);
        }
        if context.session_id.is_empty() {
            return Err(ValidationError::MissingSessionId);
        }

        match event {
            TypedEvent::SceneLoad(load) if load.scene_name.is_empty() => {
                Err(ValidationError::MissingSceneName)
            }
            TypedEvent::Exception(exception) if exception.fingerprint.is_empty() => {
                Err(ValidationError::MissingFingerprint)
            }
            TypedEvent::Crash(crash) if crash.fingerprint.is_empty() => {
                Err(ValidationError::MissingFingerprint)
            }
            _ => Ok(()),
        }
    }

    /// Check that a timestamp is set and inside the accepted range
    pub fn validate_timestamp(&self, timestamp: Timestamp) -> Result<(), ValidationError> {
        if timestamp.timestamp_millis() == 0 {
            return Err(ValidationError::InvalidTimestamp);
        }

        // A bound that falls outside the representable range does not constrain
        let now = self.clock.now();
        if let Some(oldest) = now.checked_sub_signed(self.max_age) {
            if timestamp <= oldest {
                return Err(ValidationError::InvalidTimestamp);
            }
        }
        if let Some(latest) = now.checked_add_signed(self.max_future_skew) {
            if timestamp > latest {
                return Err(ValidationError::InvalidTimestamp);
            }
        }
        Ok(())
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::{EventContext, Startup};
    use chrono::Utc;
    use quickcheck_macros::quickcheck;

    // Any event outside the window is rejected no matter how complete it is
    #[quickcheck]
    fn prop_out_of_range_timestamps_always_rejected(offset_minutes: i32) -> bool {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let validator = Validator::new(clock.clone());
        let now = clock.now();
        let timestamp = now + Duration::minutes(offset_minutes as i64);

        let event = TypedEvent::Startup(Startup {
            context: EventContext {
                timestamp,
                app_version: "1.0.0".to_string(),
                platform: "iOS".to_string(),
                session_id: "s".to_string(),
                device_id: "d".to_string(),
                ..Default::default()
            },
            ..Default::default()
        });

        let in_range = timestamp > now - Duration::days(7) && timestamp <= now + Duration::hours(1);
        validator.validate(&event).is_ok() == in_range
    }
}
