//! Motion alarm debouncing.
//!
//! The recorder fires a callback per detection, not per detection window,
//! so the alarm is held up by a timer: the first event raises the alarm
//! and schedules an expiry; further events push the expiry out; only the
//! timer lowers the alarm. The timeout window is per-camera configuration,
//! bounded so the alarm cannot flap.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use camhub_domain::error::ConfigurationError;
use camhub_domain::event::{Event, EventKind};
use camhub_domain::id::{CameraId, StationId};

use crate::ports::EventPublisher;

/// Lower bound of the motion timeout window, in seconds.
pub const MIN_MOTION_TIMEOUT_SECS: u64 = 10;
/// Upper bound of the motion timeout window, in seconds.
pub const MAX_MOTION_TIMEOUT_SECS: u64 = 60;
/// Window used when a camera has no stored setting.
pub const DEFAULT_MOTION_TIMEOUT: Duration = Duration::from_secs(21);

/// Check a configured motion timeout at the settings boundary.
///
/// Out-of-range values are rejected, not clamped.
///
/// # Errors
///
/// Returns [`ConfigurationError::MotionTimeoutOutOfRange`] outside
/// [`MIN_MOTION_TIMEOUT_SECS`]..=[`MAX_MOTION_TIMEOUT_SECS`].
pub fn validate_motion_timeout(secs: u64) -> Result<Duration, ConfigurationError> {
    if (MIN_MOTION_TIMEOUT_SECS..=MAX_MOTION_TIMEOUT_SECS).contains(&secs) {
        Ok(Duration::from_secs(secs))
    } else {
        Err(ConfigurationError::MotionTimeoutOutOfRange {
            value: secs,
            min: MIN_MOTION_TIMEOUT_SECS,
            max: MAX_MOTION_TIMEOUT_SECS,
        })
    }
}

#[derive(Default)]
struct MotionState {
    active: bool,
    /// Bumped per trigger; an expiry task only fires for the epoch it was
    /// scheduled in, so a restarted window silently supersedes it.
    epoch: u64,
}

/// Per-camera motion alarm, reconstructed as idle on every restart.
pub struct MotionAlarm<P> {
    inner: Arc<MotionInner<P>>,
}

struct MotionInner<P> {
    station: StationId,
    camera: CameraId,
    events: Arc<P>,
    state: Mutex<MotionState>,
}

impl<P> MotionAlarm<P>
where
    P: EventPublisher + 'static,
{
    /// Create an idle alarm for `camera`.
    pub fn new(station: StationId, camera: CameraId, events: Arc<P>) -> Self {
        Self {
            inner: Arc::new(MotionInner {
                station,
                camera,
                events,
                state: Mutex::new(MotionState::default()),
            }),
        }
    }

    /// Whether the alarm is currently raised.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().unwrap().active
    }

    /// Handle one motion event: raise the alarm when idle, otherwise
    /// restart the expiry window.
    pub async fn trigger(&self, timeout: Duration) {
        let (epoch, raised) = {
            let mut state = self.inner.state.lock().unwrap();
            state.epoch += 1;
            let raised = !state.active;
            state.active = true;
            (state.epoch, raised)
        };

        if raised {
            self.inner.publish(true).await;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.expire(epoch).await;
        });
    }
}

impl<P> MotionInner<P>
where
    P: EventPublisher,
{
    async fn expire(&self, epoch: u64) {
        {
            let mut state = self.state.lock().unwrap();
            if state.epoch != epoch || !state.active {
                return;
            }
            state.active = false;
        }
        tracing::debug!(camera = %self.camera, "motion window expired");
        self.publish(false).await;
    }

    async fn publish(&self, active: bool) {
        let event = Event::new(EventKind::MotionAlarm {
            station: self.station.clone(),
            camera: self.camera,
            active,
        });
        if let Err(err) = self.events.publish(event).await {
            tracing::warn!(error = %err, "failed to publish motion alarm event");
        }
    }
}
