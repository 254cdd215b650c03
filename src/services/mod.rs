pub mod access_service;
pub mod activity_service;
pub mod attempt_service;
pub mod grading_service;
pub mod quiz_service;
pub mod recalculation_service;
pub mod recording_service;
pub mod timing_service;
pub mod visibility_service;

use std::sync::Arc;

use access_service::{Authorizer, RosterAuthorizer};
use activity_service::{ActivityLogger, TracingActivityLogger};
use recording_service::RecordingService;

use crate::utils::time::{Clock, SystemClock};

/// Everything the attempt engine talks to that it does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub recordings: Arc<dyn RecordingService>,
    pub authorizer: Arc<dyn Authorizer>,
    pub activity: Arc<dyn ActivityLogger>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Roster-based authorization, tracing activity log and the system clock.
    pub fn with_recordings(recordings: Arc<dyn RecordingService>) -> Self {
        Self {
            recordings,
            authorizer: Arc::new(RosterAuthorizer),
            activity: Arc::new(TracingActivityLogger),
            clock: Arc::new(SystemClock),
        }
    }
}
