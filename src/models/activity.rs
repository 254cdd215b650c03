use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    AttemptStarted,
    AnswersSaved,
    QuestionStarted,
    QuestionTimedOut,
    Submitted,
    TimeUp,
    Expired,
    Terminated,
    ManuallyGraded,
    Reviewed,
    Unreviewed,
    ScoreRecalculated,
    // proctoring signals reported by the client
    TabSwitch,
    FocusLost,
    CameraStopped,
    MicrophoneStopped,
    ScreenShareStopped,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::AttemptStarted => "attempt_started",
            ActivityKind::AnswersSaved => "answers_saved",
            ActivityKind::QuestionStarted => "question_started",
            ActivityKind::QuestionTimedOut => "question_timed_out",
            ActivityKind::Submitted => "submitted",
            ActivityKind::TimeUp => "time_up",
            ActivityKind::Expired => "expired",
            ActivityKind::Terminated => "terminated",
            ActivityKind::ManuallyGraded => "manually_graded",
            ActivityKind::Reviewed => "reviewed",
            ActivityKind::Unreviewed => "unreviewed",
            ActivityKind::ScoreRecalculated => "score_recalculated",
            ActivityKind::TabSwitch => "tab_switch",
            ActivityKind::FocusLost => "focus_lost",
            ActivityKind::CameraStopped => "camera_stopped",
            ActivityKind::MicrophoneStopped => "microphone_stopped",
            ActivityKind::ScreenShareStopped => "screen_share_stopped",
        }
    }

    /// Kinds a client may report; lifecycle kinds are only written by the engine.
    pub fn is_client_reportable(self) -> bool {
        matches!(
            self,
            ActivityKind::TabSwitch
                | ActivityKind::FocusLost
                | ActivityKind::CameraStopped
                | ActivityKind::MicrophoneStopped
                | ActivityKind::ScreenShareStopped
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub kind: ActivityKind,
    pub at: DateTime<Utc>,
    pub question_id: Option<Uuid>,
    pub actor: Option<Uuid>,
    pub details: Option<JsonValue>,
}

impl Activity {
    pub fn new(kind: ActivityKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            at,
            question_id: None,
            actor: None,
            details: None,
        }
    }

    pub fn for_question(mut self, question_id: Uuid) -> Self {
        self.question_id = Some(question_id);
        self
    }

    pub fn by(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}
