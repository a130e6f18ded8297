use std::fmt;

/// Named events the realtime server pushes to clients.
///
/// `TableChange` carries row-level mutations and is filtered by table; the
/// rest form the fixed catalog of domain events every binder listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    TableChange,
    ExamStarted,
    ExamSubmitted,
    ExamGraded,
    ExamAutoSubmitted,
    ReportCardUpdated,
    ReportCardPublished,
    ReportCardFinalized,
    ReportCardReverted,
    UserCreated,
    UserUpdated,
    UserDeleted,
    AttendanceMarked,
    AttendanceUpdated,
    Notification,
    UploadProgress,
}

impl EventName {
    /// Every event a binder registers a handler for.
    pub const ALL: [EventName; 16] = [
        EventName::TableChange,
        EventName::ExamStarted,
        EventName::ExamSubmitted,
        EventName::ExamGraded,
        EventName::ExamAutoSubmitted,
        EventName::ReportCardUpdated,
        EventName::ReportCardPublished,
        EventName::ReportCardFinalized,
        EventName::ReportCardReverted,
        EventName::UserCreated,
        EventName::UserUpdated,
        EventName::UserDeleted,
        EventName::AttendanceMarked,
        EventName::AttendanceUpdated,
        EventName::Notification,
        EventName::UploadProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::TableChange => "table_change",
            EventName::ExamStarted => "exam.started",
            EventName::ExamSubmitted => "exam.submitted",
            EventName::ExamGraded => "exam.graded",
            EventName::ExamAutoSubmitted => "exam.auto_submitted",
            EventName::ReportCardUpdated => "reportcard.updated",
            EventName::ReportCardPublished => "reportcard.published",
            EventName::ReportCardFinalized => "reportcard.finalized",
            EventName::ReportCardReverted => "reportcard.reverted",
            EventName::UserCreated => "user.created",
            EventName::UserUpdated => "user.updated",
            EventName::UserDeleted => "user.deleted",
            EventName::AttendanceMarked => "attendance.marked",
            EventName::AttendanceUpdated => "attendance.updated",
            EventName::Notification => "notification",
            EventName::UploadProgress => "upload.progress",
        }
    }

    /// Look up a catalog entry by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == name)
    }

    /// Whether this is one of the fixed domain events (anything but `table_change`).
    pub fn is_domain_event(&self) -> bool {
        !matches!(self, EventName::TableChange)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
