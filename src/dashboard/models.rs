//! Dashboard data models
//!
//! Shapes mirror the fields the Workspace APIs return that the
//! dashboard actually renders; everything else is dropped at
//! deserialization time.

use serde::{Deserialize, Serialize};

/// A spreadsheet document from the Drive file listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

/// Calendar event start/end; all-day events carry `date` instead of
/// `dateTime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(rename = "htmlLink", default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub start: Option<EventTime>,
    #[serde(default)]
    pub end: Option<EventTime>,
}

/// An incomplete task, tagged after fetch with the display name of the
/// task list it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub list_name: String,
}

/// GET / response body
///
/// Always renders whatever data was retrieved; per-service failures
/// accumulate in `error_message` instead of failing the request.
#[derive(Debug, Default, Serialize)]
pub struct DashboardResponse {
    pub sheets: Vec<DriveFile>,
    pub calendar_events: Vec<CalendarEvent>,
    pub tasks: Vec<TaskItem>,
    pub error_message: Option<String>,
}
