//! Tests for dashboard module
//!
//! Covers the error-accumulation rules and the deserialization of the
//! Workspace API payload shapes the aggregation relies on.

#[cfg(test)]
mod tests {
    use super::super::handlers::append_error;
    use super::super::models::{CalendarEvent, DashboardResponse, DriveFile, TaskItem};

    #[test]
    fn test_default_response_is_empty() {
        let response = DashboardResponse::default();
        assert!(response.sheets.is_empty());
        assert!(response.calendar_events.is_empty());
        assert!(response.tasks.is_empty());
        assert!(response.error_message.is_none());
    }

    #[test]
    fn test_errors_accumulate_without_overwriting() {
        let mut message = None;

        append_error(&mut message, "Sheets error: HTTP 403");
        assert_eq!(message.as_deref(), Some("Sheets error: HTTP 403"));

        append_error(&mut message, "Tasks error: HTTP 500");
        assert_eq!(
            message.as_deref(),
            Some("Sheets error: HTTP 403\nTasks error: HTTP 500")
        );
    }

    #[test]
    fn test_partial_failure_renders_successful_data() {
        // Drive failed, Calendar and Tasks succeeded: the response must
        // carry their data plus a non-empty error message.
        let mut response = DashboardResponse::default();

        append_error(&mut response.error_message, "Sheets error: HTTP 502");
        response.calendar_events = vec![serde_json::from_value(serde_json::json!({
            "id": "evt-1",
            "summary": "Standup",
            "start": {"dateTime": "2026-08-29T09:00:00Z"},
            "end": {"dateTime": "2026-08-29T09:15:00Z"},
        }))
        .expect("valid event")];
        response.tasks = vec![serde_json::from_value(serde_json::json!({
            "id": "task-1",
            "title": "Review PR",
        }))
        .expect("valid task")];

        assert!(response.sheets.is_empty());
        assert_eq!(response.calendar_events.len(), 1);
        assert_eq!(response.tasks.len(), 1);
        assert!(response
            .error_message
            .as_deref()
            .is_some_and(|m| !m.is_empty()));
    }

    #[test]
    fn test_drive_file_parses_from_api_shape() {
        let file: DriveFile =
            serde_json::from_str(r#"{"id": "1abc", "name": "Budget 2026"}"#).expect("must parse");
        assert_eq!(file.id, "1abc");
        assert_eq!(file.name, "Budget 2026");
    }

    #[test]
    fn test_all_day_event_parses_with_date_only() {
        let event: CalendarEvent = serde_json::from_value(serde_json::json!({
            "id": "evt-2",
            "summary": "Holiday",
            "start": {"date": "2026-09-01"},
            "end": {"date": "2026-09-02"},
        }))
        .expect("must parse");

        let start = event.start.expect("start present");
        assert_eq!(start.date.as_deref(), Some("2026-09-01"));
        assert!(start.date_time.is_none());
    }

    #[test]
    fn test_event_with_missing_summary_parses() {
        let event: CalendarEvent =
            serde_json::from_value(serde_json::json!({"id": "evt-3"})).expect("must parse");
        assert!(event.summary.is_none());
        assert!(event.start.is_none());
    }

    #[test]
    fn test_task_list_name_defaults_empty_until_tagged() {
        let mut task: TaskItem = serde_json::from_value(serde_json::json!({
            "id": "task-2",
            "title": "Ship release",
            "due": "2026-09-05T00:00:00Z",
        }))
        .expect("must parse");

        assert_eq!(task.list_name, "");
        task.list_name = "Work".to_string();
        assert_eq!(task.list_name, "Work");
    }

    #[test]
    fn test_response_serializes_snake_case_fields() {
        let response = DashboardResponse::default();
        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json.get("sheets").is_some());
        assert!(json.get("calendar_events").is_some());
        assert!(json.get("tasks").is_some());
        assert!(json.get("error_message").is_some());
    }
}
