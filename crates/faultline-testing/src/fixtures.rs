//! Fixture builders for normalized error records.

use chrono::Utc;
use faultline_core::{Breadcrumb, ErrorId, Level, NormalizedError, StackFrame, UserIdentity};

/// Builds a minimal normalized error with the given message.
pub fn error_with_message(message: impl Into<String>) -> NormalizedError {
    NormalizedError {
        id: ErrorId::new(),
        message: message.into(),
        kind: "Error".to_string(),
        level: Level::Error,
        stack: Vec::new(),
        timestamp: Utc::now(),
        tags: Default::default(),
        extra: Default::default(),
        breadcrumbs: Vec::new(),
        user: None,
    }
}

/// Builds a fully populated normalized error for round-trip assertions.
pub fn detailed_error() -> NormalizedError {
    let mut error = error_with_message("connection refused");
    error.kind = "NetworkError".to_string();
    error.level = Level::Warning;
    error.stack = vec![
        StackFrame {
            function: "fetch_profile".to_string(),
            file: Some("profile.rs".to_string()),
            line: Some(42),
            column: Some(9),
        },
        StackFrame::named("main"),
    ];
    error.tags.insert("release".to_string(), "1.4.2".to_string());
    error.extra.insert("request_id".to_string(), serde_json::json!("req-8821"));
    error.breadcrumbs.push(breadcrumb("http", "GET /profile"));
    error.user = Some(user("u-1", "ada@example.com"));
    error
}

/// Builds a breadcrumb in the given category.
pub fn breadcrumb(category: impl Into<String>, message: impl Into<String>) -> Breadcrumb {
    Breadcrumb {
        timestamp: Utc::now(),
        category: category.into(),
        message: message.into(),
        level: Level::Info,
        data: None,
    }
}

/// Builds a user identity with an id and email.
pub fn user(id: impl Into<String>, email: impl Into<String>) -> UserIdentity {
    UserIdentity { id: Some(id.into()), email: Some(email.into()), username: None }
}
