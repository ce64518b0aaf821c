use std::str::FromStr;

use sea_orm::ActiveValue::Set;
use tracing::warn;

use crate::errors::{PrivalyticsError, Result};
use crate::storage::models::{Event, EventKind, Metadata, NewEvent, Page};
use migration::entities::{event, page};

pub fn model_to_page(model: page::Model) -> Page {
    Page {
        id: model.id,
        url: model.url,
        title: model.title,
        created_at: model.created_at,
    }
}

/// 行数据转换为事件；无法识别的类型视为数据损坏
pub fn model_to_event(model: event::Model) -> Result<Event> {
    let kind = EventKind::from_str(&model.event_type).map_err(|_| {
        PrivalyticsError::database_operation(format!(
            "Event {} has unknown type '{}'",
            model.id, model.event_type
        ))
    })?;

    Ok(Event {
        kind,
        metadata: decode_metadata(&model.id, model.metadata.as_deref()),
        id: model.id,
        page_id: model.page_id,
        visitor_hash: model.visitor_hash,
        user_agent: model.user_agent,
        consent_given: model.consent_given,
        timestamp: model.timestamp,
    })
}

pub fn new_event_to_active_model(
    id: &str,
    event: &NewEvent,
    timestamp: chrono::DateTime<chrono::Utc>,
) -> Result<event::ActiveModel> {
    let metadata = if event.metadata.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&event.metadata)?)
    };

    Ok(event::ActiveModel {
        id: Set(id.to_string()),
        page_id: Set(event.page_id.clone()),
        event_type: Set(event.kind.as_ref().to_string()),
        visitor_hash: Set(event.visitor_hash.clone()),
        user_agent: Set(event.user_agent.clone()),
        metadata: Set(metadata),
        consent_given: Set(event.consent_given),
        timestamp: Set(timestamp),
        embed_attempts: Set(0),
        embed_failed_at: Set(None),
    })
}

fn decode_metadata(event_id: &str, raw: Option<&str>) -> Metadata {
    match raw {
        None | Some("") => Metadata::new(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!("Event {} has unreadable metadata: {}", event_id, e);
            Metadata::new()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::ActiveValue;
    use serde_json::json;

    fn row(event_type: &str, metadata: Option<&str>) -> event::Model {
        event::Model {
            id: "e1".to_string(),
            page_id: "p1".to_string(),
            event_type: event_type.to_string(),
            visitor_hash: "f".repeat(64),
            user_agent: "ua".to_string(),
            metadata: metadata.map(String::from),
            consent_given: true,
            timestamp: Utc::now(),
            embed_attempts: 0,
            embed_failed_at: None,
        }
    }

    #[test]
    fn test_model_to_event() {
        let event = model_to_event(row("form_submit", Some(r#"{"form":"signup"}"#))).unwrap();
        assert_eq!(event.kind, EventKind::FormSubmit);
        assert_eq!(event.metadata.get("form"), Some(&json!("signup")));
    }

    #[test]
    fn test_unknown_kind_is_error() {
        assert!(model_to_event(row("scroll", None)).is_err());
    }

    #[test]
    fn test_unreadable_metadata_degrades_to_empty() {
        let event = model_to_event(row("click", Some("{not json"))).unwrap();
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_empty_metadata_stored_as_null() {
        let new_event = NewEvent {
            page_id: "p1".to_string(),
            kind: EventKind::Pageview,
            visitor_hash: "a".repeat(64),
            user_agent: "ua".to_string(),
            metadata: Metadata::new(),
            consent_given: false,
        };
        let active = new_event_to_active_model("e1", &new_event, Utc::now()).unwrap();
        assert_eq!(active.metadata, ActiveValue::Set(None));
        assert_eq!(active.event_type, ActiveValue::Set("pageview".to_string()));
    }
}
