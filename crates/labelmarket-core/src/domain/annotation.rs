//! Annotation history: raw submissions plus one normalized document per task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::LeaseError;
use super::ids::{AnnotationId, TaskId, UserId};

/// Annotation document as handed in by the labeler.
///
/// The core does not know the label schema (boxes, polygons, classes...).
/// It only refuses an absent document; everything else is the label set's
/// business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationPayload(serde_json::Value);

impl AnnotationPayload {
    pub fn new(value: serde_json::Value) -> Result<Self, LeaseError> {
        if value.is_null() {
            return Err(LeaseError::invalid_input("annotation payload must not be null"));
        }
        Ok(Self(value))
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// One submitted payload for a task.
///
/// Append-only: a task collects one of these per submission, so re-work after
/// a QC rejection keeps the earlier attempts around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRaw {
    pub id: AnnotationId,
    pub task_id: TaskId,
    pub labeler_user_id: UserId,
    pub payload_json: AnnotationPayload,
    pub created_at: DateTime<Utc>,
}

impl AnnotationRaw {
    pub fn new(
        id: AnnotationId,
        task_id: TaskId,
        labeler_user_id: UserId,
        payload_json: AnnotationPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            labeler_user_id,
            payload_json,
            created_at,
        }
    }
}

/// Cleaned-up annotation of a task, kept as a single revisable document.
///
/// `version` starts at 1 and goes up by one on every rewrite. The store also
/// uses it as the row version for concurrent upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationNormalized {
    pub task_id: TaskId,

    /// Whoever normalized it first.
    pub labeler_user_id: UserId,

    pub normalized_json: AnnotationPayload,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnnotationNormalized {
    pub fn new(
        task_id: TaskId,
        labeler_user_id: UserId,
        normalized_json: AnnotationPayload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            labeler_user_id,
            normalized_json,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the document and bump the version.
    pub fn rewrite(&mut self, normalized_json: AnnotationPayload, now: DateTime<Utc>) {
        self.normalized_json = normalized_json;
        self.version += 1;
        self.updated_at = now;
    }
}

/// Everything recorded for a task's annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskAnnotations {
    /// Newest first.
    pub raw: Vec<AnnotationRaw>,
    pub normalized: Option<AnnotationNormalized>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_payload_is_rejected() {
        let err = AnnotationPayload::new(serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, LeaseError::InvalidInput(_)));
    }

    #[test]
    fn payload_is_kept_verbatim() {
        let doc = json!({"boxes": [{"x": 1, "y": 2, "w": 3, "h": 4, "label": "cat"}]});
        let payload = AnnotationPayload::new(doc.clone()).unwrap();

        assert_eq!(payload.as_json(), &doc);
        assert_eq!(serde_json::to_value(&payload).unwrap(), doc);
    }

    #[test]
    fn rewrite_bumps_version_and_keeps_author() {
        let created = Utc::now();
        let author = UserId::random();
        let mut doc = AnnotationNormalized::new(
            TaskId::random(),
            author,
            AnnotationPayload::new(json!({"label": "cat"})).unwrap(),
            created,
        );
        assert_eq!(doc.version, 1);

        let later = created + chrono::Duration::minutes(1);
        doc.rewrite(AnnotationPayload::new(json!({"label": "dog"})).unwrap(), later);

        assert_eq!(doc.version, 2);
        assert_eq!(doc.labeler_user_id, author);
        assert_eq!(doc.normalized_json.as_json(), &json!({"label": "dog"}));
        assert_eq!((doc.created_at, doc.updated_at), (created, later));
    }
}
