//! In-memory persistence: users, documents, sessions, messages, progress.
//!
//! Every read is scoped by owner id so one user never sees another's data.
//! Messages are append-only and only disappear with their session; progress is
//! one-to-one with a session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::MessageType;
use crate::progress::{compute_time_spent, SessionFigures};
use crate::session::SessionState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub filename: String,
    pub mime: String,
    pub size_bytes: usize,
    #[serde(skip_serializing)]
    pub content: String,
    pub topics: Vec<String>,
    pub concepts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewDocument {
    pub title: String,
    pub filename: String,
    pub mime: String,
    pub size_bytes: usize,
    pub content: String,
    pub topics: Vec<String>,
    pub concepts: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub pdf_id: String,
    pub title: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub state: Option<SessionState>,
}

impl SessionRecord {
    pub fn time_spent_minutes(&self) -> f64 {
        compute_time_spent(self.started_at, Some(self.ended_at.unwrap_or(self.updated_at)))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub status: Option<SessionStatus>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub session_id: String,
    pub questions_asked: u32,
    pub correct_answers: u32,
    pub hints_used: u32,
    pub thinking_score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            questions_asked: 0,
            correct_answers: 0,
            hints_used: 0,
            thinking_score: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Default)]
pub struct Store {
    users: RwLock<HashMap<String, User>>,
    documents: RwLock<HashMap<String, Document>>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
    progress: RwLock<HashMap<String, Progress>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // --- users ---

    #[instrument(level = "debug", skip(self, password_hash))]
    pub async fn create_user(&self, email: &str, name: &str, password_hash: String) -> Result<User, StoreError> {
        let email = email.trim().to_lowercase();
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!("email already registered: {email}")));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            name: name.trim().to_string(),
            password_hash,
            created_at: Utc::now(),
        };
        users.insert(user.id.clone(), user.clone());
        info!(target: "socratic_tutor", user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Option<User> {
        let email = email.trim().to_lowercase();
        self.users.read().await.values().find(|u| u.email == email).cloned()
    }

    pub async fn get_user(&self, id: &str) -> Option<User> {
        self.users.read().await.get(id).cloned()
    }

    // --- documents ---

    pub async fn insert_document(&self, user_id: &str, doc: NewDocument) -> Document {
        let now = Utc::now();
        let d = Document {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: doc.title,
            filename: doc.filename,
            mime: doc.mime,
            size_bytes: doc.size_bytes,
            content: doc.content,
            topics: doc.topics,
            concepts: doc.concepts,
            created_at: now,
            updated_at: now,
        };
        self.documents.write().await.insert(d.id.clone(), d.clone());
        d
    }

    pub async fn list_documents(&self, user_id: &str) -> Vec<Document> {
        let mut docs: Vec<Document> =
            self.documents.read().await.values().filter(|d| d.user_id == user_id).cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }

    pub async fn get_document(&self, user_id: &str, id: &str) -> Result<Document, StoreError> {
        self.documents
            .read()
            .await
            .get(id)
            .filter(|d| d.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("pdf", id.to_string()))
    }

    pub async fn rename_document(&self, user_id: &str, id: &str, title: &str) -> Result<Document, StoreError> {
        let mut docs = self.documents.write().await;
        let d = docs
            .get_mut(id)
            .filter(|d| d.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound("pdf", id.to_string()))?;
        d.title = title.trim().to_string();
        d.updated_at = Utc::now();
        Ok(d.clone())
    }

    /// Delete a document and cascade to its sessions, their messages and progress.
    /// Returns the removed session ids.
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_document(&self, user_id: &str, id: &str) -> Result<Vec<String>, StoreError> {
        {
            let mut docs = self.documents.write().await;
            match docs.get(id) {
                Some(d) if d.user_id == user_id => {
                    docs.remove(id);
                }
                _ => return Err(StoreError::NotFound("pdf", id.to_string())),
            }
        }
        let removed: Vec<String> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions.values().filter(|s| s.pdf_id == id).map(|s| s.id.clone()).collect();
            for sid in &ids {
                sessions.remove(sid);
            }
            ids
        };
        let mut messages = self.messages.write().await;
        let mut progress = self.progress.write().await;
        for sid in &removed {
            messages.remove(sid);
            progress.remove(sid);
        }
        debug!(target: "socratic_tutor", pdf_id = %id, sessions = removed.len(), "Document deleted with cascade");
        Ok(removed)
    }

    // --- sessions ---

    pub async fn create_session(&self, user_id: &str, pdf_id: &str, title: Option<String>) -> Result<SessionRecord, StoreError> {
        let doc = self.get_document(user_id, pdf_id).await?;
        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            pdf_id: pdf_id.to_string(),
            title: title.filter(|t| !t.trim().is_empty()).unwrap_or(doc.title),
            status: SessionStatus::Active,
            started_at: now,
            updated_at: now,
            ended_at: None,
            state: None,
        };
        self.sessions.write().await.insert(record.id.clone(), record.clone());
        self.progress.write().await.insert(record.id.clone(), Progress::new(&record.id));
        Ok(record)
    }

    pub async fn list_sessions(&self, user_id: &str, pdf_id: Option<&str>) -> Vec<SessionRecord> {
        let mut out: Vec<SessionRecord> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && pdf_id.map_or(true, |p| s.pdf_id == p))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out
    }

    pub async fn get_session(&self, user_id: &str, id: &str) -> Result<SessionRecord, StoreError> {
        self.sessions
            .read()
            .await
            .get(id)
            .filter(|s| s.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("session", id.to_string()))
    }

    pub async fn update_session(&self, user_id: &str, id: &str, patch: SessionPatch) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.write().await;
        let s = sessions
            .get_mut(id)
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound("session", id.to_string()))?;
        let now = Utc::now();
        if let Some(title) = patch.title {
            s.title = title.trim().to_string();
        }
        if let Some(status) = patch.status {
            s.ended_at = match status {
                SessionStatus::Completed => s.ended_at.or(Some(now)),
                SessionStatus::Active => None,
            };
            s.status = status;
        }
        s.updated_at = now;
        Ok(s.clone())
    }

    /// Snapshot the dialogue state between turns.
    pub async fn save_state(&self, id: &str, state: SessionState) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let s = sessions.get_mut(id).ok_or_else(|| StoreError::NotFound("session", id.to_string()))?;
        s.state = Some(state);
        s.updated_at = Utc::now();
        Ok(())
    }

    // --- messages ---

    /// Fails once the session is gone, so a cascade delete leaves no orphaned messages.
    pub async fn append_message(&self, session_id: &str, kind: MessageType, content: &str) -> Result<Message, StoreError> {
        // Held across the insert; a concurrent delete either runs first or clears what we add.
        let sessions = self.sessions.read().await;
        if !sessions.contains_key(session_id) {
            return Err(StoreError::NotFound("session", session_id.to_string()));
        }
        let m = Message {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.messages.write().await.entry(session_id.to_string()).or_default().push(m.clone());
        Ok(m)
    }

    pub async fn messages(&self, session_id: &str) -> Vec<Message> {
        self.messages.read().await.get(session_id).cloned().unwrap_or_default()
    }

    // --- progress ---

    pub async fn progress(&self, session_id: &str) -> Option<Progress> {
        self.progress.read().await.get(session_id).cloned()
    }

    /// Mutate a session's progress in place and return the new value.
    pub async fn update_progress<F>(&self, session_id: &str, f: F) -> Result<Progress, StoreError>
    where
        F: FnOnce(&mut Progress),
    {
        let mut all = self.progress.write().await;
        let p = all.get_mut(session_id).ok_or_else(|| StoreError::NotFound("progress", session_id.to_string()))?;
        f(p);
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    /// Aggregation input for a user's sessions, optionally restricted to one document.
    pub async fn session_figures(&self, user_id: &str, pdf_id: Option<&str>) -> Vec<SessionFigures> {
        let sessions = self.list_sessions(user_id, pdf_id).await;
        let progress = self.progress.read().await;
        sessions
            .iter()
            .map(|s| {
                let p = progress.get(&s.id);
                SessionFigures {
                    questions_asked: p.map_or(0, |p| p.questions_asked),
                    correct_answers: p.map_or(0, |p| p.correct_answers),
                    hints_used: p.map_or(0, |p| p.hints_used),
                    thinking_score: p.and_then(|p| p.thinking_score),
                    time_spent_minutes: s.time_spent_minutes(),
                    completed: s.status == SessionStatus::Completed,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str) -> NewDocument {
        NewDocument {
            title: title.into(),
            filename: "lecture.txt".into(),
            mime: "text/plain".into(),
            size_bytes: 10,
            content: "Some lecture text.".into(),
            topics: vec!["A".into(), "B".into(), "C".into()],
            concepts: vec![],
        }
    }

    #[tokio::test]
    async fn duplicate_emails_conflict_case_insensitively() {
        let store = Store::new();
        store.create_user("Ada@Example.com", "Ada", "h".into()).await.unwrap();
        let err = store.create_user("ada@example.com", "Other", "h".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_user_by_email("ADA@example.com").await.is_some());
    }

    #[tokio::test]
    async fn documents_are_owner_scoped() {
        let store = Store::new();
        let d = store.insert_document("u1", doc("Thermo")).await;
        assert!(store.get_document("u1", &d.id).await.is_ok());
        assert!(matches!(store.get_document("u2", &d.id).await, Err(StoreError::NotFound(..))));
        assert!(store.list_documents("u2").await.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_document_cascades() {
        let store = Store::new();
        let d = store.insert_document("u1", doc("Thermo")).await;
        let s = store.create_session("u1", &d.id, None).await.unwrap();
        store.append_message(&s.id, MessageType::Intro, "hello").await.unwrap();

        let removed = store.delete_document("u1", &d.id).await.unwrap();
        assert_eq!(removed, vec![s.id.clone()]);
        assert!(store.get_session("u1", &s.id).await.is_err());
        assert!(store.messages(&s.id).await.is_empty());
        assert!(store.progress(&s.id).await.is_none());
    }

    #[tokio::test]
    async fn appending_to_a_deleted_session_is_not_found() {
        let store = Store::new();
        let d = store.insert_document("u1", doc("Thermo")).await;
        let s = store.create_session("u1", &d.id, None).await.unwrap();
        store.delete_document("u1", &d.id).await.unwrap();

        let err = store.append_message(&s.id, MessageType::UserAnswer, "late answer").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("session", _)));
        assert!(store.messages(&s.id).await.is_empty());
        assert!(matches!(
            store.append_message("no-such-session", MessageType::Intro, "hi").await,
            Err(StoreError::NotFound(..))
        ));
    }

    #[tokio::test]
    async fn sessions_start_with_zeroed_progress_and_document_title() {
        let store = Store::new();
        let d = store.insert_document("u1", doc("Thermo")).await;
        let s = store.create_session("u1", &d.id, Some("  ".into())).await.unwrap();
        assert_eq!(s.title, "Thermo");
        let p = store.progress(&s.id).await.unwrap();
        assert_eq!((p.questions_asked, p.correct_answers, p.hints_used), (0, 0, 0));
        assert!(p.thinking_score.is_none());
    }

    #[tokio::test]
    async fn completing_a_session_sets_end_time_once() {
        let store = Store::new();
        let d = store.insert_document("u1", doc("Thermo")).await;
        let s = store.create_session("u1", &d.id, None).await.unwrap();
        let done = store
            .update_session("u1", &s.id, SessionPatch { status: Some(SessionStatus::Completed), ..Default::default() })
            .await
            .unwrap();
        let ended = done.ended_at.unwrap();
        let again = store
            .update_session("u1", &s.id, SessionPatch { status: Some(SessionStatus::Completed), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(again.ended_at, Some(ended));
    }
}
