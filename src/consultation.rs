use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::stream::StreamSnapshot;

/// Shown in place of a reply when the response stream fails mid-answer.
/// Partial output is dropped rather than presented as legal advice.
pub const STREAM_FAILURE_NOTICE: &str =
    "죄송합니다, 답변 생성 중 오류가 발생했습니다. 잠시 후 다시 시도해주세요.";

/// Shown when a consultation cannot establish an AI session.
pub const SESSION_INIT_FAILURE_NOTICE: &str =
    "⚠️ 시스템 오류: 보안 키가 설정되지 않았거나 연결에 실패했습니다. 관리자에게 문의하세요.";

const NEW_CONSULTATION_TITLE: &str = "새로운 법률 상담";
const NEW_CONSULTATION_CATEGORY: &str = "일반";
const NEW_CONSULTATION_SUMMARY: &str = "상담이 시작되지 않았습니다.";

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A file the user attached to a message, carried as a base64 data URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    /// The base64 payload half of the data URL, without the metadata prefix.
    pub fn payload(&self) -> Option<&str> {
        self.data.split_once(',').map(|(_, payload)| payload)
    }
}

/// A web page the model cited while answering, deduplicated by URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

/// One turn in a consultation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl ChatMessage {
    fn user(content: String, attachments: Vec<Attachment>) -> Self {
        Self {
            role: Role::User,
            content,
            attachments,
            sources: Vec::new(),
        }
    }

    fn model(content: String) -> Self {
        Self {
            role: Role::Model,
            content,
            attachments: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// A consultation thread with its ordered message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: String,
    pub title: String,
    pub category: String,
    pub date: String,
    pub summary: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("message text and attachments are both empty")]
    EmptyMessage,
    #[error("no consultation with id {0}")]
    UnknownConsultation(String),
}

/// In-memory collection of consultations plus the active selection.
///
/// History is not persisted anywhere yet; all storage concerns stay behind
/// this type so a durable backend can replace the Vec later.
pub struct ConsultationStore {
    consultations: Vec<Consultation>,
    active_id: Option<String>,
}

impl ConsultationStore {
    pub fn new() -> Self {
        Self {
            consultations: Vec::new(),
            active_id: None,
        }
    }

    /// A store pre-seeded with sample history so the sidebar is not empty on
    /// first run.
    pub fn with_seed_history() -> Self {
        let mut store = Self::new();
        store.consultations = seed_consultations();
        store
    }

    /// Creates a fresh consultation, inserts it at the front of the list and
    /// makes it active. Returns its id.
    pub fn new_consultation(&mut self) -> String {
        let consultation = Consultation {
            id: Uuid::new_v4().to_string(),
            title: NEW_CONSULTATION_TITLE.to_string(),
            category: NEW_CONSULTATION_CATEGORY.to_string(),
            date: Local::now().format("%Y-%m-%d").to_string(),
            summary: NEW_CONSULTATION_SUMMARY.to_string(),
            messages: Vec::new(),
        };
        let id = consultation.id.clone();
        self.consultations.insert(0, consultation);
        self.active_id = Some(id.clone());
        id
    }

    /// Activates the consultation with the given id. Unknown ids are ignored;
    /// selection always comes from this store's own listing.
    pub fn select(&mut self, id: &str) {
        if self.consultations.iter().any(|c| c.id == id) {
            self.active_id = Some(id.to_string());
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<&Consultation> {
        let id = self.active_id.as_deref()?;
        self.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&Consultation> {
        self.consultations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Consultation> {
        self.consultations.iter_mut().find(|c| c.id == id)
    }

    pub fn consultations(&self) -> &[Consultation] {
        &self.consultations
    }

    /// Appends a user turn. At least one of text / attachments must be
    /// non-empty; nothing is mutated otherwise.
    pub fn append_user_message(
        &mut self,
        id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), StoreError> {
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(StoreError::EmptyMessage);
        }
        let consultation = self
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConsultation(id.to_string()))?;
        consultation
            .messages
            .push(ChatMessage::user(text.to_string(), attachments));
        Ok(())
    }

    /// Appends the empty model message a response stream will fill in.
    pub fn append_model_placeholder(&mut self, id: &str) -> Result<(), StoreError> {
        let consultation = self
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConsultation(id.to_string()))?;
        consultation.messages.push(ChatMessage::model(String::new()));
        Ok(())
    }

    /// Appends a standalone model notice (e.g. a session-init warning).
    pub fn append_model_notice(&mut self, id: &str, text: &str) -> Result<(), StoreError> {
        let consultation = self
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownConsultation(id.to_string()))?;
        consultation.messages.push(ChatMessage::model(text.to_string()));
        Ok(())
    }

    /// Folds a stream snapshot into the last message of the consultation the
    /// stream was started for. A no-op when that consultation no longer
    /// exists or its last message is not a model turn, so an in-flight stream
    /// can never write into the wrong conversation.
    pub fn update_streaming_message(&mut self, id: &str, snapshot: &StreamSnapshot) {
        let Some(consultation) = self.get_mut(id) else {
            return;
        };
        let Some(last) = consultation.messages.last_mut() else {
            return;
        };
        if last.role != Role::Model {
            return;
        }
        last.content = snapshot.text.clone();
        if !snapshot.sources.is_empty() {
            last.sources = snapshot.sources.clone();
        }
    }

    /// Replaces whatever the failed stream had accumulated with the fixed
    /// fallback notice. Partial answers are not kept.
    pub fn fail_streaming_message(&mut self, id: &str) {
        let Some(consultation) = self.get_mut(id) else {
            return;
        };
        match consultation.messages.last_mut() {
            Some(last) if last.role == Role::Model => {
                last.content = STREAM_FAILURE_NOTICE.to_string();
                last.sources.clear();
            }
            _ => consultation
                .messages
                .push(ChatMessage::model(STREAM_FAILURE_NOTICE.to_string())),
        }
    }

    /// Consultations grouped by category: categories in first-seen order,
    /// insertion order within each. Recomputed on demand, never stored.
    pub fn grouped(&self) -> Vec<(&str, Vec<&Consultation>)> {
        let mut groups: Vec<(&str, Vec<&Consultation>)> = Vec::new();
        for consultation in &self.consultations {
            match groups
                .iter_mut()
                .find(|(category, _)| *category == consultation.category)
            {
                Some((_, members)) => members.push(consultation),
                None => groups.push((consultation.category.as_str(), vec![consultation])),
            }
        }
        groups
    }
}

impl Default for ConsultationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn seed_consultations() -> Vec<Consultation> {
    vec![
        Consultation {
            id: "1".to_string(),
            title: "임대차 계약 분쟁".to_string(),
            category: "부동산/임대차".to_string(),
            date: "2024-07-28".to_string(),
            summary: "보증금 반환 문제 관련".to_string(),
            messages: vec![
                ChatMessage::user(
                    "안녕하세요. 전세 보증금 반환 문제로 상담하고 싶습니다.".to_string(),
                    Vec::new(),
                ),
                ChatMessage::model(
                    "안녕하세요, Ai 무료 법률 비서입니다. 어떤 상황이신지 자세히 말씀해주시겠어요?"
                        .to_string(),
                ),
            ],
        },
        Consultation {
            id: "2".to_string(),
            title: "폭행 사건 고소".to_string(),
            category: "형사/고소".to_string(),
            date: "2024-07-25".to_string(),
            summary: "증거 자료 및 절차 문의".to_string(),
            messages: Vec::new(),
        },
        Consultation {
            id: "3".to_string(),
            title: "온라인 명예훼손".to_string(),
            category: "사이버/명예훼손".to_string(),
            date: "2024-07-22".to_string(),
            summary: "악성 댓글 대응 방안".to_string(),
            messages: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(text: &str, sources: Vec<Source>) -> StreamSnapshot {
        StreamSnapshot {
            text: text.to_string(),
            sources,
        }
    }

    #[test]
    fn new_consultation_goes_to_front_and_becomes_active() {
        let mut store = ConsultationStore::with_seed_history();
        let id = store.new_consultation();
        assert_eq!(store.consultations()[0].id, id);
        assert_eq!(store.active_id(), Some(id.as_str()));
        assert!(store.active().unwrap().messages.is_empty());
    }

    #[test]
    fn select_unknown_id_is_a_no_op() {
        let mut store = ConsultationStore::with_seed_history();
        store.select("2");
        store.select("does-not-exist");
        assert_eq!(store.active_id(), Some("2"));
    }

    #[test]
    fn empty_send_is_rejected_before_any_mutation() {
        let mut store = ConsultationStore::with_seed_history();
        let err = store
            .append_user_message("2", "   ", Vec::new())
            .unwrap_err();
        assert_eq!(err, StoreError::EmptyMessage);
        assert!(store.get("2").unwrap().messages.is_empty());
    }

    #[test]
    fn attachment_only_send_is_accepted() {
        let mut store = ConsultationStore::with_seed_history();
        let attachment = Attachment {
            name: "계약서.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: "data:application/pdf;base64,AAAA".to_string(),
        };
        store
            .append_user_message("2", "", vec![attachment])
            .unwrap();
        assert_eq!(store.get("2").unwrap().messages.len(), 1);
    }

    #[test]
    fn streaming_update_targets_only_the_last_model_message() {
        let mut store = ConsultationStore::with_seed_history();
        store.append_user_message("2", "첫 질문", Vec::new()).unwrap();
        store.append_model_placeholder("2").unwrap();
        store.update_streaming_message("2", &snapshot("첫 답변", Vec::new()));
        store.append_user_message("2", "둘째 질문", Vec::new()).unwrap();
        store.append_model_placeholder("2").unwrap();
        for text in ["둘", "둘째", "둘째 답변"] {
            store.update_streaming_message("2", &snapshot(text, Vec::new()));
        }

        let messages = &store.get("2").unwrap().messages;
        assert_eq!(messages[1].content, "첫 답변");
        assert_eq!(messages[3].content, "둘째 답변");
    }

    #[test]
    fn streaming_update_for_missing_consultation_is_a_no_op() {
        let mut store = ConsultationStore::with_seed_history();
        store.update_streaming_message("gone", &snapshot("유령", Vec::new()));
        assert!(store.get("gone").is_none());
    }

    #[test]
    fn streaming_update_never_touches_a_user_message() {
        let mut store = ConsultationStore::with_seed_history();
        store.append_user_message("3", "질문", Vec::new()).unwrap();
        store.update_streaming_message("3", &snapshot("덮어쓰기 시도", Vec::new()));
        assert_eq!(store.get("3").unwrap().messages[0].content, "질문");
    }

    #[test]
    fn failed_stream_discards_partial_text() {
        let mut store = ConsultationStore::with_seed_history();
        store.append_user_message("2", "고소장 초안", Vec::new()).unwrap();
        store.append_model_placeholder("2").unwrap();
        store.update_streaming_message("2", &snapshot("초안 작성 중", Vec::new()));
        store.fail_streaming_message("2");

        let last = store.get("2").unwrap().messages.last().unwrap();
        assert_eq!(last.content, STREAM_FAILURE_NOTICE);
        assert!(last.sources.is_empty());
    }

    #[test]
    fn grouping_preserves_first_seen_category_order() {
        let mut store = ConsultationStore::with_seed_history();
        let id = store.new_consultation();
        let groups = store.grouped();
        // The fresh consultation sits at the front, so its category leads.
        assert_eq!(groups[0].0, "일반");
        assert_eq!(groups[0].1[0].id, id);
        assert_eq!(groups[1].0, "부동산/임대차");
        assert_eq!(groups[2].0, "형사/고소");
        assert_eq!(groups[3].0, "사이버/명예훼손");
    }

    #[test]
    fn attachment_payload_strips_the_metadata_prefix() {
        let attachment = Attachment {
            name: "증거.png".to_string(),
            mime_type: "image/png".to_string(),
            data: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        };
        assert_eq!(attachment.payload(), Some("iVBORw0KGgo="));
    }
}
