use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub source: String,
    pub chapter: Option<String>,
    pub topic: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchFilters {
    pub source: Option<String>,
    pub language: Option<String>,
    pub topic: Option<String>,
    pub chapter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    pub chapter: Option<String>,
    pub topic: Option<String>,
    pub language: Option<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Relevance in [0, 1], computed as 1 - cosine distance.
    pub score: f64,
}

/// Citation carried back to callers alongside chat and recommendation
/// responses. A trimmed view of [`SearchResult`] without the passage body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitedSource {
    pub id: String,
    pub title: Option<String>,
    pub chapter: Option<String>,
    pub topic: Option<String>,
    pub language: Option<String>,
    pub source: Option<String>,
    pub score: f64,
}

impl From<&SearchResult> for CitedSource {
    fn from(result: &SearchResult) -> Self {
        Self {
            id: result.id.clone(),
            title: result.title.clone(),
            chapter: result.chapter.clone(),
            topic: result.topic.clone(),
            language: result.language.clone(),
            source: result.source.clone(),
            score: result.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub id: String,
    pub query_hash: String,
    pub query_text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub user_id: Option<String>,
    pub is_guest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRecord {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub sources: Vec<CitedSource>,
    pub context: String,
    pub is_safe: bool,
    pub refusal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Externally computed summary of the requesting user, injected into
/// prompts as plain text. The engine never derives this itself.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserContextSummary {
    pub profile: Option<ProfileSummary>,
    pub plan: Option<PlanSummary>,
    pub recent: RecentActivity,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub gender: Option<String>,
    pub age: Option<u32>,
    pub height_cm: Option<f64>,
    pub current_weight_kg: Option<f64>,
    pub bmi_current: Option<f64>,
    pub activity_level: Option<String>,
    pub diet_goal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub daily_calorie_target: Option<u32>,
    pub protein_target: Option<u32>,
    pub carbs_target: Option<u32>,
    pub fat_target: Option<u32>,
    pub target_weight: Option<f64>,
    pub target_bmi: Option<f64>,
    pub plan_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub latest_weight_kg: Option<f64>,
    pub avg_calories_7d: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub source: String,
    pub language: String,
    pub dry_run: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            source: "nutrition_book".to_string(),
            language: "en".to_string(),
            dry_run: false,
        }
    }
}
