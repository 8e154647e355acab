use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub color: String,
    pub position: i32,
    /// Server-assigned insertion sequence, used only to break position ties.
    #[serde(skip_serializing)]
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Stage fields as supplied by a caller; `id` is `None` for new stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageDraft {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub color: String,
    pub position: i32,
}

/// Canonical ordering: position ascending, then insertion order.
pub fn sort_stages(stages: &mut [PipelineStage]) {
    stages.sort_by(|a, b| a.position.cmp(&b.position).then(a.seq.cmp(&b.seq)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, position: i32, seq: i64) -> PipelineStage {
        PipelineStage {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: name.to_string(),
            color: "#000000".to_string(),
            position,
            seq,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ties_fall_back_to_insertion_order() {
        let mut stages = vec![stage("c", 5, 3), stage("b", 1, 9), stage("a", 1, 2), stage("d", -4, 10)];
        sort_stages(&mut stages);
        let names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["d", "a", "b", "c"]);
    }
}
