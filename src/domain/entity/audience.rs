use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// StudentParent は生徒と保護者の紐付け。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentParent {
    pub student_id: String,
    pub parent_id: String,
}

/// RecipientGroup は受信者がどの経路で対象になったかを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientGroup {
    Student,
    Parent,
    Individual,
}

impl std::fmt::Display for RecipientGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "STUDENT"),
            Self::Parent => write!(f, "PARENT"),
            Self::Individual => write!(f, "INDIVIDUAL"),
        }
    }
}

impl RecipientGroup {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "STUDENT" => Ok(Self::Student),
            "PARENT" => Ok(Self::Parent),
            "INDIVIDUAL" => Ok(Self::Individual),
            _ => anyhow::bail!("invalid recipient group: {}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub group: RecipientGroup,
    pub student_id: Option<String>,
}

/// Audience は TargetGroup を解決した結果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Audience {
    pub students: Vec<String>,
    pub parents: Vec<StudentParent>,
    pub individuals: Vec<String>,
}

impl Audience {
    /// 生徒・保護者・個別指定の順で、最初の出現を残して重複を除いた受信者一覧を返す。
    pub fn recipients(&self) -> Vec<Recipient> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.students.len() + self.parents.len() + self.individuals.len());

        for student_id in &self.students {
            if seen.insert(student_id.as_str()) {
                out.push(Recipient {
                    user_id: student_id.clone(),
                    group: RecipientGroup::Student,
                    student_id: Some(student_id.clone()),
                });
            }
        }
        for sp in &self.parents {
            if seen.insert(sp.parent_id.as_str()) {
                out.push(Recipient {
                    user_id: sp.parent_id.clone(),
                    group: RecipientGroup::Parent,
                    student_id: Some(sp.student_id.clone()),
                });
            }
        }
        for user_id in &self.individuals {
            if seen.insert(user_id.as_str()) {
                out.push(Recipient {
                    user_id: user_id.clone(),
                    group: RecipientGroup::Individual,
                    student_id: None,
                });
            }
        }
        out
    }

    pub fn recipient_ids(&self) -> Vec<String> {
        self.recipients().into_iter().map(|r| r.user_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty() && self.parents.is_empty() && self.individuals.is_empty()
    }
}
