use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::entity::audience::StudentParent;
use crate::domain::service::{MembershipError, MembershipOracle};

#[derive(Debug, Default)]
struct OrgMembership {
    /// (course_id, student_id) を登録順に保持する。
    enrollments: Vec<(String, String)>,
    grades: HashMap<String, String>,
    locations: HashMap<String, Vec<String>>,
    classes: HashMap<String, Vec<String>>,
    parents: Vec<StudentParent>,
}

impl OrgMembership {
    fn students(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, student_id) in &self.enrollments {
            if !out.contains(student_id) {
                out.push(student_id.clone());
            }
        }
        out
    }
}

/// InMemoryMembershipOracle は membership 未設定時とテストで使う所属情報。
/// 結果は登録順で返すため、解決結果の順序が安定する。
#[derive(Debug, Default)]
pub struct InMemoryMembershipOracle {
    orgs: RwLock<BTreeMap<String, OrgMembership>>,
}

impl InMemoryMembershipOracle {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, org_id: &str, f: impl FnOnce(&mut OrgMembership)) {
        let mut orgs = self.orgs.write().unwrap_or_else(PoisonError::into_inner);
        f(orgs.entry(org_id.to_string()).or_default());
    }

    fn read<T>(&self, org_id: &str, f: impl FnOnce(&OrgMembership) -> T) -> T
    where
        T: Default,
    {
        let orgs = self.orgs.read().unwrap_or_else(PoisonError::into_inner);
        orgs.get(org_id).map(f).unwrap_or_default()
    }

    pub fn enroll(&self, org_id: &str, course_id: &str, student_id: &str) {
        self.update(org_id, |m| {
            let pair = (course_id.to_string(), student_id.to_string());
            if !m.enrollments.contains(&pair) {
                m.enrollments.push(pair);
            }
        });
    }

    pub fn assign_grade(&self, org_id: &str, student_id: &str, grade_id: &str) {
        self.update(org_id, |m| {
            m.grades.insert(student_id.to_string(), grade_id.to_string());
        });
    }

    pub fn assign_location(&self, org_id: &str, student_id: &str, location_id: &str) {
        self.update(org_id, |m| {
            m.locations
                .entry(student_id.to_string())
                .or_default()
                .push(location_id.to_string());
        });
    }

    pub fn assign_class(&self, org_id: &str, student_id: &str, class_id: &str) {
        self.update(org_id, |m| {
            m.classes
                .entry(student_id.to_string())
                .or_default()
                .push(class_id.to_string());
        });
    }

    pub fn link_parent(&self, org_id: &str, student_id: &str, parent_id: &str) {
        self.update(org_id, |m| {
            m.parents.push(StudentParent {
                student_id: student_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        });
    }

    fn narrow_by(
        &self,
        org_id: &str,
        student_ids: &[String],
        matches: impl Fn(&OrgMembership, &str) -> bool,
    ) -> Vec<String> {
        self.read(org_id, |m| {
            student_ids
                .iter()
                .filter(|id| matches(m, id))
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl MembershipOracle for InMemoryMembershipOracle {
    async fn students_in_org(&self, org_id: &str) -> Result<Vec<String>, MembershipError> {
        Ok(self.read(org_id, OrgMembership::students))
    }

    async fn students_in_courses(
        &self,
        org_id: &str,
        course_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        Ok(self.read(org_id, |m| {
            let mut out: Vec<String> = Vec::new();
            for (course_id, student_id) in &m.enrollments {
                if course_ids.contains(course_id) && !out.contains(student_id) {
                    out.push(student_id.clone());
                }
            }
            out
        }))
    }

    async fn students_by_grade(
        &self,
        org_id: &str,
        student_ids: &[String],
        grade_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        Ok(self.narrow_by(org_id, student_ids, |m, id| {
            m.grades.get(id).is_some_and(|g| grade_ids.contains(g))
        }))
    }

    async fn students_by_location(
        &self,
        org_id: &str,
        student_ids: &[String],
        location_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        Ok(self.narrow_by(org_id, student_ids, |m, id| {
            m.locations
                .get(id)
                .is_some_and(|locs| locs.iter().any(|l| location_ids.contains(l)))
        }))
    }

    async fn students_by_class(
        &self,
        org_id: &str,
        student_ids: &[String],
        class_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        Ok(self.narrow_by(org_id, student_ids, |m, id| {
            m.classes
                .get(id)
                .is_some_and(|classes| classes.iter().any(|c| class_ids.contains(c)))
        }))
    }

    async fn parents_of(
        &self,
        org_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<StudentParent>, MembershipError> {
        Ok(self.read(org_id, |m| {
            student_ids
                .iter()
                .flat_map(|sid| m.parents.iter().filter(move |p| &p.student_id == sid))
                .cloned()
                .collect()
        }))
    }
}
