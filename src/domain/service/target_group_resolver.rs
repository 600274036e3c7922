use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::entity::audience::{Audience, StudentParent};
use crate::domain::entity::notification::Notification;
use crate::domain::entity::target_group::{SelectType, TargetFilter, TargetGroup, UserGroup};
use crate::domain::service::membership_oracle::{MembershipError, MembershipOracle};

/// TargetGroupResolver は TargetGroup を具体的な受信者集合に展開する。
/// ALL 選択は呼び出し時点の所属情報で解決し、結果はキャッシュしない。
pub struct TargetGroupResolver {
    oracle: Arc<dyn MembershipOracle>,
}

impl TargetGroupResolver {
    pub fn new(oracle: Arc<dyn MembershipOracle>) -> Self {
        Self { oracle }
    }

    pub async fn resolve_notification(
        &self,
        notification: &Notification,
    ) -> Result<Audience, MembershipError> {
        self.resolve(
            &notification.org_id,
            &notification.target_group,
            &notification.individual_receivers,
            &notification.excluded_receivers,
        )
        .await
    }

    pub async fn resolve(
        &self,
        org_id: &str,
        target_group: &TargetGroup,
        individual_receivers: &[String],
        excluded_receivers: &[String],
    ) -> Result<Audience, MembershipError> {
        let excluded: HashSet<&str> = excluded_receivers.iter().map(String::as_str).collect();

        let mut audience = Audience {
            individuals: dedup(individual_receivers.iter().cloned()),
            ..Default::default()
        };
        if target_group.selects_nobody() {
            return Ok(audience);
        }

        let students: Vec<String> = self
            .resolve_students(org_id, target_group)
            .await?
            .into_iter()
            .filter(|id| !excluded.contains(id.as_str()))
            .collect();
        if students.is_empty() {
            return Ok(audience);
        }

        let groups = &target_group.user_group_filter;
        if groups.includes(UserGroup::Parent) {
            let mut seen = HashSet::new();
            audience.parents = self
                .oracle
                .parents_of(org_id, &students)
                .await?
                .into_iter()
                .filter(|sp: &StudentParent| {
                    !excluded.contains(sp.parent_id.as_str()) && seen.insert(sp.parent_id.clone())
                })
                .collect();
        }
        if groups.includes(UserGroup::Student) {
            audience.students = students;
        }

        tracing::debug!(
            org_id = %org_id,
            students = audience.students.len(),
            parents = audience.parents.len(),
            individuals = audience.individuals.len(),
            "target group resolved"
        );
        Ok(audience)
    }

    /// コースフィルタで母集団を決め、学年・拠点・クラスの絞り込みを並行に実行して AND を取る。
    async fn resolve_students(
        &self,
        org_id: &str,
        target_group: &TargetGroup,
    ) -> Result<Vec<String>, MembershipError> {
        let base = match target_group.course_filter.select_type {
            SelectType::None => return Ok(Vec::new()),
            SelectType::All => self.oracle.students_in_org(org_id).await?,
            SelectType::List => {
                self.oracle
                    .students_in_courses(org_id, &target_group.course_filter.values)
                    .await?
            }
        };
        let base = dedup(base);
        if base.is_empty() {
            return Ok(base);
        }

        let (by_grade, by_location, by_class) = tokio::try_join!(
            narrow(&target_group.grade_filter, |values| {
                self.oracle.students_by_grade(org_id, &base, values)
            }),
            narrow(&target_group.location_filter, |values| {
                self.oracle.students_by_location(org_id, &base, values)
            }),
            narrow(&target_group.class_filter, |values| {
                self.oracle.students_by_class(org_id, &base, values)
            }),
        )?;

        let narrowed = [by_grade, by_location, by_class]
            .into_iter()
            .flatten()
            .fold(base, |acc, members| {
                let members: HashSet<String> = members.into_iter().collect();
                acc.into_iter().filter(|id| members.contains(id)).collect()
            });
        Ok(narrowed)
    }
}

/// LIST 選択のときだけ lookup を実行する。NONE / ALL は絞り込みなし (None) を返す。
async fn narrow<'a, F, Fut>(
    filter: &'a TargetFilter,
    lookup: F,
) -> Result<Option<Vec<String>>, MembershipError>
where
    F: FnOnce(&'a [String]) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<String>, MembershipError>>,
{
    match filter.listed() {
        Some(values) => lookup(values).await.map(Some),
        None => Ok(None),
    }
}

fn dedup(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::repository::membership_in_memory::InMemoryMembershipOracle;
    use crate::domain::entity::target_group::UserGroupFilter;
    use crate::domain::service::membership_oracle::MockMembershipOracle;

    const ORG: &str = "org-1";

    fn oracle() -> Arc<InMemoryMembershipOracle> {
        let oracle = InMemoryMembershipOracle::new();
        oracle.enroll(ORG, "course-1", "s1");
        oracle.enroll(ORG, "course-1", "s2");
        oracle.enroll(ORG, "course-2", "s3");
        oracle.assign_grade(ORG, "s1", "grade-1");
        oracle.assign_grade(ORG, "s2", "grade-2");
        oracle.assign_grade(ORG, "s3", "grade-1");
        oracle.assign_location(ORG, "s1", "loc-1");
        oracle.assign_location(ORG, "s2", "loc-1");
        oracle.assign_location(ORG, "s3", "loc-2");
        oracle.assign_class(ORG, "s1", "class-a");
        oracle.link_parent(ORG, "s1", "p1");
        Arc::new(oracle)
    }

    fn group(course: TargetFilter, user_groups: Vec<UserGroup>) -> TargetGroup {
        TargetGroup {
            course_filter: course,
            user_group_filter: UserGroupFilter::new(user_groups),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_course_list_with_parents() {
        let resolver = TargetGroupResolver::new(oracle());
        let tg = group(
            TargetFilter::list(["course-1"]),
            vec![UserGroup::Student, UserGroup::Parent],
        );
        let audience = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert_eq!(audience.recipient_ids(), vec!["s1", "s2", "p1"]);
    }

    #[tokio::test]
    async fn test_parent_only_excludes_students() {
        let resolver = TargetGroupResolver::new(oracle());
        let tg = group(TargetFilter::list(["course-1"]), vec![UserGroup::Parent]);
        let audience = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert!(audience.students.is_empty());
        assert_eq!(audience.recipient_ids(), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_course_all_uses_whole_org() {
        let resolver = TargetGroupResolver::new(oracle());
        let tg = group(TargetFilter::all(), vec![UserGroup::Student]);
        let audience = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        let mut ids = audience.recipient_ids();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn test_all_reflects_current_membership() {
        let oracle = oracle();
        let resolver = TargetGroupResolver::new(oracle.clone());
        let tg = group(TargetFilter::all(), vec![UserGroup::Student]);

        let before = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        oracle.enroll(ORG, "course-3", "s4");
        let after = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert_eq!(before.students.len() + 1, after.students.len());
        assert!(after.students.contains(&"s4".to_string()));
    }

    #[tokio::test]
    async fn test_grade_list_is_subset_of_grade_all() {
        let resolver = TargetGroupResolver::new(oracle());
        let mut narrowed = group(TargetFilter::list(["course-1"]), vec![UserGroup::Student]);
        narrowed.grade_filter = TargetFilter::list(["grade-1"]);
        let mut wide = narrowed.clone();
        wide.grade_filter = TargetFilter::all();

        let narrowed = resolver.resolve(ORG, &narrowed, &[], &[]).await.unwrap();
        let wide = resolver.resolve(ORG, &wide, &[], &[]).await.unwrap();
        assert_eq!(narrowed.students, vec!["s1"]);
        assert_eq!(wide.students, vec!["s1", "s2"]);
        assert!(narrowed.students.iter().all(|s| wide.students.contains(s)));
    }

    #[tokio::test]
    async fn test_grade_is_conjunction_with_course() {
        let resolver = TargetGroupResolver::new(oracle());
        // s3 は grade-1 だが course-1 には所属していない
        let mut tg = group(TargetFilter::list(["course-1"]), vec![UserGroup::Student]);
        tg.grade_filter = TargetFilter::list(["grade-1"]);
        let audience = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert!(!audience.students.contains(&"s3".to_string()));
    }

    #[tokio::test]
    async fn test_location_and_class_narrow_together() {
        let resolver = TargetGroupResolver::new(oracle());
        let mut tg = group(TargetFilter::all(), vec![UserGroup::Student]);
        tg.location_filter = TargetFilter::list(["loc-1"]);
        let by_location = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert_eq!(by_location.students, vec!["s1", "s2"]);

        tg.class_filter = TargetFilter::list(["class-a"]);
        let by_both = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert_eq!(by_both.students, vec!["s1"]);
    }

    #[tokio::test]
    async fn test_individual_receivers_survive_none_selection() {
        let resolver = TargetGroupResolver::new(oracle());
        let tg = TargetGroup::default();
        let individuals = vec!["staff-1".to_string(), "s2".to_string(), "staff-1".to_string()];
        let audience = resolver.resolve(ORG, &tg, &individuals, &[]).await.unwrap();
        assert_eq!(audience.recipient_ids(), vec!["staff-1", "s2"]);
    }

    #[tokio::test]
    async fn test_excluded_receivers_only_affect_group_audience() {
        let resolver = TargetGroupResolver::new(oracle());
        let tg = group(
            TargetFilter::list(["course-1"]),
            vec![UserGroup::Student, UserGroup::Parent],
        );
        let excluded = vec!["s2".to_string(), "p1".to_string()];
        let individuals = vec!["p1".to_string()];
        let audience = resolver.resolve(ORG, &tg, &individuals, &excluded).await.unwrap();
        assert_eq!(audience.students, vec!["s1"]);
        assert!(audience.parents.is_empty());
        assert_eq!(audience.recipient_ids(), vec!["s1", "p1"]);
    }

    #[tokio::test]
    async fn test_none_course_skips_oracle() {
        let mock = MockMembershipOracle::new();
        let resolver = TargetGroupResolver::new(Arc::new(mock));
        let mut tg = TargetGroup::default();
        tg.grade_filter = TargetFilter::list(["grade-1"]);
        tg.user_group_filter = UserGroupFilter::new(vec![UserGroup::Student]);
        let audience = resolver.resolve(ORG, &tg, &[], &[]).await.unwrap();
        assert!(audience.is_empty());
    }

    #[tokio::test]
    async fn test_oracle_failure_is_propagated() {
        let mut mock = MockMembershipOracle::new();
        mock.expect_students_in_courses()
            .returning(|_, _| Ok(vec!["s1".to_string()]));
        mock.expect_students_by_grade()
            .returning(|_, _, _| Err(MembershipError::Unavailable("timeout".to_string())));

        let resolver = TargetGroupResolver::new(Arc::new(mock));
        let mut tg = group(TargetFilter::list(["course-1"]), vec![UserGroup::Student]);
        tg.grade_filter = TargetFilter::list(["grade-1"]);
        let result = resolver.resolve(ORG, &tg, &[], &[]).await;
        assert!(matches!(result, Err(MembershipError::Unavailable(_))));
    }
}
