use async_trait::async_trait;

use crate::domain::entity::audience::StudentParent;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("membership service unavailable: {0}")]
    Unavailable(String),

    #[error("membership lookup rejected: {0}")]
    Rejected(String),
}

/// MembershipOracle はコース・学年・拠点・クラスの所属情報を参照する読み取り専用の境界。
/// 絞り込み系のメソッドは入力 student_ids の部分集合を返す。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// 組織に在籍する全生徒。
    async fn students_in_org(&self, org_id: &str) -> Result<Vec<String>, MembershipError>;

    async fn students_in_courses(
        &self,
        org_id: &str,
        course_ids: &[String],
    ) -> Result<Vec<String>, MembershipError>;

    async fn students_by_grade(
        &self,
        org_id: &str,
        student_ids: &[String],
        grade_ids: &[String],
    ) -> Result<Vec<String>, MembershipError>;

    async fn students_by_location(
        &self,
        org_id: &str,
        student_ids: &[String],
        location_ids: &[String],
    ) -> Result<Vec<String>, MembershipError>;

    async fn students_by_class(
        &self,
        org_id: &str,
        student_ids: &[String],
        class_ids: &[String],
    ) -> Result<Vec<String>, MembershipError>;

    async fn parents_of(
        &self,
        org_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<StudentParent>, MembershipError>;
}
