use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::entity::audience::StudentParent;
use crate::domain::service::{MembershipError, MembershipOracle};
use crate::infrastructure::config::MembershipConfig;

#[derive(Debug, Deserialize)]
struct StudentIdsResponse {
    student_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ParentsResponse {
    pairs: Vec<StudentParent>,
}

#[derive(Debug, Serialize)]
struct NarrowRequest<'a> {
    student_ids: &'a [String],
    values: &'a [String],
}

/// HttpMembershipClient はユーザー管理サービスの REST API を MembershipOracle として使う。
pub struct HttpMembershipClient {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpMembershipClient {
    pub fn new(config: &MembershipConfig) -> Result<Self, MembershipError> {
        let base_url = url::Url::parse(&config.base_url)
            .map_err(|e| MembershipError::Rejected(format!("invalid base_url: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(MembershipError::Rejected(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| MembershipError::Unavailable(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, org_id: &str, path: &str) -> String {
        format!(
            "{}/api/v1/organizations/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            org_id,
            path
        )
    }

    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, MembershipError>
    where
        B: Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| MembershipError::Unavailable(e.to_string()))?;
        Self::decode(resp).await
    }

    async fn decode<R: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<R, MembershipError> {
        let status = resp.status();
        if status.is_server_error() {
            return Err(MembershipError::Unavailable(format!(
                "membership service returned {status}"
            )));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MembershipError::Rejected(format!("{status}: {body}")));
        }
        resp.json::<R>()
            .await
            .map_err(|e| MembershipError::Rejected(format!("invalid response: {e}")))
    }

    async fn narrow(
        &self,
        org_id: &str,
        path: &str,
        student_ids: &[String],
        values: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        let url = self.endpoint(org_id, path);
        let resp: StudentIdsResponse = self
            .post(&url, &NarrowRequest { student_ids, values })
            .await?;
        Ok(resp.student_ids)
    }
}

#[async_trait]
impl MembershipOracle for HttpMembershipClient {
    async fn students_in_org(&self, org_id: &str) -> Result<Vec<String>, MembershipError> {
        let url = self.endpoint(org_id, "students");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MembershipError::Unavailable(e.to_string()))?;
        let body: StudentIdsResponse = Self::decode(resp).await?;
        Ok(body.student_ids)
    }

    async fn students_in_courses(
        &self,
        org_id: &str,
        course_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        let url = self.endpoint(org_id, "students/by-course");
        let resp: StudentIdsResponse = self
            .post(&url, &serde_json::json!({ "course_ids": course_ids }))
            .await?;
        Ok(resp.student_ids)
    }

    async fn students_by_grade(
        &self,
        org_id: &str,
        student_ids: &[String],
        grade_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        self.narrow(org_id, "students/by-grade", student_ids, grade_ids)
            .await
    }

    async fn students_by_location(
        &self,
        org_id: &str,
        student_ids: &[String],
        location_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        self.narrow(org_id, "students/by-location", student_ids, location_ids)
            .await
    }

    async fn students_by_class(
        &self,
        org_id: &str,
        student_ids: &[String],
        class_ids: &[String],
    ) -> Result<Vec<String>, MembershipError> {
        self.narrow(org_id, "students/by-class", student_ids, class_ids)
            .await
    }

    async fn parents_of(
        &self,
        org_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<StudentParent>, MembershipError> {
        let url = self.endpoint(org_id, "parents");
        let resp: ParentsResponse = self
            .post(&url, &serde_json::json!({ "student_ids": student_ids }))
            .await?;
        Ok(resp.pairs)
    }
}
