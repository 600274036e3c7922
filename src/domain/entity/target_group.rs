use serde::{Deserialize, Serialize};

/// SelectType はターゲットフィルタの選択種別を表す。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectType {
    #[default]
    None,
    All,
    List,
}

impl std::fmt::Display for SelectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::All => write!(f, "ALL"),
            Self::List => write!(f, "LIST"),
        }
    }
}

impl SelectType {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "NONE" => Ok(Self::None),
            "ALL" => Ok(Self::All),
            "LIST" => Ok(Self::List),
            _ => anyhow::bail!("invalid select type: {}", s),
        }
    }
}

/// TargetFilter はコース・学年・拠点・クラスいずれかの絞り込み条件。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TargetFilter {
    #[serde(default)]
    pub select_type: SelectType,
    #[serde(default)]
    pub values: Vec<String>,
}

impl TargetFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            select_type: SelectType::All,
            values: Vec::new(),
        }
    }

    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            select_type: SelectType::List,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// LIST 選択時のみ値を返す。NONE / ALL は絞り込みを行わない。
    pub fn listed(&self) -> Option<&[String]> {
        match self.select_type {
            SelectType::List => Some(&self.values),
            SelectType::None | SelectType::All => None,
        }
    }
}

/// UserGroup は通知を受け取るロール。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserGroup {
    Student,
    Parent,
}

impl std::fmt::Display for UserGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "STUDENT"),
            Self::Parent => write!(f, "PARENT"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UserGroupFilter {
    #[serde(default)]
    pub user_groups: Vec<UserGroup>,
}

impl UserGroupFilter {
    pub fn new(user_groups: Vec<UserGroup>) -> Self {
        Self { user_groups }
    }

    pub fn includes(&self, group: UserGroup) -> bool {
        self.user_groups.contains(&group)
    }
}

/// TargetGroup は通知の対象者を決める複合フィルタ。
/// コースフィルタで母集団を決め、学年・拠点・クラスで AND 条件として絞り込む。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TargetGroup {
    #[serde(default)]
    pub course_filter: TargetFilter,
    #[serde(default)]
    pub grade_filter: TargetFilter,
    #[serde(default)]
    pub location_filter: TargetFilter,
    #[serde(default)]
    pub class_filter: TargetFilter,
    #[serde(default)]
    pub user_group_filter: UserGroupFilter,
}

impl TargetGroup {
    /// フィルタ経由で誰も選択され得ない場合に true を返す。
    pub fn selects_nobody(&self) -> bool {
        self.course_filter.select_type == SelectType::None
            || self.user_group_filter.user_groups.is_empty()
    }

    /// 各フィルタと名前の組を返す。バリデーションのエラー表示に使う。
    pub fn named_filters(&self) -> [(&'static str, &TargetFilter); 4] {
        [
            ("target_group.course_filter", &self.course_filter),
            ("target_group.grade_filter", &self.grade_filter),
            ("target_group.location_filter", &self.location_filter),
            ("target_group.class_filter", &self.class_filter),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listed_only_for_list() {
        assert!(TargetFilter::none().listed().is_none());
        assert!(TargetFilter::all().listed().is_none());
        let filter = TargetFilter::list(["c1", "c2"]);
        assert_eq!(filter.listed(), Some(&["c1".to_string(), "c2".to_string()][..]));
    }

    #[test]
    fn test_select_type_display_and_parse() {
        assert_eq!(SelectType::None.to_string(), "NONE");
        assert_eq!(SelectType::All.to_string(), "ALL");
        assert_eq!(SelectType::List.to_string(), "LIST");
        assert_eq!(SelectType::from_str_value("LIST").unwrap(), SelectType::List);
        assert!(SelectType::from_str_value("SOME").is_err());
    }

    #[test]
    fn test_default_target_group_selects_nobody() {
        assert!(TargetGroup::default().selects_nobody());

        let tg = TargetGroup {
            course_filter: TargetFilter::all(),
            user_group_filter: UserGroupFilter::new(vec![UserGroup::Student]),
            ..Default::default()
        };
        assert!(!tg.selects_nobody());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let tg: TargetGroup = serde_json::from_value(serde_json::json!({
            "course_filter": {"select_type": "LIST", "values": ["course-1"]},
            "user_group_filter": {"user_groups": ["STUDENT", "PARENT"]}
        }))
        .unwrap();
        assert_eq!(tg.course_filter, TargetFilter::list(["course-1"]));
        assert_eq!(tg.grade_filter.select_type, SelectType::None);
        assert!(tg.user_group_filter.includes(UserGroup::Parent));
    }
}
