//! Per-request options and the caller's security context.

use serde::{Deserialize, Serialize};

use crate::error::ApproachError;

/// Which search clauses a request issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Text,
    Vectors,
    #[default]
    Hybrid,
}

impl RetrievalMode {
    pub fn has_text(self) -> bool {
        matches!(self, Self::Text | Self::Hybrid)
    }

    pub fn has_vectors(self) -> bool {
        matches!(self, Self::Vectors | Self::Hybrid)
    }
}

/// Request overrides. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    /// Absent means hybrid.
    #[serde(default)]
    pub retrieval_mode: RetrievalMode,

    /// Passages to retrieve
    #[serde(default = "default_top")]
    pub top: usize,

    #[serde(default)]
    pub semantic_ranker: bool,

    #[serde(default)]
    pub semantic_captions: bool,

    #[serde(default)]
    pub suggest_followup_questions: bool,

    /// Advisory; logged, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_search_score: Option<f64>,

    /// Advisory; logged, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_reranker_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_category: Option<String>,

    #[serde(default)]
    pub use_oid_security_filter: bool,

    #[serde(default)]
    pub use_groups_security_filter: bool,

    /// Replaces the answer instructions, or extends them when prefixed with `>>>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    /// Answer temperature; the configured default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_top() -> usize {
    3
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            retrieval_mode: RetrievalMode::default(),
            top: default_top(),
            semantic_ranker: false,
            semantic_captions: false,
            suggest_followup_questions: false,
            minimum_search_score: None,
            minimum_reranker_score: None,
            selected_category: None,
            use_oid_security_filter: false,
            use_groups_security_filter: false,
            prompt_template: None,
            temperature: None,
        }
    }
}

impl Overrides {
    /// The category to filter on. Blank and `"none"` mean no category.
    pub fn category(&self) -> Option<&str> {
        self.selected_category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
    }
}

/// Identity claims supplied by the caller's authentication layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,

    #[serde(default)]
    pub groups: Vec<String>,
}

/// Document-level access restriction for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityScope {
    /// Only documents owned by this object id.
    Owner(String),
    /// Documents readable by any of these groups.
    Groups(Vec<String>),
}

impl SecurityScope {
    /// Resolve the scope selected by the override flags.
    ///
    /// The two filters are alternatives; requesting both is rejected. A
    /// missing oid scopes to the empty owner, which matches no owned
    /// document.
    pub fn resolve(overrides: &Overrides, claims: &AuthClaims) -> Result<Option<Self>, ApproachError> {
        match (overrides.use_oid_security_filter, overrides.use_groups_security_filter) {
            (true, true) => Err(ApproachError::InvalidOverrides(
                "use_oid_security_filter and use_groups_security_filter are mutually exclusive".into(),
            )),
            (true, false) => Ok(Some(Self::Owner(claims.oid.clone().unwrap_or_default()))),
            (false, true) => Ok(Some(Self::Groups(claims.groups.clone()))),
            (false, false) => Ok(None),
        }
    }

    /// The OData clause for this scope. An empty group list yields none.
    pub fn clause(&self) -> Option<String> {
        match self {
            Self::Owner(oid) => Some(format!("oid eq '{}'", escape_literal(oid))),
            Self::Groups(groups) if groups.is_empty() => None,
            Self::Groups(groups) => Some(
                groups
                    .iter()
                    .map(|g| format!("search.ismatch(\"{}\")", g.replace('\\', "\\\\").replace('"', "\\\"")))
                    .collect::<Vec<_>>()
                    .join(" or "),
            ),
        }
    }
}

/// Escape a value for a single-quoted OData literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let o: Overrides = serde_json::from_str("{}").unwrap();
        assert_eq!(o, Overrides::default());
        assert_eq!(o.top, 3);
        assert_eq!(o.retrieval_mode, RetrievalMode::Hybrid);
        assert!(o.temperature.is_none());
    }

    #[test]
    fn unknown_keys_ignored() {
        let o: Overrides =
            serde_json::from_str(r#"{"retrieval_mode":"text","exclude_category":"x","top":5}"#).unwrap();
        assert_eq!(o.retrieval_mode, RetrievalMode::Text);
        assert_eq!(o.top, 5);
    }

    #[test]
    fn retrieval_mode_flags() {
        assert!(RetrievalMode::Text.has_text() && !RetrievalMode::Text.has_vectors());
        assert!(!RetrievalMode::Vectors.has_text() && RetrievalMode::Vectors.has_vectors());
        assert!(RetrievalMode::Hybrid.has_text() && RetrievalMode::Hybrid.has_vectors());
    }

    #[test]
    fn category_ignores_blank_and_none() {
        let mut o = Overrides::default();
        assert_eq!(o.category(), None);
        o.selected_category = Some("None".into());
        assert_eq!(o.category(), None);
        o.selected_category = Some("  ".into());
        assert_eq!(o.category(), None);
        o.selected_category = Some("benefits".into());
        assert_eq!(o.category(), Some("benefits"));
    }

    #[test]
    fn owner_scope() {
        let o = Overrides { use_oid_security_filter: true, ..Overrides::default() };
        let claims = AuthClaims { oid: Some("abc".into()), groups: vec![] };
        let scope = SecurityScope::resolve(&o, &claims).unwrap().unwrap();
        assert_eq!(scope.clause().unwrap(), "oid eq 'abc'");
    }

    #[test]
    fn groups_scope_is_disjunction() {
        let o = Overrides { use_groups_security_filter: true, ..Overrides::default() };
        let claims = AuthClaims { oid: None, groups: vec!["g1".into(), "g2".into()] };
        let scope = SecurityScope::resolve(&o, &claims).unwrap().unwrap();
        assert_eq!(
            scope.clause().unwrap(),
            r#"search.ismatch("g1") or search.ismatch("g2")"#
        );
    }

    #[test]
    fn both_flags_rejected() {
        let o = Overrides {
            use_oid_security_filter: true,
            use_groups_security_filter: true,
            ..Overrides::default()
        };
        assert!(matches!(
            SecurityScope::resolve(&o, &AuthClaims::default()),
            Err(ApproachError::InvalidOverrides(_))
        ));
    }

    #[test]
    fn no_flags_no_scope() {
        assert!(SecurityScope::resolve(&Overrides::default(), &AuthClaims::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn missing_oid_scopes_to_empty_owner() {
        let o = Overrides { use_oid_security_filter: true, ..Overrides::default() };
        let scope = SecurityScope::resolve(&o, &AuthClaims::default()).unwrap().unwrap();
        assert_eq!(scope.clause().unwrap(), "oid eq ''");
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(
            SecurityScope::Owner("o'neil".into()).clause().unwrap(),
            "oid eq 'o''neil'"
        );
        assert_eq!(
            SecurityScope::Groups(vec!["a\"b".into()]).clause().unwrap(),
            r#"search.ismatch("a\"b")"#
        );
    }

    #[test]
    fn empty_groups_no_clause() {
        assert!(SecurityScope::Groups(vec![]).clause().is_none());
    }
}
