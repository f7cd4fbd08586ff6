//! Capability queries over a flat tool catalog
//!
//! Every filter returns a new [`ToolFilter`] holding the matching subset in
//! catalog order, so filters chain freely and commute with each other.

use std::fmt;

use crate::tool::BoxedTool;

/// A filtered view over a list of tools
#[derive(Clone, Default)]
pub struct ToolFilter {
    tools: Vec<BoxedTool>,
}

impl ToolFilter {
    /// Wrap a catalog
    pub fn new(tools: Vec<BoxedTool>) -> Self {
        Self { tools }
    }

    fn retain(&self, pred: impl Fn(&BoxedTool) -> bool) -> Self {
        Self {
            tools: self.tools.iter().filter(|t| pred(t)).cloned().collect(),
        }
    }

    /// Keep tools carrying every one of `tags` (case-insensitive)
    pub fn by_tags(&self, tags: &[&str]) -> Self {
        let required: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        self.retain(|tool| {
            let have: Vec<String> = tool
                .metadata()
                .tags
                .iter()
                .map(|t| t.to_lowercase())
                .collect();
            required.iter().all(|r| have.contains(r))
        })
    }

    /// Keep tools published by exactly `author`
    pub fn by_author(&self, author: &str) -> Self {
        self.retain(|tool| tool.metadata().author == author)
    }

    /// Keep tools whose named hint equals `value`. Undeclared hints count as false.
    pub fn by_annotation_hint(&self, hint: &str, value: bool) -> Self {
        self.retain(|tool| tool.metadata().annotations.hint(hint).unwrap_or(false) == value)
    }

    /// Keep tools whose read-only hint equals `read_only`
    pub fn by_read_only(&self, read_only: bool) -> Self {
        self.by_annotation_hint("readOnlyHint", read_only)
    }

    /// Keep the tool named exactly `name`
    pub fn by_name(&self, name: &str) -> Self {
        self.retain(|tool| tool.name() == name)
    }

    /// Union with another view, keeping the first occurrence of each name
    pub fn merge(&self, other: &ToolFilter) -> Self {
        let mut tools = self.tools.clone();
        for tool in &other.tools {
            if !tools.iter().any(|t| t.name() == tool.name()) {
                tools.push(tool.clone());
            }
        }
        Self { tools }
    }

    pub fn get_all(&self) -> Vec<BoxedTool> {
        self.tools.clone()
    }

    pub fn get_first(&self) -> Option<BoxedTool> {
        self.tools.first().cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl fmt::Display for ToolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tool) in self.tools.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{} - {}", tool.name(), tool.description())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Tool, ToolAnnotations, ToolMetadata, ToolResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct StubTool {
        name: &'static str,
        metadata: ToolMetadata,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn metadata(&self) -> ToolMetadata {
            self.metadata.clone()
        }
        async fn execute(
            &self,
            _tool_call_id: &str,
            _arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> ToolResult {
            ToolResult::text("ok")
        }
    }

    fn stub(name: &'static str, author: &str, tags: &[&str], hints: ToolAnnotations) -> BoxedTool {
        Arc::new(StubTool {
            name,
            metadata: ToolMetadata::new(author, tags, hints),
        })
    }

    fn catalog() -> ToolFilter {
        ToolFilter::new(vec![
            stub("get_udahub_account", "udahub", &["Validation", "Account"], ToolAnnotations::read_only()),
            stub("create_udahub_user", "udahub", &["validation", "user"], ToolAnnotations::mutating(false, false)),
            stub("get_cultpass_user", "cultpass", &["validation"], ToolAnnotations::read_only()),
            stub("cancel_subscription", "cultpass", &["subscription"], ToolAnnotations::mutating(true, true)),
            stub("get_subscription", "cultpass", &["subscription"], ToolAnnotations::read_only()),
        ])
    }

    #[test]
    fn test_by_tags_case_insensitive_subset() {
        let f = catalog().by_tags(&["VALIDATION"]);
        assert_eq!(f.names(), vec!["get_udahub_account", "create_udahub_user", "get_cultpass_user"]);

        let f = catalog().by_tags(&["validation", "account"]);
        assert_eq!(f.names(), vec!["get_udahub_account"]);
    }

    #[test]
    fn test_by_tags_and_author_commute() {
        let a = catalog().by_tags(&["validation"]).by_author("udahub");
        let b = catalog().by_author("udahub").by_tags(&["validation"]);
        assert_eq!(a.names(), b.names());
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_by_read_only_and_hint() {
        let ro = catalog().by_author("cultpass").by_read_only(true);
        assert_eq!(ro.names(), vec!["get_cultpass_user", "get_subscription"]);

        let destructive = catalog().by_annotation_hint("destructiveHint", true);
        assert_eq!(destructive.names(), vec!["cancel_subscription"]);

        // unknown hints read as false
        assert_eq!(catalog().by_annotation_hint("openWorldHint", false).len(), 5);
    }

    #[test]
    fn test_by_name_and_get_first() {
        let f = catalog().by_name("get_subscription");
        assert_eq!(f.get_first().map(|t| t.name().to_string()), Some("get_subscription".into()));
        assert!(catalog().by_name("missing").get_first().is_none());
    }

    #[test]
    fn test_empty_catalog() {
        let empty = ToolFilter::default();
        assert!(empty.by_tags(&["validation"]).is_empty());
        assert!(empty.by_author("udahub").is_empty());
        assert!(empty.by_read_only(true).is_empty());
        assert!(empty.by_name("x").is_empty());
        assert!(empty.get_all().is_empty());
        assert!(empty.get_first().is_none());
        assert_eq!(empty.to_string(), "");
    }

    #[test]
    fn test_merge_dedups_by_name() {
        let platform = catalog().by_author("udahub");
        let validation = catalog().by_tags(&["validation"]);
        let merged = platform.merge(&validation);
        assert_eq!(
            merged.names(),
            vec!["get_udahub_account", "create_udahub_user", "get_cultpass_user"]
        );
    }

    #[test]
    fn test_display_lists_name_and_description() {
        let f = catalog().by_name("get_subscription");
        assert_eq!(f.to_string(), "get_subscription - stub");
    }
}
