//! Question answering over assembled task context.
//!
//! [`build_context_text`] renders an [`AssembledContext`] into the plain
//! text handed to the [`AnswerGenerator`] collaborator:
//!
//! ```text
//! TASK
//! HIERARCHY      (parents; subtasks for `subtasks`/`tree`)
//! DOCUMENTS      (task, inherited, general)
//! RELATED TASKS  (`tree` only)
//! ```
//!
//! Document snippets are the summary when there is one, else the text,
//! cut to a fixed number of words.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{AssembledContext, DocumentSource, Scope};
use crate::error::{EngineError, Result};
use crate::models::ResourceId;

const PARENTS_SHOWN: usize = 2;
const SUBTASKS_SHOWN: usize = 5;
const TASK_DOCS_SHOWN: usize = 3;
const INHERITED_DOCS_SHOWN: usize = 2;
const GENERAL_DOCS_SHOWN: usize = 2;
const RELATED_SHOWN: usize = 3;
const MAX_REFS: usize = 5;

/// What the answer-generation collaborator returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default)]
    pub suggested_next_steps: Vec<String>,
}

/// Turns a question plus rendered context into an answer.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, question: &str, context: &str) -> anyhow::Result<GeneratedAnswer>;
}

/// Keep at most `max_words` whitespace-separated words, marking the cut.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

fn snippet(summary: Option<&str>, text: &str, max_words: usize) -> String {
    let body = summary.filter(|s| !s.trim().is_empty()).unwrap_or(text);
    truncate_words(body, max_words)
}

/// Render assembled context as sectioned plain text.
pub fn build_context_text(ctx: &AssembledContext, snippet_words: usize) -> String {
    let task = &ctx.task;
    let mut lines: Vec<String> = Vec::new();

    lines.push("TASK".to_string());
    lines.push(format!("- {} ({})", task.title, task.code));
    if let Some(description) = task.description.as_deref().filter(|d| !d.trim().is_empty()) {
        lines.push(format!("- Description: {}", truncate_words(description, snippet_words)));
    }
    lines.push(format!("- Status: {} | Priority: {}", task.status, task.priority));
    if task.progress > 0 {
        lines.push(format!("- Progress: {}%", task.progress));
    }
    if let Some(owner) = &task.owner {
        lines.push(format!("- Owner: {}", owner));
    }
    if let Some(due) = task.due_date {
        lines.push(format!("- Due: {}", due));
    }
    lines.push(String::new());

    let show_subtasks = matches!(ctx.scope, Scope::Subtasks | Scope::Tree);
    let ancestors = &ctx.hierarchy.ancestors;
    if !ancestors.is_empty() || (show_subtasks && !ctx.hierarchy.children.is_empty()) {
        lines.push("HIERARCHY".to_string());
        if !ancestors.is_empty() {
            lines.push("- Parent tasks:".to_string());
            let skip = ancestors.len().saturating_sub(PARENTS_SHOWN);
            for ancestor in &ancestors[skip..] {
                lines.push(format!("  * {} ({})", ancestor.title, ancestor.code));
            }
        }
        if show_subtasks && !ctx.hierarchy.children.is_empty() {
            lines.push("- Subtasks:".to_string());
            for child in ctx.hierarchy.children.iter().take(SUBTASKS_SHOWN) {
                lines.push(format!(
                    "  * [{}] {} ({}) - {}%",
                    child.status, child.title, child.code, child.progress
                ));
            }
        }
        lines.push(String::new());
    }

    if !ctx.documents.is_empty() {
        lines.push("DOCUMENTS".to_string());
        let groups = [
            (DocumentSource::Task, "Task documents", TASK_DOCS_SHOWN),
            (DocumentSource::Inherited, "From parent tasks", INHERITED_DOCS_SHOWN),
            (DocumentSource::General, "Related documents", GENERAL_DOCS_SHOWN),
        ];
        for (source, heading, shown) in groups {
            let docs: Vec<_> = ctx
                .documents
                .iter()
                .filter(|d| d.source == source)
                .take(shown)
                .collect();
            if docs.is_empty() {
                continue;
            }
            lines.push(format!("- {}:", heading));
            for doc in docs {
                let body = snippet(doc.summary.as_deref(), &doc.text, snippet_words);
                if source == DocumentSource::General {
                    lines.push(format!("  * {} (similarity: {:.2})", body, doc.similarity));
                } else {
                    lines.push(format!("  * {}", body));
                }
            }
        }
        lines.push(String::new());
    }

    if ctx.scope == Scope::Tree && !ctx.related_tasks.is_empty() {
        lines.push("RELATED TASKS".to_string());
        for related in ctx.related_tasks.iter().take(RELATED_SHOWN) {
            lines.push(format!("- {} ({}) - {}", related.title, related.code, related.status));
        }
        lines.push(String::new());
    }

    lines.join("\n").trim_end().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskContextRef {
    pub task_code: String,
    pub task_title: String,
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub documents_used: usize,
    pub task_specific: usize,
    pub inherited: usize,
    pub general: usize,
    pub hierarchy_depth: usize,
}

impl ContextSummary {
    pub fn of(ctx: &AssembledContext) -> Self {
        Self {
            documents_used: ctx.documents.len(),
            task_specific: ctx.count(DocumentSource::Task),
            inherited: ctx.count(DocumentSource::Inherited),
            general: ctx.count(DocumentSource::General),
            hierarchy_depth: ctx.hierarchy.ancestors.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    pub task_context: TaskContextRef,
    pub context_summary: ContextSummary,
    /// Ids of the first few documents used.
    pub refs: Vec<ResourceId>,
    pub suggested_next_steps: Vec<String>,
}

/// Render `ctx`, ask the collaborator, and package the answer.
pub async fn answer_with_context(
    answerer: &dyn AnswerGenerator,
    question: &str,
    ctx: &AssembledContext,
    snippet_words: usize,
) -> Result<AskResponse> {
    let question = question.trim();
    if question.is_empty() {
        return Err(EngineError::InvalidArgument(
            "question must not be empty".to_string(),
        ));
    }
    let text = build_context_text(ctx, snippet_words);
    let generated = answerer
        .answer(question, &text)
        .await
        .map_err(EngineError::Answer)?;

    Ok(AskResponse {
        answer: generated.answer,
        task_context: TaskContextRef {
            task_code: ctx.task.code.clone(),
            task_title: ctx.task.title.clone(),
            scope: ctx.scope,
        },
        context_summary: ContextSummary::of(ctx),
        refs: ctx.documents.iter().take(MAX_REFS).map(|d| d.resource_id).collect(),
        suggested_next_steps: generated.suggested_next_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextDocument, HierarchySummary, TaskBrief};
    use crate::models::{Priority, Task, TaskStatus};

    fn task(id: i64, code: &str, title: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            code: code.to_string(),
            parent_id: None,
            level: 0,
            path: code.to_string(),
            status: TaskStatus::InProgress,
            priority: Priority::High,
            progress: 40,
            description: Some("Build the public API".to_string()),
            owner: Some("dana".to_string()),
            due_date: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn doc(id: i64, source: DocumentSource, text: &str) -> ContextDocument {
        ContextDocument {
            resource_id: id,
            text: text.to_string(),
            summary: None,
            origin: "note".to_string(),
            source,
            similarity: 0.75,
            task_code: None,
        }
    }

    fn context(scope: Scope, documents: Vec<ContextDocument>) -> AssembledContext {
        let root = task(1, "PROJ-001", "Project");
        let mid = task(2, "DEV-001", "Development");
        let child = task(4, "DOC-001", "Docs");
        AssembledContext {
            task: task(3, "API-001", "API"),
            scope,
            documents,
            hierarchy: HierarchySummary {
                ancestors: vec![TaskBrief::from(&root), TaskBrief::from(&mid)],
                children: vec![TaskBrief::from(&child)],
            },
            related_tasks: vec![TaskBrief::from(&child)],
        }
    }

    struct Echo;

    #[async_trait]
    impl AnswerGenerator for Echo {
        async fn answer(&self, question: &str, context: &str) -> anyhow::Result<GeneratedAnswer> {
            Ok(GeneratedAnswer {
                answer: format!("{} / {} chars", question, context.len()),
                suggested_next_steps: vec!["ship it".to_string()],
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl AnswerGenerator for Broken {
        async fn answer(&self, _question: &str, _context: &str) -> anyhow::Result<GeneratedAnswer> {
            anyhow::bail!("provider unreachable")
        }
    }

    #[test]
    fn test_truncate_words() {
        assert_eq!(truncate_words("one two three", 5), "one two three");
        assert_eq!(truncate_words("one  two\nthree four", 2), "one two...");
        assert_eq!(truncate_words("", 3), "");
    }

    #[test]
    fn test_snippet_prefers_summary() {
        assert_eq!(snippet(Some("short"), "long body text", 10), "short");
        assert_eq!(snippet(Some("  "), "long body text", 2), "long body...");
        assert_eq!(snippet(None, "body", 2), "body");
    }

    #[test]
    fn test_context_text_sections_for_self_scope() {
        let ctx = context(
            Scope::SelfOnly,
            vec![
                doc(10, DocumentSource::Task, "spec for the endpoint"),
                doc(11, DocumentSource::General, "unrelated meeting notes"),
            ],
        );
        let text = build_context_text(&ctx, 40);
        assert!(text.starts_with("TASK\n- API (API-001)"));
        assert!(text.contains("- Status: in_progress | Priority: high"));
        assert!(text.contains("- Progress: 40%"));
        assert!(text.contains("HIERARCHY\n- Parent tasks:"));
        assert!(!text.contains("Subtasks"));
        assert!(text.contains("- Task documents:\n  * spec for the endpoint"));
        assert!(text.contains("(similarity: 0.75)"));
        assert!(!text.contains("RELATED TASKS"));
    }

    #[test]
    fn test_context_text_tree_scope_lists_subtasks_and_related() {
        let ctx = context(Scope::Tree, Vec::new());
        let text = build_context_text(&ctx, 40);
        assert!(text.contains("- Subtasks:\n  * [in_progress] Docs (DOC-001) - 40%"));
        assert!(text.contains("RELATED TASKS\n- Docs (DOC-001) - in_progress"));
        assert!(!text.contains("DOCUMENTS"));
    }

    #[test]
    fn test_context_text_caps_document_groups() {
        let docs = (0..5)
            .map(|i| doc(i, DocumentSource::Inherited, &format!("inherited {}", i)))
            .collect();
        let text = build_context_text(&context(Scope::Inherit, docs), 40);
        assert!(text.contains("inherited 1"));
        assert!(!text.contains("inherited 2"));
    }

    #[tokio::test]
    async fn test_answer_with_context_packages_response() {
        let docs = (0..7).map(|i| doc(i, DocumentSource::Task, "x")).collect();
        let ctx = context(Scope::SelfOnly, docs);
        let response = answer_with_context(&Echo, "  what next? ", &ctx, 40)
            .await
            .unwrap();
        assert!(response.answer.starts_with("what next? /"));
        assert_eq!(response.refs, vec![0, 1, 2, 3, 4]);
        assert_eq!(response.context_summary.documents_used, 7);
        assert_eq!(response.context_summary.hierarchy_depth, 2);
        assert_eq!(response.task_context.task_code, "API-001");
        assert_eq!(response.suggested_next_steps, vec!["ship it"]);
    }

    #[tokio::test]
    async fn test_answer_with_context_rejects_blank_question_and_wraps_failures() {
        let ctx = context(Scope::SelfOnly, Vec::new());
        let err = answer_with_context(&Echo, "   ", &ctx, 40).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        let err = answer_with_context(&Broken, "why?", &ctx, 40).await.unwrap_err();
        assert!(matches!(err, EngineError::Answer(_)));
    }
}
