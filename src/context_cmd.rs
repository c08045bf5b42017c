//! `tctx context` and `tctx ask`.

use anyhow::Result;

use task_context_core::context::{DocumentSource, Scope};

use crate::answer::create_answerer;
use crate::config::Config;
use crate::engine::open_engine;
use crate::output::print_json;

fn resolve_scope(config: &Config, scope: Option<String>) -> Result<Scope> {
    match scope {
        Some(s) => Ok(s.parse()?),
        None => Ok(config.context.scope()),
    }
}

/// Show what a question about `code` would see.
///
/// With `preview`, only counts and suggested scopes are printed; otherwise
/// the full rendered context text.
pub async fn run_context(
    config: &Config,
    code: &str,
    scope: Option<String>,
    limit: Option<usize>,
    question: Option<String>,
    preview: bool,
    json: bool,
) -> Result<()> {
    let scope = resolve_scope(config, scope)?;
    let limit = limit.unwrap_or(config.context.max_documents);
    let engine = open_engine(config).await?;

    if preview {
        let preview = engine.context_preview(code, scope, limit).await?;
        if json {
            return print_json(&preview);
        }
        println!("{} {} [{}]", preview.task.code, preview.task.title, preview.scope);
        println!(
            "  Documents: {} task, {} inherited, {} general ({} total)",
            preview.counts.task, preview.counts.inherited, preview.counts.general, preview.counts.total
        );
        println!(
            "  Hierarchy: {} ancestor{}, {} child{}",
            preview.hierarchy.ancestors.len(),
            if preview.hierarchy.ancestors.len() == 1 { "" } else { "s" },
            preview.hierarchy.children.len(),
            if preview.hierarchy.children.len() == 1 { "" } else { "ren" }
        );
        println!();
        println!("Suggested scopes:");
        for s in &preview.suggested_scopes {
            println!("  {:<9} {}", s.scope.as_str(), s.description);
        }
        return Ok(());
    }

    let task = engine.get_task_by_code(code).await?;
    let assembled = engine
        .assemble_context(task.id, scope, limit, question.as_deref())
        .await?;

    if json {
        return print_json(&assembled);
    }

    println!("{}", engine.build_context_text(&assembled));
    println!();
    println!(
        "({} documents: {} task, {} inherited, {} general)",
        assembled.documents.len(),
        assembled.count(DocumentSource::Task),
        assembled.count(DocumentSource::Inherited),
        assembled.count(DocumentSource::General)
    );
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    code: &str,
    question: &str,
    scope: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let scope = resolve_scope(config, scope)?;
    let limit = limit.unwrap_or(config.context.max_documents);
    let answerer = create_answerer(config)?;
    let engine = open_engine(config).await?;

    let response = engine
        .ask_with_task_context(answerer.as_ref(), question, code, scope, limit)
        .await?;

    if json {
        return print_json(&response);
    }

    println!("{}", response.answer);
    if !response.suggested_next_steps.is_empty() {
        println!();
        println!("Next steps:");
        for step in &response.suggested_next_steps {
            println!("  - {}", step);
        }
    }
    let summary = &response.context_summary;
    println!();
    println!(
        "[{} {} | {} docs: {} task, {} inherited, {} general]",
        response.task_context.task_code,
        response.task_context.scope,
        summary.documents_used,
        summary.task_specific,
        summary.inherited,
        summary.general
    );
    Ok(())
}
