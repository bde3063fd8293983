// crates/outbound-harness-server/src/render.rs
// ============================================================================
// Module: Page Rendering
// Description: Page renderer interface and a basic escaped-HTML renderer.
// Purpose: Turn replay render contexts into pages.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`PageRenderer`] is the seam for richer UIs; [`BasicHtmlRenderer`] emits a
//! plain page with the integration index, the fixture list, an editable form
//! of the current values, and the result panel. Every interpolated string is
//! HTML-escaped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use serde_json::Value;

use crate::router::RenderContext;
use crate::router::ReplayOutcome;

// ============================================================================
// SECTION: Renderer Interface
// ============================================================================

/// Renders replay pages.
pub trait PageRenderer: Send + Sync {
    /// Renders the index page.
    fn render_index(&self, context: &RenderContext) -> String;

    /// Renders a category page for one integration.
    fn render_method(&self, context: &RenderContext) -> String;
}

/// Minimal HTML renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHtmlRenderer;

impl PageRenderer for BasicHtmlRenderer {
    fn render_index(&self, context: &RenderContext) -> String {
        let mut body = String::new();
        let _ = write!(body, "<h1>Harness for {}</h1><ul>", escape(&context.module));
        for integration in &context.integrations {
            let title = integration.title.as_deref().unwrap_or(&integration.name);
            let _ = write!(body, "<li>{} <small>({})</small>", escape(title), escape(integration.contract));
            for category in &integration.categories {
                let _ = write!(
                    body,
                    " <a href=\"/{category}/{name}\">{category}</a>",
                    category = escape(category.as_str()),
                    name = escape(&integration.name)
                );
            }
            body.push_str("</li>");
        }
        body.push_str("</ul>");
        page(&context.module, &body)
    }

    fn render_method(&self, context: &RenderContext) -> String {
        let integration = context.integration.as_deref().unwrap_or_default();
        let category = context.category.map(|category| category.as_str()).unwrap_or_default();
        let mut body = String::new();
        let _ = write!(
            body,
            "<p><a href=\"/\">{}</a></p><h1>{} / {}</h1>",
            escape(&context.module),
            escape(integration),
            escape(category)
        );

        body.push_str("<ol start=\"0\">");
        for fixture in &context.fixtures {
            let label = if fixture.label.is_empty() { format!("fixture {}", fixture.index) } else { fixture.label.clone() };
            let _ = write!(
                body,
                "<li><a href=\"/{}/{}/{}\">{}</a></li>",
                escape(category),
                escape(integration),
                fixture.index,
                escape(&label)
            );
        }
        body.push_str("</ol>");

        let action = match context.fixture_id {
            Some(index) => format!("/{category}/{integration}/{index}"),
            None => format!("/{category}/{integration}"),
        };
        let _ = write!(body, "<form method=\"post\" action=\"{}\">", escape(&action));
        for (name, value) in &context.values {
            input(&mut body, name, value);
        }
        for name in &context.env_variables {
            let field = format!("env.{name}");
            if !context.values.contains_key(&field) {
                input(&mut body, &field, "");
            }
        }
        body.push_str("<button type=\"submit\">Invoke</button></form>");

        if !context.extra_vars.is_empty() {
            body.push_str("<h2>extra_vars</h2><dl>");
            for (name, value) in &context.extra_vars {
                let _ = write!(body, "<dt>{}</dt><dd>{}</dd>", escape(name), escape(value));
            }
            body.push_str("</dl>");
        }
        if !context.network.is_empty() {
            let network = serde_json::to_string_pretty(&context.network).unwrap_or_default();
            let _ = write!(body, "<h2>Network expectations</h2><pre>{}</pre>", escape(&network));
        }
        if let Some(result) = &context.result {
            result_panel(&mut body, result);
        }
        page(&format!("{integration} / {category}"), &body)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Wraps a body in a page shell.
fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body>{body}</body></html>",
        escape(title)
    )
}

/// Appends one labelled text input.
fn input(body: &mut String, name: &str, value: &str) {
    let _ = write!(
        body,
        "<label>{name} <input type=\"text\" name=\"{name}\" value=\"{value}\"></label><br>",
        name = escape(name),
        value = escape(value)
    );
}

/// Appends the result panel.
fn result_panel(body: &mut String, result: &ReplayOutcome) {
    let matched = match result.matched {
        Some(true) => "true",
        Some(false) => "false",
        None => "none",
    };
    let _ = write!(body, "<section class=\"result\" data-matched=\"{matched}\"><h2>Actual</h2>");
    let _ = write!(body, "<pre>{}</pre>", escape(&pretty(result.actual.as_ref())));
    if let Some(expected) = &result.expected {
        let _ = write!(body, "<h2>Expected</h2><pre>{}</pre>", escape(&pretty(Some(expected))));
    }
    if !result.diff.is_empty() {
        body.push_str("<h2>Differences</h2><ul>");
        for line in &result.diff {
            let _ = write!(body, "<li>{}</li>", escape(line));
        }
        body.push_str("</ul>");
    }
    if !result.nocks_unmet.is_empty() {
        body.push_str("<h2>Unmet network expectations</h2><ul>");
        for key in &result.nocks_unmet {
            let _ = write!(body, "<li>{}</li>", escape(key));
        }
        body.push_str("</ul>");
    }
    body.push_str("</section>");
}

/// Pretty JSON, or `undefined` for an absent value.
fn pretty(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Escapes text for HTML bodies and attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// SECTION: Tests
// ============================================================================
