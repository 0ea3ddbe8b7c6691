//! Text templates for the completion summary and the canned responders.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};

use crate::core::state_machine::CompletionReason;

const TEMPLATES: &[(&str, &str)] = &[
    ("summary", include_str!("templates/summary.md")),
    (
        "proposal_architecture",
        include_str!("templates/proposal_architecture.md"),
    ),
    (
        "proposal_services",
        include_str!("templates/proposal_services.md"),
    ),
    (
        "revision_experience",
        include_str!("templates/revision_experience.md"),
    ),
    ("revision_journey", include_str!("templates/revision_journey.md")),
    ("review_experience", include_str!("templates/review_experience.md")),
    ("review_business", include_str!("templates/review_business.md")),
    ("review_approval", include_str!("templates/review_approval.md")),
];

static ENGINE: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)
            .expect("bundled templates should be valid");
    }
    env
});

/// Render a bundled template by name.
pub fn render(name: &str, ctx: Value) -> Result<String> {
    let template = ENGINE
        .get_template(name)
        .with_context(|| format!("load template {name}"))?;
    template
        .render(ctx)
        .with_context(|| format!("render template {name}"))
}

/// Build the `complete` event payload.
///
/// Depends only on the requirement, the number of rounds and why the
/// negotiation ended, so identical sessions produce identical summaries.
pub fn render_summary(requirement: &str, rounds: u32, reason: CompletionReason) -> Result<String> {
    render(
        "summary",
        context! {
            requirement => requirement.trim(),
            rounds => rounds,
            approved => reason == CompletionReason::Approved,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bundled_template_renders() {
        for (name, _) in TEMPLATES {
            let out = render(
                name,
                context! { requirement => "req", round => 2, feedback_excerpt => "fb" },
            )
            .expect("render");
            assert!(!out.trim().is_empty(), "{name} rendered empty");
        }
    }

    #[test]
    fn summary_is_deterministic_and_mentions_inputs() {
        let a = render_summary("a login page", 3, CompletionReason::Approved).expect("render");
        let b = render_summary("a login page", 3, CompletionReason::Approved).expect("render");
        assert_eq!(a, b);
        assert!(a.contains("FINAL APPROVED SOLUTION"));
        assert!(a.contains("After 3 rounds"));
        assert!(a.contains("\"a login page\""));
    }

    #[test]
    fn forced_summary_says_budget_was_reached() {
        let out = render_summary("x", 1, CompletionReason::RoundBudgetExhausted).expect("render");
        assert!(out.contains("round budget reached"));
        assert!(out.contains("After 1 round of"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = render("nope", context! {}).unwrap_err();
        assert!(err.to_string().contains("load template nope"));
    }
}
