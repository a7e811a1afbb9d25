//! Message rendering for offers, reminders and cancellation notices.
//!
//! Templates use `{{variable}}` placeholders. Variables with no value (unknown
//! names, or an issue without a description) are left in the output verbatim.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::domains::handymen::Handyman;
use crate::domains::issues::{Issue, Property};

pub const DEFAULT_DISPATCH_TEMPLATE: &str = "Hi {{handyman_name}}, new {{issue_priority}} job at \
{{property_name}} ({{property_address}}): {{issue_title}}. {{issue_description}} \
Reply 1 to accept or 2 to decline. Ref {{issue_id}}";

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Substitute `{{name}}` placeholders from `vars`.
pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    placeholder()
        .replace_all(template, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Variables available to the dispatch template.
pub fn dispatch_vars(handyman: &Handyman, property: &Property, issue: &Issue) -> HashMap<&'static str, String> {
    let mut vars = HashMap::from([
        ("handyman_name", handyman.name.clone()),
        ("property_name", property.name.clone()),
        ("property_address", property.full_address()),
        ("issue_title", issue.title.clone()),
        ("issue_priority", issue.priority.label().to_string()),
        ("issue_id", issue.id.to_string()),
    ]);
    if let Some(description) = issue.description.as_ref().filter(|d| !d.trim().is_empty()) {
        vars.insert("issue_description", description.clone());
    }
    vars
}

pub fn render_dispatch(template: &str, handyman: &Handyman, property: &Property, issue: &Issue) -> String {
    render(template, &dispatch_vars(handyman, property, issue))
}

pub fn follow_up_message(issue: &Issue, attempt: i32) -> String {
    format!(
        "Reminder {}: the job \"{}\" is still waiting for your answer. Reply 1 to accept or 2 to decline.",
        attempt, issue.title
    )
}

pub fn cancellation_message(issue: &Issue) -> String {
    format!(
        "The job \"{}\" has been canceled. No action is needed.",
        issue.title
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::issues::IssuePriority;

    fn fixtures() -> (Handyman, Property, Issue) {
        let handyman = Handyman::builder().name("Dana").phone("+15550000001").build();
        let property = Property::builder()
            .name("Elm Court")
            .address("4 Elm St")
            .city("Austin")
            .state("TX")
            .zip_code("78701")
            .build();
        let issue = Issue::builder()
            .property_id(property.id)
            .title("Leaking sink")
            .priority(IssuePriority::Urgent)
            .build();
        (handyman, property, issue)
    }

    #[test]
    fn substitutes_known_variables() {
        let (handyman, property, issue) = fixtures();
        let body = render_dispatch(
            "{{handyman_name}}: {{ issue_title }} at {{property_name}}, {{property_address}} [{{issue_priority}}]",
            &handyman,
            &property,
            &issue,
        );
        assert_eq!(
            body,
            "Dana: Leaking sink at Elm Court, 4 Elm St, Austin, TX 78701 [Urgent]"
        );
    }

    #[test]
    fn leaves_missing_variables_as_placeholders() {
        let (handyman, property, issue) = fixtures();
        let body = render_dispatch(
            "{{issue_title}} / {{issue_description}} / {{tenant_name}}",
            &handyman,
            &property,
            &issue,
        );
        assert_eq!(body, "Leaking sink / {{issue_description}} / {{tenant_name}}");
    }

    #[test]
    fn default_template_mentions_reply_keywords_and_id() {
        let (handyman, property, issue) = fixtures();
        let body = render_dispatch(DEFAULT_DISPATCH_TEMPLATE, &handyman, &property, &issue);
        assert!(body.contains("Reply 1 to accept or 2 to decline"));
        assert!(body.contains(&issue.id.to_string()));
    }
}
