use crate::model::{Row, Rule};

/// Everything a rationale template may reference.
pub struct RationaleContext<'a> {
    pub rule: &'a Rule,
    pub source: &'a Row,
    pub target: &'a Row,
    pub hits: usize,
}

/// Resolve a rule's rationale template for one pair.
///
/// Placeholders: `{source_value}`, `{target_value}`, `{source_field}`,
/// `{target_field}`, `{rule_name}`, `{hits}`, `{source.<col>}`,
/// `{target.<col>}`. Unknown placeholders stay verbatim; `{{` and `}}` are
/// literal braces.
pub fn render(ctx: &RationaleContext<'_>) -> String {
    let template = ctx.rule.rationale_statement.trim();
    if template.is_empty() {
        return default_statement(ctx);
    }

    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(i) = rest.find(['{', '}']) {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }
        match tail[1..].find('}') {
            Some(end) => {
                let key = &tail[1..1 + end];
                match resolve(key, ctx) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&tail[..end + 2]),
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve(key: &str, ctx: &RationaleContext<'_>) -> Option<String> {
    let rule = ctx.rule;
    match key {
        "source_value" => Some(ctx.source.value(&rule.source_field).display().into_owned()),
        "target_value" => Some(ctx.target.value(&rule.target_field).display().into_owned()),
        "source_field" => Some(rule.source_field.clone()),
        "target_field" => Some(rule.target_field.clone()),
        "rule_name" => Some(rule.rule_name.clone()),
        "hits" => Some(ctx.hits.to_string()),
        _ => {
            if let Some(col) = key.strip_prefix("source.") {
                ctx.source.get(col).map(|v| v.display().into_owned())
            } else if let Some(col) = key.strip_prefix("target.") {
                ctx.target.get(col).map(|v| v.display().into_owned())
            } else {
                None
            }
        }
    }
}

fn default_statement(ctx: &RationaleContext<'_>) -> String {
    let rule = ctx.rule;
    format!(
        "Rule '{}' linked {} '{}' to {} '{}'",
        rule.rule_name,
        rule.source_field,
        ctx.source.value(&rule.source_field),
        rule.target_field,
        ctx.target.value(&rule.target_field),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchClassification, MatchType, Value};

    fn rule(template: &str) -> Rule {
        Rule {
            rule_id: 1,
            rule_name: "email".into(),
            description: String::new(),
            source_field: "email".into(),
            target_field: "mail".into(),
            select_if_both_same: true,
            match_classification: MatchClassification::Match,
            match_type: MatchType::Exact,
            rationale_statement: template.into(),
            code_block: None,
        }
    }

    fn render_with(template: &str) -> String {
        let r = rule(template);
        let source = Row::from_pairs([("email", Value::from("a@x.com")), ("id", Value::Number(7.0))]);
        let target = Row::from_pairs([("mail", Value::from("a@x.com"))]);
        render(&RationaleContext {
            rule: &r,
            source: &source,
            target: &target,
            hits: 2,
        })
    }

    #[test]
    fn substitutes_known_placeholders() {
        assert_eq!(
            render_with("Email {source_value} equals {target_field}={target_value} ({hits} hits)"),
            "Email a@x.com equals mail=a@x.com (2 hits)"
        );
    }

    #[test]
    fn column_placeholders() {
        assert_eq!(render_with("source #{source.id}"), "source #7");
        assert_eq!(render_with("{target.missing}"), "{target.missing}");
    }

    #[test]
    fn unknown_and_escaped_braces() {
        assert_eq!(render_with("{nope} {{literal}}"), "{nope} {literal}");
        assert_eq!(render_with("open { brace"), "open { brace");
    }

    #[test]
    fn empty_template_uses_default() {
        assert_eq!(
            render_with("  "),
            "Rule 'email' linked email 'a@x.com' to mail 'a@x.com'"
        );
    }
}
