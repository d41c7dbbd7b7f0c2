const UNRESOLVED_CLAUSE: &str = " AND resolution = Unresolved";
const STABLE_ORDER: &str = " ORDER BY key ASC";
const CUSTOM_FIELD_PREFIX: &str = "customfield_";

/// Quotes a value for use in a query, escaping backslashes and double quotes.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn finish(mut clause: String, unresolved_only: bool) -> String {
    if unresolved_only {
        clause.push_str(UNRESOLVED_CLAUSE);
    }
    clause.push_str(STABLE_ORDER);
    clause
}

/// Issues where `identity` is the assignee or the reporter.
#[must_use]
pub fn assigned_or_reported_by(identity: &str, unresolved_only: bool) -> String {
    let user = quote(identity);
    finish(
        format!("(assignee = {user} OR reporter = {user})"),
        unresolved_only,
    )
}

/// Issues where the custom field `field_id` references `identity`.
///
/// Returns `None` for ids that are not of the `customfield_<n>` form, which cannot be
/// addressed in a query.
#[must_use]
pub fn custom_field_references(
    field_id: &str,
    identity: &str,
    unresolved_only: bool,
) -> Option<String> {
    let number = field_id.strip_prefix(CUSTOM_FIELD_PREFIX)?;
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(finish(
        format!("cf[{number}] = {}", quote(identity)),
        unresolved_only,
    ))
}
