//! `${VAR}` substitution applied to raw config text before parsing.

/// Replace `${VAR}` placeholders with values from the process environment.
///
/// Unknown variables and unterminated placeholders are kept verbatim so the
/// parser reports them in context.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "SKIFF_DB_PATH" => Some("/var/lib/skiff.db".to_string()),
            "SKIFF_PORT" => Some("9000".to_string()),
            _ => None,
        }
    }

    #[test]
    fn substitutes_known_vars() {
        assert_eq!(
            substitute_with("path = \"${SKIFF_DB_PATH}\"\nport = ${SKIFF_PORT}", lookup),
            "path = \"/var/lib/skiff.db\"\nport = 9000"
        );
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_with("${SKIFF_NONEXISTENT_XYZ}", lookup),
            "${SKIFF_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn leaves_unterminated_and_empty() {
        assert_eq!(substitute_with("a ${} b ${SKIFF_PORT", lookup), "a ${} b ${SKIFF_PORT");
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("plain $text {x}"), "plain $text {x}");
    }
}
