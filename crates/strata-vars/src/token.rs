//! Scanning for `${...}` tokens.

use crate::expr;

/// One `${body}` occurrence in a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    /// Byte offset of `$`.
    pub start: usize,
    /// Byte offset just past `}`.
    pub end: usize,
    pub body: &'a str,
}

impl<'a> Token<'a> {
    /// The variable named by this token; `list(x)` names `x`.
    pub fn variable(&self) -> &'a str {
        variable_name(self.body)
    }

    /// Returns `true` for the `${list(x)}` form.
    pub fn is_list(&self) -> bool {
        list_argument(self.body).is_some()
    }
}

pub(crate) fn variable_name(body: &str) -> &str {
    list_argument(body).unwrap_or(body).trim()
}

fn list_argument(body: &str) -> Option<&str> {
    body.trim().strip_prefix("list(")?.strip_suffix(')')
}

/// Next token at or after byte offset `from`.
pub fn next_token(text: &str, from: usize) -> Option<Token<'_>> {
    let rest = text.get(from..)?;
    let open = rest.find("${")?;
    let start = from + open;
    let close = text[start + 2..].find('}')?;
    let end = start + 2 + close + 1;
    Some(Token {
        start,
        end,
        body: &text[start + 2..end - 1],
    })
}

/// All tokens in `text`, left to right.
pub fn tokens(text: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(token) = next_token(text, cursor) {
        cursor = token.end;
        out.push(token);
    }
    out
}

pub fn contains_token(text: &str) -> bool {
    next_token(text, 0).is_some()
}

/// Every variable name `text` could read, including the operands of
/// arithmetic expressions.
pub fn referenced_variables(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    for token in tokens(text) {
        names.push(token.variable().to_string());
        if let Some(parsed) = expr::tokenize(token.body) {
            names.extend(expr::identifiers(&parsed).map(str::to_string));
        }
    }
    names.sort();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_tokens_in_order() {
        let found = tokens("http://${host}:${port}/x");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].body, "host");
        assert_eq!(found[1].body, "port");
        assert_eq!(&"http://${host}:${port}/x"[found[1].start..found[1].end], "${port}");
    }

    #[test]
    fn unterminated_token_is_text() {
        assert!(next_token("${open", 0).is_none());
        assert!(!contains_token("plain $ {x}"));
    }

    #[test]
    fn list_form_names_inner_variable() {
        let token = next_token("${list(hosts)}", 0).unwrap();
        assert!(token.is_list());
        assert_eq!(token.variable(), "hosts");
    }

    #[test]
    fn expression_operands_are_referenced() {
        assert_eq!(
            referenced_variables("${base+offset*2} and ${name}"),
            vec!["base", "base+offset*2", "name", "offset"]
        );
    }
}
