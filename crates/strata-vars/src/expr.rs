//! Integer arithmetic over variables: `+ - * /` with the usual precedence
//! and parentheses. Evaluation is iterative (shunting-yard), and any
//! overflow or division by zero makes the whole expression fail.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprToken {
    Num(i64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

/// Split `body` into expression tokens. Returns `None` unless `body` is
/// well-formed lexically and contains at least one binary operator.
pub fn tokenize(body: &str) -> Option<Vec<ExprToken>> {
    let mut out: Vec<ExprToken> = Vec::new();
    let mut has_operator = false;
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let unary_position = matches!(out.last(), None | Some(ExprToken::Op(_)) | Some(ExprToken::LParen));
        match c {
            '0'..='9' => {
                let end = scan(&mut chars, body.len(), |ch| ch.is_ascii_digit());
                out.push(ExprToken::Num(body[start..end].parse().ok()?));
            }
            '-' if unary_position => {
                chars.next();
                let digits = chars.peek().map(|&(i, _)| i)?;
                let end = scan(&mut chars, body.len(), |ch| ch.is_ascii_digit());
                if end == digits {
                    return None;
                }
                out.push(ExprToken::Num(body[start..end].parse().ok()?));
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                has_operator = true;
                out.push(ExprToken::Op(c));
            }
            '(' => {
                chars.next();
                out.push(ExprToken::LParen);
            }
            ')' => {
                chars.next();
                out.push(ExprToken::RParen);
            }
            c if c.is_alphabetic() || c == '_' => {
                let end = scan(&mut chars, body.len(), |ch| ch.is_alphanumeric() || ch == '_' || ch == '.');
                out.push(ExprToken::Ident(body[start..end].to_string()));
            }
            _ => return None,
        }
    }
    has_operator.then_some(out)
}

/// Consume characters while `accept` holds; returns the byte offset where
/// scanning stopped.
fn scan(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, len: usize, accept: impl Fn(char) -> bool) -> usize {
    while let Some(&(i, ch)) = chars.peek() {
        if !accept(ch) {
            return i;
        }
        chars.next();
    }
    len
}

/// Variable names used as operands.
pub fn identifiers(tokens: &[ExprToken]) -> impl Iterator<Item = &str> {
    tokens.iter().filter_map(|t| match t {
        ExprToken::Ident(name) => Some(name.as_str()),
        _ => None,
    })
}

fn precedence(op: char) -> u8 {
    match op {
        '*' | '/' => 2,
        _ => 1,
    }
}

fn apply(output: &mut Vec<i64>, op: char) -> Option<()> {
    let rhs = output.pop()?;
    let lhs = output.pop()?;
    let value = match op {
        '+' => lhs.checked_add(rhs)?,
        '-' => lhs.checked_sub(rhs)?,
        '*' => lhs.checked_mul(rhs)?,
        '/' => lhs.checked_div(rhs)?,
        _ => return None,
    };
    output.push(value);
    Some(())
}

/// Evaluate `tokens`, reading identifier values through `value`.
pub fn evaluate(tokens: &[ExprToken], value: impl Fn(&str) -> Option<i64>) -> Option<i64> {
    let mut output: Vec<i64> = Vec::new();
    let mut ops: Vec<&ExprToken> = Vec::new();
    let mut expect_operand = true;

    for token in tokens {
        match token {
            ExprToken::Num(n) if expect_operand => {
                output.push(*n);
                expect_operand = false;
            }
            ExprToken::Ident(name) if expect_operand => {
                output.push(value(name)?);
                expect_operand = false;
            }
            ExprToken::LParen if expect_operand => ops.push(token),
            ExprToken::Op(op) if !expect_operand => {
                while let Some(ExprToken::Op(top)) = ops.last() {
                    if precedence(*top) < precedence(*op) {
                        break;
                    }
                    apply(&mut output, *top)?;
                    ops.pop();
                }
                ops.push(token);
                expect_operand = true;
            }
            ExprToken::RParen if !expect_operand => loop {
                match ops.pop()? {
                    ExprToken::Op(op) => apply(&mut output, *op)?,
                    ExprToken::LParen => break,
                    _ => return None,
                }
            },
            _ => return None,
        }
    }
    if expect_operand {
        return None;
    }
    while let Some(token) = ops.pop() {
        match token {
            ExprToken::Op(op) => apply(&mut output, *op)?,
            _ => return None,
        }
    }
    match output.as_slice() {
        [result] => Some(*result),
        _ => None,
    }
}
