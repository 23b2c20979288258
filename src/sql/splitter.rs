//! Statement splitting for dump replay

/// Split a dump on `;`, trimming each statement and skipping empty
/// fragments. A `;` inside a quoted span (`'..'`, `".."` or `` `..` ``) does
/// not split; a doubled quote inside a span is an escaped quote. Backslash is
/// an ordinary character, matching how [`super::render_literal`] escapes.
pub fn split_statements(dump: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = dump.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    if chars.peek() == Some(&q) {
                        // doubled quote stays inside the span
                        current.push(q);
                        chars.next();
                    } else {
                        quote = None;
                    }
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                ';' => push_trimmed(&mut statements, &mut current),
                _ => current.push(c),
            },
        }
    }
    push_trimmed(&mut statements, &mut current);

    statements
}

fn push_trimmed(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}
