#![forbid(unsafe_code)]

/// A piece of a call template such as `f64::max({0}, {1})` or
/// `{recv}.to_uppercase()`. `{{` and `}}` are literal braces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplatePiece {
    Text(String),
    Receiver,
    Arg(usize),
}

pub fn template_pieces(template: &str) -> Result<Vec<TemplatePiece>, String> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut hole = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => hole.push(ch),
                        None => return Err(format!("unclosed `{{` in template `{template}`")),
                    }
                }
                if !text.is_empty() {
                    pieces.push(TemplatePiece::Text(std::mem::take(&mut text)));
                }
                if hole == "recv" {
                    pieces.push(TemplatePiece::Receiver);
                } else {
                    let index = hole.parse::<usize>().map_err(|_| {
                        format!("unknown hole `{{{hole}}}` in template `{template}`")
                    })?;
                    pieces.push(TemplatePiece::Arg(index));
                }
            }
            '}' => return Err(format!("unmatched `}}` in template `{template}`")),
            other => text.push(other),
        }
    }
    if !text.is_empty() {
        pieces.push(TemplatePiece::Text(text));
    }
    Ok(pieces)
}

/// Highest argument hole plus one, and whether `{recv}` appears.
pub fn template_shape(template: &str) -> Result<(usize, bool), String> {
    let pieces = template_pieces(template)?;
    let arity = pieces
        .iter()
        .filter_map(|p| match p {
            TemplatePiece::Arg(i) => Some(i + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let uses_receiver = pieces.contains(&TemplatePiece::Receiver);
    Ok((arity, uses_receiver))
}
