//! Bracket repair for order lists inside otherwise malformed JSON.
//!
//! Grammar accepted after `"orders"` or `'orders'`, a colon, and `[`, up to
//! the first `]`:
//!
//! ```text
//! list   := ws ( item ( ws "," ws item )* ( ws "," )? )? ws
//! item   := '"' chars '"' | "'" chars "'"
//! chars  := ( any char except the quote or "\" | "\\" | "\" quote )*
//! ```
//!
//! Anything outside this grammar fails the repair.

use once_cell::sync::Lazy;
use regex::Regex;

static ORDERS_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']orders["']\s*:\s*\[([^\]]*)\]"#).expect("valid regex")
});

/// Order strings recovered from the first `orders` list in `text`.
pub fn repair_orders_list(text: &str) -> Option<Vec<String>> {
    let body = ORDERS_LIST.captures(text)?.get(1)?.as_str();
    parse_list_body(body)
}

fn parse_list_body(body: &str) -> Option<Vec<String>> {
    let mut chars = body.chars().peekable();
    let mut items = Vec::new();

    skip_whitespace(&mut chars);
    if chars.peek().is_none() {
        return Some(items);
    }

    loop {
        let quote = chars.next().filter(|ch| *ch == '"' || *ch == '\'')?;
        items.push(read_quoted(&mut chars, quote)?);

        skip_whitespace(&mut chars);
        match chars.next() {
            None => return Some(items),
            Some(',') => {}
            Some(_) => return None,
        }

        skip_whitespace(&mut chars);
        if chars.peek().is_none() {
            return Some(items);
        }
    }
}

fn read_quoted<I>(chars: &mut std::iter::Peekable<I>, quote: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut item = String::new();
    loop {
        match chars.next()? {
            ch if ch == quote => return Some(item),
            '\\' => match chars.next()? {
                '\\' => item.push('\\'),
                escaped if escaped == quote => item.push(quote),
                _ => return None,
            },
            ch => item.push(ch),
        }
    }
}

fn skip_whitespace<I>(chars: &mut std::iter::Peekable<I>)
where
    I: Iterator<Item = char>,
{
    while chars.peek().is_some_and(|ch| ch.is_whitespace()) {
        chars.next();
    }
}
