//! Minimal stylesheet model used for per-surface style scoping.
//!
//! Parsing is lenient: a rule whose selector list cannot be parsed is dropped, at-rule blocks are
//! skipped, and everything else is kept in source order.

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

/// One compound selector, e.g. `div.badge#clock` or `:host`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub host: bool,
}

/// Complex selector stored left to right. `parts[i].0` is the combinator joining `parts[i - 1]`
/// to `parts[i]` and is ignored for the first part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    pub parts: Vec<(Combinator, Compound)>,
}

/// `(ids, classes + pseudo-classes, types)`
pub type Specificity = (u32, u32, u32);

impl Selector {
    pub fn specificity(&self) -> Specificity {
        let mut s = (0, 0, 0);
        for (_, c) in &self.parts {
            if c.id.is_some() {
                s.0 += 1;
            }
            s.1 += c.classes.len() as u32 + u32::from(c.host);
            if c.tag.is_some() {
                s.2 += 1;
            }
        }
        s
    }

    /// The compound that must match the subject element.
    pub fn subject(&self) -> Option<&Compound> {
        self.parts.last().map(|(_, c)| c)
    }
}

impl Stylesheet {
    pub fn parse(text: &str) -> Self {
        let src = strip_comments(text);
        let mut rules = Vec::new();
        let mut rest = src.as_str();

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            if rest.starts_with('@') {
                rest = skip_at_rule(rest);
                continue;
            }

            let Some(open) = rest.find('{') else {
                break;
            };
            let prelude = &rest[..open];
            let after = &rest[open + 1..];
            let close = after.find('}').unwrap_or(after.len());
            let body = &after[..close];
            rest = after.get(close + 1..).unwrap_or("");

            match parse_selector_list(prelude) {
                Some(selectors) => rules.push(Rule {
                    selectors,
                    declarations: parse_declarations(body),
                }),
                None => tracing::debug!(selector = prelude.trim(), "dropping unsupported rule"),
            }
        }

        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Skips `@import ...;` or a balanced `@media ... { ... }` block.
fn skip_at_rule(src: &str) -> &str {
    let semi = src.find(';');
    let open = src.find('{');
    match (semi, open) {
        (Some(s), Some(o)) if s < o => &src[s + 1..],
        (Some(s), None) => &src[s + 1..],
        (_, Some(o)) => {
            let mut depth = 0usize;
            for (i, ch) in src[o..].char_indices() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return &src[o + i + 1..];
                        }
                    }
                    _ => {}
                }
            }
            ""
        }
        (None, None) => "",
    }
}

pub fn parse_declarations(body: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    for decl in body.split(';') {
        let Some((name, value)) = decl.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        let mut value = value.trim();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        let mut important = false;
        if let Some(stripped) = value.strip_suffix("!important") {
            value = stripped.trim_end();
            important = true;
        }
        out.push(Declaration {
            name,
            value: value.to_string(),
            important,
        });
    }
    out
}

fn parse_selector_list(prelude: &str) -> Option<Vec<Selector>> {
    let mut out = Vec::new();
    for raw in prelude.split(',') {
        out.push(parse_selector(raw.trim())?);
    }
    if out.is_empty() { None } else { Some(out) }
}

pub fn parse_selector(raw: &str) -> Option<Selector> {
    if raw.is_empty() {
        return None;
    }

    let spaced = raw.replace('>', " > ");
    let mut parts = Vec::new();
    let mut pending = Combinator::Descendant;
    for token in spaced.split_whitespace() {
        if token == ">" {
            if parts.is_empty() {
                return None;
            }
            pending = Combinator::Child;
            continue;
        }
        parts.push((pending, parse_compound(token)?));
        pending = Combinator::Descendant;
    }

    if parts.is_empty() || pending == Combinator::Child {
        return None;
    }
    Some(Selector { parts })
}

fn parse_compound(token: &str) -> Option<Compound> {
    let mut c = Compound::default();
    let mut rest = token;

    let head_len = rest
        .find(|ch: char| matches!(ch, '.' | '#' | ':'))
        .unwrap_or(rest.len());
    let head = &rest[..head_len];
    if head != "*" && !head.is_empty() {
        if !is_ident(head) {
            return None;
        }
        c.tag = Some(head.to_ascii_lowercase());
    }
    rest = &rest[head_len..];

    while !rest.is_empty() {
        let sigil = rest.as_bytes()[0];
        let body = &rest[1..];
        let len = body
            .find(|ch: char| matches!(ch, '.' | '#' | ':'))
            .unwrap_or(body.len());
        let name = &body[..len];
        if !is_ident(name) {
            return None;
        }
        match sigil {
            b'.' => c.classes.push(name.to_string()),
            b'#' => c.id = Some(name.to_string()),
            b':' if name == "host" => c.host = true,
            _ => return None,
        }
        rest = &body[len..];
    }

    if c.host && (c.tag.is_some() || c.id.is_some() || !c.classes.is_empty()) {
        return None;
    }
    Some(c)
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// `zIndex` -> `z-index`; already-kebab names pass through lowercased.
pub fn css_property_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.trim().chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_and_declarations() {
        let sheet = Stylesheet::parse(
            "/* hi */ .badge, #clock { color: red; top: 4px !important }\n div > span {opacity: 0.5;}",
        );
        assert_eq!(sheet.rules.len(), 2);
        assert_eq!(sheet.rules[0].selectors.len(), 2);
        assert_eq!(sheet.rules[0].declarations[1].name, "top");
        assert_eq!(sheet.rules[0].declarations[1].value, "4px");
        assert!(sheet.rules[0].declarations[1].important);

        let child = &sheet.rules[1].selectors[0];
        assert_eq!(child.parts.len(), 2);
        assert_eq!(child.parts[1].0, Combinator::Child);
        assert_eq!(child.parts[1].1.tag.as_deref(), Some("span"));
    }

    #[test]
    fn skips_at_rules_and_unsupported_selectors() {
        let sheet = Stylesheet::parse(
            "@import url(x.css);\n@media (min-width: 1px) { .a { color: red } }\n a:hover { color: blue }\n .b { color: green }",
        );
        assert_eq!(sheet.rules.len(), 1);
        assert_eq!(sheet.rules[0].declarations[0].value, "green");
    }

    #[test]
    fn host_selector_specificity() {
        let sel = parse_selector(":host .layer").unwrap();
        assert!(sel.parts[0].1.host);
        assert_eq!(sel.specificity(), (0, 2, 0));
        assert_eq!(parse_selector("div#a.b.c").unwrap().specificity(), (1, 2, 1));
        assert!(parse_selector(":host.x").is_none());
        assert!(parse_selector("> a").is_none());
    }

    #[test]
    fn property_names_are_kebab_cased() {
        assert_eq!(css_property_name("zIndex"), "z-index");
        assert_eq!(css_property_name("pointer-events"), "pointer-events");
        assert_eq!(css_property_name("backgroundColor"), "background-color");
    }
}
