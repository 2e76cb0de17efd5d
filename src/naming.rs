use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    static ref RUST_KEYWORDS: HashSet<&'static str> = [
        "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
        "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
        "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait",
        "true", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do",
        "final", "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try",
        "gen",
    ]
    .into_iter()
    .collect();
    /// Keywords that can't be used as raw identifiers either
    static ref RUST_NON_RAW: HashSet<&'static str> =
        ["self", "Self", "super", "crate"].into_iter().collect();
}

/// `PetOwner` -> `pet_owner`, `petId` -> `pet_id`, `hello-world` -> `hello_world`
pub fn snake_case(s: &str) -> String {
    let mut out = String::new();
    let mut after_lower = false;
    for c in s.chars() {
        if !c.is_ascii_alphanumeric() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            after_lower = false;
        } else if c.is_ascii_uppercase() {
            if after_lower && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            after_lower = false;
        } else {
            out.push(c);
            after_lower = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// `pet owner` -> `PetOwner`, `get_hello_user` -> `GetHelloUser`. The rest of each word is kept
/// as-is so `petId` becomes `PetId`.
pub fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Like [`pascal_case`], with `prefix` prepended when the result would not start with a letter
pub fn pascal_case_or(s: &str, prefix: &str) -> String {
    let name = pascal_case(s);
    if name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name
    } else {
        format!("{}{}", prefix, name)
    }
}

/// A field or parameter name usable as a Rust identifier
pub fn rust_field_ident(name: &str) -> String {
    let mut ident = snake_case(name);
    if ident.is_empty() {
        ident = "value".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident = format!("_{}", ident);
    }
    if RUST_NON_RAW.contains(ident.as_str()) {
        format!("{}_", ident)
    } else if RUST_KEYWORDS.contains(ident.as_str()) {
        format!("r#{}", ident)
    } else {
        ident
    }
}

/// A field name usable in a protobuf message
pub fn proto_field_ident(name: &str) -> String {
    let ident = snake_case(name);
    if ident.is_empty() {
        "value".to_string()
    } else if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("field_{}", ident)
    } else {
        ident
    }
}

/// `InvalidCharacters` -> `INVALID_CHARACTERS`
pub fn screaming_snake_case(s: &str) -> String {
    snake_case(s).to_ascii_uppercase()
}

/// Hands out unique names in the order they are claimed. Two names clash when their snake case
/// forms do, since those become file names. Clashing names get `_2`, `_3`, ...
#[derive(Debug, Default, Clone)]
pub struct NameRegistry {
    taken: HashSet<String>,
}

impl NameRegistry {
    pub fn with_reserved<'a>(reserved: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: reserved.into_iter().map(snake_case).collect(),
        }
    }

    pub fn claim(&mut self, base: &str) -> String {
        if self.taken.insert(snake_case(base)) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            if self.taken.insert(snake_case(&candidate)) {
                return candidate;
            }
            suffix += 1;
        }
    }
}
