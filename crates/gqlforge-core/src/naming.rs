//! Go naming conventions for generated identifiers.
//!
//! GraphQL names are converted into exported Go names the way Go code is
//! conventionally written: words are split on case changes, digits and
//! separators, capitalized, and common initialisms are upper-cased
//! (`userId` becomes `UserID`, `htmlUrl` becomes `HTMLURL`).

const COMMON_INITIALISMS: &[&str] = &[
    "ACL", "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID",
    "IP", "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SLA", "SMTP", "SQL", "SSH", "TCP", "TLS",
    "TTL", "UDP", "UI", "UID", "UUID", "URI", "URL", "UTF8", "VM", "XML", "XMPP", "XSRF", "XSS",
];

/// Reserved words of the Go language
pub const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

pub fn is_go_keyword(ident: &str) -> bool {
    GO_KEYWORDS.contains(&ident)
}

/// Whether a Go identifier is exported
///
/// # Examples
/// ```
/// use gqlforge_core::naming::is_exported;
/// assert!(is_exported("User"));
/// assert!(!is_exported("user"));
/// assert!(!is_exported("_User"));
/// ```
pub fn is_exported(name: &str) -> bool {
    name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
}

/// Exported Go name for a GraphQL name
///
/// # Examples
/// ```
/// use gqlforge_core::naming::to_go_name;
/// assert_eq!(to_go_name("user"), "User");
/// assert_eq!(to_go_name("userId"), "UserID");
/// assert_eq!(to_go_name("html_url"), "HTMLURL");
/// assert_eq!(to_go_name("NEW_USER"), "NewUser");
/// ```
pub fn to_go_name(name: &str) -> String {
    split_words(name)
        .iter()
        .map(|word| {
            let upper = word.to_uppercase();
            if COMMON_INITIALISMS.contains(&upper.as_str()) {
                upper
            } else {
                uc_first(&word.to_lowercase())
            }
        })
        .collect()
}

/// Unexported Go name, e.g. for resolver implementation structs
///
/// Keywords get an `Arg` suffix since the result is used as a parameter
/// name.
///
/// # Examples
/// ```
/// use gqlforge_core::naming::to_go_private_name;
/// assert_eq!(to_go_private_name("Query"), "query");
/// assert_eq!(to_go_private_name("ID"), "id");
/// assert_eq!(to_go_private_name("UserProfile"), "userProfile");
/// assert_eq!(to_go_private_name("type"), "typeArg");
/// ```
pub fn to_go_private_name(name: &str) -> String {
    let words = split_words(name);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        let upper = word.to_uppercase();
        if i == 0 {
            out.push_str(&word.to_lowercase());
        } else if COMMON_INITIALISMS.contains(&upper.as_str()) {
            out.push_str(&upper);
        } else {
            out.push_str(&uc_first(&word.to_lowercase()));
        }
    }
    if is_go_keyword(&out) {
        out.push_str("Arg");
    }
    out
}

pub fn uc_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

pub fn lc_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

/// Split on separators, lower-to-upper transitions and the end of an
/// upper-case run (`HTMLParser` -> `HTML`, `Parser`)
fn split_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if !current.is_empty() && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).map(|n| n.is_lowercase()).unwrap_or(false);
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("HTMLParser"), vec!["HTML", "Parser"]);
        assert_eq!(split_words("createdAt"), vec!["created", "At"]);
        assert_eq!(split_words("__Type"), vec!["Type"]);
        assert_eq!(split_words("v2Client"), vec!["v2", "Client"]);
    }

    #[test]
    fn test_to_go_name_enum_values() {
        assert_eq!(to_go_name("ACTIVE"), "Active");
        assert_eq!(to_go_name("IN_PROGRESS"), "InProgress");
        assert_eq!(to_go_name("api"), "API");
    }

    #[test]
    fn test_lc_uc_first() {
        assert_eq!(lc_first("Resolver"), "resolver");
        assert_eq!(uc_first("query"), "Query");
        assert_eq!(lc_first(""), "");
    }

    #[test]
    fn test_private_names_avoid_keywords() {
        assert_eq!(to_go_private_name("type"), "typeArg");
        assert_eq!(to_go_private_name("Range"), "rangeArg");
        assert_eq!(to_go_private_name("typeName"), "typeName");
        assert!(is_go_keyword("func"));
        assert!(!is_go_keyword("string"));
    }
}
