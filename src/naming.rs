//! Name forms for resource kinds: kebab-case, plural/singular inflection and short aliases.
//! e.g. "CountType" -> plural "count-types", singular "count-type", short name "ct".

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// The naming forms a resource kind is served under.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindNames {
    pub plural: String,
    pub singular: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_names: Vec<String>,
    pub kind: String,
    pub list_kind: String,
}

impl KindNames {
    /// Derive every naming form from a bare type name such as "Count".
    pub fn from_name(name: &str) -> Self {
        let kebab = to_kebab_case(name);
        let short = guess_short_name(name);
        KindNames {
            plural: pluralize(&kebab),
            singular: singularize(&kebab),
            short_names: if short.is_empty() { Vec::new() } else { vec![short] },
            kind: name.to_string(),
            list_kind: format!("{}List", name),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plural.is_empty() || self.singular.is_empty() || self.kind.is_empty()
    }
}

/// Convert an identifier to lower kebab-case.
/// e.g. "CountType" -> "count-type", "HTTPServer" -> "http-server", "Not Found" -> "not-found"
pub fn to_kebab_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, ' ' | '_' | '-' | '.') {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if boundary && !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
        }
        out.extend(c.to_lowercase());
    }
    out.trim_end_matches('-').to_string()
}

/// Lowercased initials of each capitalized word in the name. Names with fewer than two
/// capitalized words get no alias.
/// e.g. "UserName" -> "un", "HTTPServer" -> "hs", "Count" -> ""
pub fn guess_short_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut initials = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_uppercase() {
            continue;
        }
        let starts_word = match i.checked_sub(1).map(|p| chars[p]) {
            None => true,
            Some(prev) if !prev.is_uppercase() => true,
            Some(_) => chars.get(i + 1).is_some_and(|n| n.is_lowercase()),
        };
        if starts_word {
            initials.extend(c.to_lowercase());
        }
    }
    if initials.chars().count() < 2 {
        return String::new();
    }
    initials
}

const UNCOUNTABLE: &[&str] = &[
    "equipment", "information", "rice", "money", "species", "series", "fish", "sheep", "jeans",
    "police", "metadata", "data",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("child", "children"),
    ("sex", "sexes"),
    ("move", "moves"),
    ("zombie", "zombies"),
];

type Rules = Vec<(Regex, &'static str)>;

fn compile(rules: &[(&str, &'static str)]) -> Rules {
    rules
        .iter()
        .map(|(pattern, replacement)| {
            (Regex::new(pattern).expect("static inflection pattern"), *replacement)
        })
        .collect()
}

// First match wins.
static PLURAL_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        ("(quiz)$", "${1}zes"),
        ("^(oxen)$", "${1}"),
        ("^(ox)$", "${1}en"),
        ("(^|-)(m|l)ice$", "${1}${2}ice"),
        ("(^|-)(m|l)ouse$", "${1}${2}ice"),
        ("(matr|vert|ind)(?:ix|ex)$", "${1}ices"),
        ("(x|ch|ss|sh)$", "${1}es"),
        ("([^aeiouy]|qu)y$", "${1}ies"),
        ("(hive)$", "${1}s"),
        ("(?:([^f])fe|([lr])f)$", "${1}${2}ves"),
        ("sis$", "ses"),
        ("([ti])a$", "${1}a"),
        ("([ti])um$", "${1}a"),
        ("(buffal|tomat)o$", "${1}oes"),
        ("(bu)s$", "${1}ses"),
        ("(alias|status)$", "${1}es"),
        ("(octop|vir)i$", "${1}i"),
        ("(octop|vir)us$", "${1}i"),
        ("(^|-)(ax|test)is$", "${1}${2}es"),
        ("s$", "s"),
        ("$", "s"),
    ])
});

static SINGULAR_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        ("(database)s$", "${1}"),
        ("(quiz)zes$", "${1}"),
        ("(matr)ices$", "${1}ix"),
        ("(vert|ind)ices$", "${1}ex"),
        ("(^|-)(ox)en$", "${1}${2}"),
        ("(alias|status)(es)?$", "${1}"),
        ("(octop|vir)(us|i)$", "${1}us"),
        ("(^|-)(a)x[ie]s$", "${1}${2}xis"),
        ("(cris|test)(is|es)$", "${1}is"),
        ("(shoe)s$", "${1}"),
        ("(o)es$", "${1}"),
        ("(bus)(es)?$", "${1}"),
        ("(^|-)(m|l)ice$", "${1}${2}ouse"),
        ("(x|ch|ss|sh)es$", "${1}"),
        ("(m)ovies$", "${1}ovie"),
        ("(s)eries$", "${1}eries"),
        ("([^aeiouy]|qu)ies$", "${1}y"),
        ("([lr])ves$", "${1}f"),
        ("(tive)s$", "${1}"),
        ("(hive)s$", "${1}"),
        ("([^f])ves$", "${1}fe"),
        ("(analy|ba|diagno|parenthe|progno|synop|the)(sis|ses)$", "${1}sis"),
        ("([ti])a$", "${1}um"),
        ("(n)ews$", "${1}ews"),
        ("(ss)$", "${1}"),
        ("s$", ""),
    ])
});

/// Last hyphen-separated segment of a kebab name; inflection only ever touches it.
fn last_word(s: &str) -> &str {
    s.rsplit('-').next().unwrap_or(s)
}

fn inflect(s: &str, rules: &Rules, irregular: impl Fn(&str) -> Option<&'static str>) -> String {
    if s.is_empty() {
        return String::new();
    }
    let word = last_word(s);
    let head = &s[..s.len() - word.len()];
    if UNCOUNTABLE.contains(&word) {
        return s.to_string();
    }
    if let Some(form) = irregular(word) {
        return format!("{}{}", head, form);
    }
    for (re, replacement) in rules.iter() {
        if re.is_match(s) {
            return re.replace(s, *replacement).into_owned();
        }
    }
    s.to_string()
}

/// Plural form of a lower-kebab name; only the last word is inflected.
pub fn pluralize(s: &str) -> String {
    inflect(s, &PLURAL_RULES, |word| {
        IRREGULAR
            .iter()
            .find(|(singular, plural)| *singular == word || *plural == word)
            .map(|(_, plural)| *plural)
    })
}

/// Singular form of a lower-kebab name; only the last word is inflected.
pub fn singularize(s: &str) -> String {
    inflect(s, &SINGULAR_RULES, |word| {
        IRREGULAR
            .iter()
            .find(|(singular, plural)| *singular == word || *plural == word)
            .map(|(singular, _)| *singular)
    })
}
