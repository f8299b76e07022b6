//! Literal text substitutions applied to a script before it is split.

use std::{borrow::Cow, fmt, str::FromStr};

use crate::common::*;

/// A single `old` → `new` literal rewrite.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Replacement {
    /// The text to look for.
    old: String,
    /// The text to put in its place.
    new: String,
}

impl Replacement {
    /// Create a new rewrite rule.
    pub fn new<O, N>(old: O, new: N) -> Self
    where
        O: Into<String>,
        N: Into<String>,
    {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.old, self.new)
    }
}

impl FromStr for Replacement {
    type Err = Error;

    /// Parse `OLD=NEW`, splitting on the first `=`.
    fn from_str(s: &str) -> Result<Self> {
        let (old, new) = s.split_once('=').ok_or_else(|| {
            format_err!("expected replacement of the form OLD=NEW, found {:?}", s)
        })?;
        if old.is_empty() {
            return Err(format_err!("cannot replace the empty string in {:?}", s));
        }
        Ok(Replacement::new(old, new))
    }
}

/// An ordered list of literal rewrites.
///
/// Rules run once each, left to right, over the whole text. A later rule sees
/// the output of earlier rules, so `a=b` followed by `b=c` turns `a` into `c`,
/// but no rule is ever applied a second time.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Replacements {
    rules: Vec<Replacement>,
}

impl Replacements {
    /// An empty list of rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of `OLD=NEW` command-line arguments, keeping their order.
    pub fn from_cli_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let rules = args
            .into_iter()
            .map(|s| s.as_ref().parse::<Replacement>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Apply every rule to `text`. Borrows `text` if no rule matched.
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for rule in &self.rules {
            if rule.old.is_empty() {
                // `str::replace` would insert `new` between every character.
                warn!("skipping replacement with empty pattern: {}", rule);
                continue;
            }
            if out.contains(&rule.old[..]) {
                trace!("applying replacement {}", rule);
                out = Cow::Owned(out.replace(&rule.old[..], &rule.new));
            }
        }
        out
    }
}

impl<O, N> FromIterator<(O, N)> for Replacements
where
    O: Into<String>,
    N: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (O, N)>>(iter: I) -> Self {
        Self {
            rules: iter
                .into_iter()
                .map(|(old, new)| Replacement::new(old, new))
                .collect(),
        }
    }
}

#[test]
fn parses_cli_args_in_order() {
    let replacements =
        Replacements::from_cli_args(["{{ds}}=prod.events", "x=a=b"]).unwrap();
    assert_eq!(
        replacements.rules,
        vec![
            Replacement::new("{{ds}}", "prod.events"),
            // Only the first `=` separates the pattern from its replacement.
            Replacement::new("x", "a=b"),
        ],
    );
}

#[test]
fn rejects_malformed_cli_args() {
    assert!(Replacements::from_cli_args(["no-equals-sign"]).is_err());
    assert!(Replacements::from_cli_args(["=value"]).is_err());
}

#[test]
fn empty_replacements_borrow_input() {
    let text = "select 1 from t";
    assert!(matches!(Replacements::new().apply(text), Cow::Borrowed(_)));
}

#[test]
fn later_rules_see_earlier_output() {
    let replacements = [("a", "b"), ("b", "c")]
        .into_iter()
        .collect::<Replacements>();
    assert_eq!(replacements.apply("a b"), "c c");

    // Reversing the order changes the result, and nothing is applied twice.
    let reversed = [("b", "c"), ("a", "b")]
        .into_iter()
        .collect::<Replacements>();
    assert_eq!(reversed.apply("a b"), "b c");
}

#[test]
fn self_referential_rule_terminates() {
    let replacements = [("x", "xx")].into_iter().collect::<Replacements>();
    assert_eq!(replacements.apply("x-x"), "xx-xx");
}

#[test]
fn empty_pattern_is_ignored() {
    let replacements = [("", "!")].into_iter().collect::<Replacements>();
    assert_eq!(replacements.apply("abc"), "abc");
}
