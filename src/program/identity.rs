//! Cache keys for built programs.

use std::collections::BTreeSet;
use std::fmt;

/// Kernel family plus canonicalized build options.
///
/// Options are treated as a set: duplicates collapse and insertion order is
/// irrelevant. The canonical form is each option, sorted, prefixed by a
/// single space, so `family + options` reads like a compiler command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildIdentity {
    family: String,
    options: String,
}

impl BuildIdentity {
    pub fn new<I, S>(family: &str, build_options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            family: family.to_string(),
            options: canonicalize_options(build_options),
        }
    }

    /// Kernel family (program) name
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Canonical options string, empty or starting with a space.
    pub fn options(&self) -> &str {
        &self.options
    }

    /// The full key string, `family` immediately followed by the options.
    pub fn key(&self) -> String {
        format!("{}{}", self.family, self.options)
    }
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family, self.options)
    }
}

/// Joins build options into one order-independent string.
pub fn canonicalize_options<I, S>(build_options: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = build_options
        .into_iter()
        .map(|opt| opt.as_ref().to_string())
        .collect();

    let mut out = String::new();
    for option in &set {
        out.push(' ');
        out.push_str(option);
    }
    out
}
