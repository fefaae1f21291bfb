//! Case identities and the query strings that address them.
//!
//! # Raw form
//!
//! `suite:path/segments:test_name:{"key":value,...}`. The binding part is
//! empty for tests without parameters. Suite names, path segments and test
//! names never contain `:` (and segments never contain `/`), so the first
//! three `:` split the fields unambiguously; the binding JSON may contain
//! further `:`.
//!
//! # Query form
//!
//! `?q=<raw>`, percent-encoded like `encodeURIComponent` except that a small
//! set of characters common in identities stays literal to keep queries
//! readable: space (written as `+`), `"`, `,`, `/`, `:`, `{` and `}`.
//! Decoding is plain `application/x-www-form-urlencoded`, so fully escaped
//! queries decode to the same identity.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::params::ParamBinding;
use crate::registry::validate_name;
use crate::{err_help, err_msg, CtsError};

/// Characters `encodeURIComponent` escapes, minus the readable whitelist.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b' ')
    .remove(b'"')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b'{')
    .remove(b'}');

/// The unique address of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseIdentity {
    pub suite: String,
    pub path: Vec<String>,
    pub test_name: String,
    /// `None` for tests registered without a parameter spec.
    pub binding: Option<ParamBinding>,
}

impl CaseIdentity {
    /// Builds an identity without checking its names.
    ///
    /// The suite name, every path segment and the test name must be
    /// non-empty and free of `:` and `/`, or the raw form will not parse
    /// back to the same identity. [`Suite`](crate::registry::Suite) only
    /// produces such names; use [`CaseIdentity::try_new`] for anything else.
    pub fn new(
        suite: impl Into<String>,
        path: Vec<String>,
        test_name: impl Into<String>,
        binding: Option<ParamBinding>,
    ) -> Self {
        Self {
            suite: suite.into(),
            path,
            test_name: test_name.into(),
            binding,
        }
    }

    /// Like [`CaseIdentity::new`], but rejects names the raw form cannot carry.
    pub fn try_new(
        suite: impl Into<String>,
        path: Vec<String>,
        test_name: impl Into<String>,
        binding: Option<ParamBinding>,
    ) -> Result<Self, CtsError> {
        let identity = Self::new(suite, path, test_name, binding);
        let names = std::iter::once(("suite name", &identity.suite))
            .chain(identity.path.iter().map(|segment| ("path segment", segment)))
            .chain(std::iter::once(("test name", &identity.test_name)));
        for (kind, name) in names {
            validate_name(kind, name)
                .map_err(|error| err_msg!(Query, "invalid case identity: {}", error))?;
        }
        Ok(identity)
    }

    /// Parses the raw form.
    pub fn parse(raw: &str) -> Result<Self, CtsError> {
        let mut fields = raw.splitn(4, ':');
        let (Some(suite), Some(path), Some(test_name), Some(binding)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(err_help!(
                Query,
                "a case looks like suite:path/to/group:test:{...}",
                "'{}' is not a full case identity",
                raw
            ));
        };
        if suite.is_empty() || test_name.is_empty() {
            return Err(err_msg!(Query, "'{}' has an empty suite or test name", raw));
        }
        let binding = match binding {
            "" => None,
            json => Some(ParamBinding::from_json(json)?),
        };
        Self::try_new(suite, split_path(path), test_name, binding)
    }

    /// The `?q=` query string addressing exactly this case.
    pub fn to_query(&self) -> String {
        encode(self)
    }
}

impl fmt::Display for CaseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:", self.suite, self.path.join("/"), self.test_name)?;
        match &self.binding {
            Some(binding) => write!(f, "{binding}"),
            None => Ok(()),
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').map(str::to_string).collect()
    }
}

/// Encodes one identity as `?q=<selectively escaped raw form>`.
pub fn encode(identity: &CaseIdentity) -> String {
    let raw = identity.to_string();
    let escaped = utf8_percent_encode(&raw, QUERY_COMPONENT).to_string();
    format!("?q={}", escaped.replace(' ', "+"))
}

/// Returns every `q` value of a query string, in order. The leading `?` is optional.
pub fn decode(query: &str) -> Vec<String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == "q")
        .map(|(_, value)| value.into_owned())
        .collect()
}

/// A selection of cases: a suite, a group prefix, a test, or one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseQuery {
    Suite(String),
    Group {
        suite: String,
        path: Vec<String>,
    },
    Test {
        suite: String,
        path: Vec<String>,
        test_name: String,
    },
    Case(CaseIdentity),
}

impl CaseQuery {
    /// Parses `suite`, `suite:path`, `suite:path:test` or a full raw identity.
    pub fn parse(raw: &str) -> Result<Self, CtsError> {
        let fields: Vec<&str> = raw.splitn(4, ':').collect();
        match fields.as_slice() {
            [""] | [] => Err(err_msg!(Query, "empty case query")),
            [suite] => Ok(CaseQuery::Suite(suite.to_string())),
            [suite, path] => Ok(CaseQuery::Group {
                suite: suite.to_string(),
                path: split_path(path),
            }),
            [suite, path, test_name] => Ok(CaseQuery::Test {
                suite: suite.to_string(),
                path: split_path(path),
                test_name: test_name.to_string(),
            }),
            _ => CaseIdentity::parse(raw).map(CaseQuery::Case),
        }
    }

    /// Parses every case selected by a query string or a bare raw form.
    pub fn parse_all(input: &str) -> Result<Vec<Self>, CtsError> {
        let input = input.trim();
        if input.starts_with('?') || input.starts_with("q=") {
            decode(input).iter().map(|raw| Self::parse(raw)).collect()
        } else {
            Ok(vec![Self::parse(input)?])
        }
    }

    /// Prefixes match whole path segments; a full identity matches exactly.
    pub fn matches(&self, identity: &CaseIdentity) -> bool {
        let under = |suite: &str, path: &[String]| {
            identity.suite == suite && identity.path.starts_with(path)
        };
        match self {
            CaseQuery::Suite(suite) => identity.suite == *suite,
            CaseQuery::Group { suite, path } => under(suite, path),
            CaseQuery::Test {
                suite,
                path,
                test_name,
            } => identity.suite == *suite && identity.path == *path && identity.test_name == *test_name,
            CaseQuery::Case(case) => case == identity,
        }
    }
}

impl fmt::Display for CaseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseQuery::Suite(suite) => write!(f, "{suite}"),
            CaseQuery::Group { suite, path } => write!(f, "{suite}:{}", path.join("/")),
            CaseQuery::Test {
                suite,
                path,
                test_name,
            } => write!(f, "{suite}:{}:{test_name}", path.join("/")),
            CaseQuery::Case(case) => write!(f, "{case}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(binding: Option<ParamBinding>) -> CaseIdentity {
        CaseIdentity::new(
            "webgpu",
            vec!["api".into(), "validation".into()],
            "copy",
            binding,
        )
    }

    #[test]
    fn raw_form_joins_fields() {
        let binding = ParamBinding::new().with("size", 4).with("label", "a b");
        assert_eq!(
            identity(Some(binding)).to_string(),
            r#"webgpu:api/validation:copy:{"size":4,"label":"a b"}"#
        );
        assert_eq!(identity(None).to_string(), "webgpu:api/validation:copy:");
    }

    #[test]
    fn whitelisted_characters_stay_literal() {
        let binding = ParamBinding::new().with("s", "a b/c&d");
        let encoded = encode(&identity(Some(binding)));
        assert_eq!(
            encoded,
            r#"?q=webgpu:api/validation:copy:{"s":"a+b/c%26d"}"#
        );
    }

    #[test]
    fn identities_with_reserved_characters_are_rejected() {
        let err = CaseIdentity::try_new("webgpu", vec!["api".into()], "a:b", None).unwrap_err();
        assert_eq!(err.error_type(), crate::ErrorType::Query);
        assert!(CaseIdentity::try_new("webgpu", vec!["a/b".into()], "copy", None).is_err());
        assert!(CaseIdentity::try_new("webgpu", vec![], "copy", None).is_ok());
        assert!(CaseIdentity::parse("webgpu:api//validation:copy:").is_err());
    }

    #[test]
    fn parse_splits_on_first_three_separators() {
        let binding = ParamBinding::new().with("s", "x:y");
        let original = identity(Some(binding));
        let parsed = CaseIdentity::parse(&original.to_string()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn empty_path_round_trips() {
        let original = CaseIdentity::new("s", Vec::new(), "t", None);
        let decoded = decode(&encode(&original));
        assert_eq!(decoded, ["s::t:"]);
        assert_eq!(CaseIdentity::parse(&decoded[0]).unwrap(), original);
    }

    #[test]
    fn fully_escaped_queries_decode_too() {
        let decoded = decode("q=webgpu%3Aapi%2Fvalidation%3Acopy%3A&q=other");
        assert_eq!(decoded, ["webgpu:api/validation:copy:", "other"]);
    }

    #[test]
    fn group_prefix_matches_whole_segments() {
        let query = CaseQuery::parse("webgpu:api").unwrap();
        assert!(query.matches(&identity(None)));
        let partial_segment = CaseQuery::parse("webgpu:ap").unwrap();
        assert!(!partial_segment.matches(&identity(None)));
    }

    #[test]
    fn full_identity_matches_only_that_case() {
        let one = identity(Some(ParamBinding::new().with("size", 4)));
        let other = identity(Some(ParamBinding::new().with("size", 8)));
        let query = CaseQuery::parse(&one.to_string()).unwrap();
        assert!(query.matches(&one));
        assert!(!query.matches(&other));
        assert!(!query.matches(&identity(None)));

        let test = CaseQuery::parse("webgpu:api/validation:copy").unwrap();
        assert!(test.matches(&one) && test.matches(&other));
    }

    #[test]
    fn parse_all_accepts_query_strings() {
        let queries = CaseQuery::parse_all("?q=webgpu:api&q=webgpu").unwrap();
        assert_eq!(queries.len(), 2);
        assert!(CaseQuery::parse("").is_err());
    }
}
