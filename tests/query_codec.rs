// Case identity <-> query string codec.

use gpu_cts::query::{decode, encode};
use gpu_cts::{CaseIdentity, CaseQuery, ParamBinding};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ +%&=.-]{1,8}"
}

fn binding() -> impl Strategy<Value = Option<ParamBinding>> {
    let value = prop_oneof![
        any::<u32>().prop_map(serde_json::Value::from),
        any::<bool>().prop_map(serde_json::Value::from),
        "[ -~]{0,6}".prop_map(serde_json::Value::from),
    ];
    proptest::option::of(proptest::collection::vec(("[a-z_]{1,5}", value), 0..4).prop_map(
        |pairs| {
            pairs
                .into_iter()
                .fold(ParamBinding::new(), |b, (k, v)| b.with(k, v))
        },
    ))
}

fn identity() -> impl Strategy<Value = CaseIdentity> {
    (
        name(),
        proptest::collection::vec(name(), 0..4),
        name(),
        binding(),
    )
        .prop_map(|(suite, path, test, binding)| CaseIdentity::new(suite, path, test, binding))
}

proptest! {
    #[test]
    fn query_decodes_to_the_same_identity(original in identity()) {
        let query = encode(&original);
        let decoded = decode(&query);
        prop_assert_eq!(decoded.len(), 1);
        let parsed = CaseIdentity::parse(&decoded[0]).unwrap();
        prop_assert_eq!(parsed, original);
    }

    #[test]
    fn readable_characters_are_never_escaped(original in identity()) {
        let query = encode(&original);
        let body = query.strip_prefix("?q=").unwrap();
        for c in ['"', ',', '/', ':', '{', '}', ' '] {
            let escaped = format!("%{:02X}", c as u32);
            prop_assert!(!body.contains(&escaped), "{} escaped in {}", c, query);
        }
    }
}

#[test]
fn reserved_query_characters_are_escaped() {
    let identity = CaseIdentity::new(
        "webgpu",
        vec!["a+b".to_string(), "c&d".to_string()],
        "t=1",
        None,
    );
    assert_eq!(encode(&identity), "?q=webgpu:a%2Bb/c%26d:t%3D1:");
}

#[test]
fn spaces_are_written_as_plus() {
    let identity = CaseIdentity::new(
        "s",
        vec![],
        "t",
        Some(ParamBinding::new().with("k", "a b")),
    );
    assert_eq!(encode(&identity), r#"?q=s::t:{"k":"a+b"}"#);
    assert_eq!(decode(&encode(&identity)), [r#"s::t:{"k":"a b"}"#]);
}

#[test]
fn several_queries_in_one_string() {
    let queries = CaseQuery::parse_all("?q=webgpu:api&q=webgpu:api/validation:copy").unwrap();
    assert_eq!(
        queries,
        [
            CaseQuery::Group {
                suite: "webgpu".to_string(),
                path: vec!["api".to_string()],
            },
            CaseQuery::Test {
                suite: "webgpu".to_string(),
                path: vec!["api".to_string(), "validation".to_string()],
                test_name: "copy".to_string(),
            },
        ]
    );
}

#[test]
fn truncated_identity_is_rejected() {
    assert!(CaseIdentity::parse("webgpu:api").is_err());
    assert!(CaseIdentity::parse(":api:t:").is_err());
}
