// Parameter-space expansion through the public API.

use gpu_cts::{err_msg, expand, ParamBinding, ParamSpec};
use pretty_assertions::assert_eq;
use serde_json::json;

fn bindings(spec: &ParamSpec) -> Vec<serde_json::Value> {
    expand(spec)
        .map(|item| serde_json::to_value(item.unwrap()).unwrap())
        .collect()
}

#[test]
fn cartesian_product_has_product_cardinality() {
    let spec = ParamSpec::new()
        .options("a", [1, 2, 3])
        .bools("b")
        .options("c", ["x", "y"]);
    let all = bindings(&spec);
    assert_eq!(all.len(), 3 * 2 * 2);
    assert_eq!(all[0], json!({"a": 1, "b": false, "c": "x"}));
    assert_eq!(all[1], json!({"a": 1, "b": false, "c": "y"}));
    assert_eq!(all[11], json!({"a": 3, "b": true, "c": "y"}));
}

#[test]
fn empty_spec_yields_one_empty_binding() {
    let all: Vec<_> = expand(&ParamSpec::new()).collect();
    assert_eq!(all.len(), 1);
    assert!(all[0].as_ref().unwrap().is_empty());
}

#[test]
fn empty_options_yield_nothing() {
    let spec = ParamSpec::new()
        .options("a", [1, 2])
        .options("b", Vec::<u32>::new());
    assert_eq!(expand(&spec).count(), 0);
}

#[test]
fn dependent_step_fans_out_per_parent() {
    let spec = ParamSpec::new().options("a", [1, 2]).expand("x", ["a"], |p| {
        Ok(match p.get_u64("a")? {
            1 => vec![10],
            _ => vec![20, 21],
        })
    });
    assert_eq!(
        bindings(&spec),
        [
            json!({"a": 1, "x": 10}),
            json!({"a": 2, "x": 20}),
            json!({"a": 2, "x": 21}),
        ]
    );
}

#[test]
fn filters_only_remove_bindings() {
    let base = ParamSpec::new()
        .options("size", [0, 4, 8, 16])
        .options("offset", [0, 4, 8]);
    let unfiltered = bindings(&base);
    let filtered = bindings(
        &ParamSpec::new()
            .options("size", [0, 4, 8, 16])
            .options("offset", [0, 4, 8])
            .unless(["size", "offset"], |p| {
                Ok(p.get_u64("offset")? >= p.get_u64("size")?)
            }),
    );

    assert!(filtered.len() < unfiltered.len());
    // Survivors keep their relative order.
    let mut rest = unfiltered.iter();
    for binding in &filtered {
        assert!(rest.any(|b| b == binding), "{binding} out of order");
    }
}

#[test]
fn expansion_failure_is_confined_to_its_branch() {
    let spec = ParamSpec::new().options("a", [1, 2, 3]).expand("b", ["a"], |p| {
        if p.get_u64("a")? == 2 {
            Err(err_msg!(Param, "no values for a=2"))
        } else {
            Ok(vec![true])
        }
    });
    let items: Vec<_> = expand(&spec).collect();
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[2].is_ok());

    let failure = items[1].as_ref().unwrap_err();
    assert_eq!(failure.step, 1);
    assert_eq!(failure.key.as_deref(), Some("b"));
    assert_eq!(failure.partial, ParamBinding::new().with("a", 2));
}

#[test]
fn expansion_restarts_from_the_beginning() {
    let spec = ParamSpec::new().options("a", [1, 2]);
    let mut first = expand(&spec);
    first.next();
    let second: Vec<_> = expand(&spec).map(|b| b.unwrap()).collect();
    assert_eq!(second.len(), 2);
    assert_eq!(first.clone().count(), 1);
}

#[test]
fn undeclared_dependency_is_a_registration_error() {
    let spec = ParamSpec::new()
        .expand("x", ["a"], |_| Ok(vec![1]))
        .options("a", [1]);
    assert!(spec.validate().is_err());
}
