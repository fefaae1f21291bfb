use thiserror::Error;
use tracing::debug;

use super::spec::{ParamSpec, Step};
use super::ParamBinding;
use crate::CtsError;

/// A generator or predicate failed for one partial binding.
///
/// The failure takes the place of every binding that branch would have
/// produced; sibling branches are unaffected.
#[derive(Debug, Error)]
#[error("parameter step {step} failed for {partial}: {error}")]
pub struct ExpansionFailure {
    /// Index of the failing step.
    pub step: usize,
    /// Key of the failing step, `None` for filters.
    pub key: Option<String>,
    /// The binding accumulated before the failing step.
    pub partial: ParamBinding,
    #[source]
    pub error: CtsError,
}

/// Expands `spec` lazily. Restart by cloning or by calling `expand` again.
pub fn expand(spec: &ParamSpec) -> Expansion<'_> {
    Expansion {
        steps: spec.steps(),
        stack: vec![(0, ParamBinding::new())],
    }
}

/// Depth-first walk over the parameter space.
///
/// Each stack entry is a partial binding and the index of the next step to
/// apply to it. Children are pushed in reverse so they pop in candidate
/// order, which makes later steps vary fastest.
#[derive(Clone)]
pub struct Expansion<'a> {
    steps: &'a [Step],
    stack: Vec<(usize, ParamBinding)>,
}

impl Expansion<'_> {
    fn push_children(&mut self, next: usize, key: &str, partial: &ParamBinding, values: &[serde_json::Value]) {
        for value in values.iter().rev() {
            self.stack.push((next, partial.with(key, value.clone())));
        }
    }
}

impl Iterator for Expansion<'_> {
    type Item = Result<ParamBinding, ExpansionFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let steps = self.steps;
        while let Some((index, partial)) = self.stack.pop() {
            let Some(step) = steps.get(index) else {
                return Some(Ok(partial));
            };
            match step {
                Step::Options { key, values } => {
                    self.push_children(index + 1, key, &partial, values);
                }
                Step::Expand { key, generator, .. } => match generator(&partial) {
                    Ok(values) => self.push_children(index + 1, key, &partial, &values),
                    Err(error) => return Some(Err(failure(index, step, partial, error))),
                },
                Step::Filter {
                    predicate, keep, ..
                } => match predicate(&partial) {
                    Ok(result) if result == *keep => self.stack.push((index + 1, partial)),
                    Ok(_) => {}
                    Err(error) => return Some(Err(failure(index, step, partial, error))),
                },
            }
        }
        None
    }
}

fn failure(index: usize, step: &Step, partial: ParamBinding, error: CtsError) -> ExpansionFailure {
    debug!(step = index, %partial, %error, "parameter expansion failed");
    ExpansionFailure {
        step: index,
        key: step.key().map(str::to_string),
        partial,
        error,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::err_msg;

    fn bindings(spec: &ParamSpec) -> Vec<String> {
        expand(spec)
            .map(|item| item.map(|b| b.to_string()).unwrap_or_else(|f| format!("ERR@{}", f.step)))
            .collect()
    }

    #[test]
    fn no_steps_yields_one_empty_binding() {
        assert_eq!(bindings(&ParamSpec::new()), ["{}"]);
    }

    #[test]
    fn later_steps_vary_fastest() {
        let spec = ParamSpec::new().options("a", [1, 2]).options("b", ["x", "y"]);
        assert_eq!(
            bindings(&spec),
            [
                r#"{"a":1,"b":"x"}"#,
                r#"{"a":1,"b":"y"}"#,
                r#"{"a":2,"b":"x"}"#,
                r#"{"a":2,"b":"y"}"#,
            ]
        );
    }

    #[test]
    fn empty_enumeration_collapses_branch() {
        let spec = ParamSpec::new()
            .options("a", [0, 2])
            .expand("b", ["a"], |p| Ok(0..p.get_u64("a")?));
        assert_eq!(bindings(&spec), [r#"{"a":2,"b":0}"#, r#"{"a":2,"b":1}"#]);
    }

    #[test]
    fn expansion_is_restartable() {
        let spec = ParamSpec::new().bools("a").bools("b");
        let first = expand(&spec);
        let replay = first.clone();
        assert_eq!(first.count(), 4);
        assert_eq!(replay.count(), 4);
    }

    #[test]
    fn generator_error_only_replaces_its_branch() {
        let spec = ParamSpec::new()
            .options("a", [1, 2, 3])
            .expand("b", ["a"], |p| {
                let a = p.get_u64("a")?;
                if a == 2 {
                    return Err(err_msg!(Test, "no candidates for a = {}", a));
                }
                Ok([a * 10])
            });
        let items: Vec<_> = expand(&spec).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        let failure = items[1].as_ref().unwrap_err();
        assert_eq!(failure.step, 1);
        assert_eq!(failure.key.as_deref(), Some("b"));
        assert_eq!(failure.partial.to_string(), r#"{"a":2}"#);
        assert!(items[2].is_ok());
    }
}
