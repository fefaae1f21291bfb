use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::ParamBinding;
use crate::{err_help, err_msg, CtsError};

pub(crate) type Generator = Rc<dyn Fn(&ParamBinding) -> Result<Vec<Value>, CtsError>>;
pub(crate) type Predicate = Rc<dyn Fn(&ParamBinding) -> Result<bool, CtsError>>;

/// One step of a [`ParamSpec`].
#[derive(Clone)]
pub enum Step {
    /// A fixed, ordered list of candidate values for `key`.
    Options { key: String, values: Vec<Value> },
    /// Candidates for `key` computed from the binding accumulated so far.
    Expand {
        key: String,
        deps: Vec<String>,
        generator: Generator,
    },
    /// Drops bindings for which the predicate does not equal `keep`.
    Filter {
        deps: Vec<String>,
        predicate: Predicate,
        keep: bool,
    },
}

impl Step {
    /// The key this step introduces, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            Step::Options { key, .. } | Step::Expand { key, .. } => Some(key),
            Step::Filter { .. } => None,
        }
    }

    fn deps(&self) -> &[String] {
        match self {
            Step::Options { .. } => &[],
            Step::Expand { deps, .. } | Step::Filter { deps, .. } => deps,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Options { key, values } => f
                .debug_struct("Options")
                .field("key", key)
                .field("values", values)
                .finish(),
            Step::Expand { key, deps, .. } => f
                .debug_struct("Expand")
                .field("key", key)
                .field("deps", deps)
                .finish_non_exhaustive(),
            Step::Filter { deps, keep, .. } => f
                .debug_struct("Filter")
                .field("deps", deps)
                .field("keep", keep)
                .finish_non_exhaustive(),
        }
    }
}

/// A declarative description of a test's parameter space.
///
/// Built once at registration time and immutable afterwards. Steps that run
/// user code declare the keys they read so registration can check them.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    steps: Vec<Step>,
}

fn owned_keys<I>(deps: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    deps.into_iter().map(Into::into).collect()
}

impl ParamSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Adds an enumeration step.
    pub fn options<V, I>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.steps.push(Step::Options {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Shorthand for `options(key, [false, true])`.
    pub fn bools(self, key: impl Into<String>) -> Self {
        self.options(key, [false, true])
    }

    /// Adds a dependent enumeration step. `f` may only read `deps`.
    pub fn expand<D, F, I, V>(mut self, key: impl Into<String>, deps: D, f: F) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        F: Fn(&ParamBinding) -> Result<I, CtsError> + 'static,
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.steps.push(Step::Expand {
            key: key.into(),
            deps: owned_keys(deps),
            generator: Rc::new(move |binding| {
                Ok(f(binding)?.into_iter().map(Into::into).collect())
            }),
        });
        self
    }

    /// Keeps only bindings for which `predicate` holds.
    pub fn filter<D, F>(self, deps: D, predicate: F) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        F: Fn(&ParamBinding) -> Result<bool, CtsError> + 'static,
    {
        self.push_filter(owned_keys(deps), Rc::new(predicate), true)
    }

    /// Drops bindings for which `predicate` holds.
    pub fn unless<D, F>(self, deps: D, predicate: F) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        F: Fn(&ParamBinding) -> Result<bool, CtsError> + 'static,
    {
        self.push_filter(owned_keys(deps), Rc::new(predicate), false)
    }

    /// Appends every step of `other`.
    pub fn combine(mut self, other: ParamSpec) -> Self {
        self.steps.extend(other.steps);
        self
    }

    fn push_filter(mut self, deps: Vec<String>, predicate: Predicate, keep: bool) -> Self {
        self.steps.push(Step::Filter {
            deps,
            predicate,
            keep,
        });
        self
    }

    /// Checks key uniqueness and that every declared dependency is
    /// introduced by a strictly earlier step.
    pub fn validate(&self) -> Result<(), CtsError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            for dep in step.deps() {
                if !seen.contains(dep.as_str()) {
                    return Err(err_help!(
                        Registration,
                        "declare the key in an earlier step",
                        "step {} depends on '{}', which no earlier step binds",
                        index,
                        dep
                    ));
                }
            }
            if let Some(key) = step.key() {
                if key.is_empty() {
                    return Err(err_msg!(Registration, "step {} has an empty key", index));
                }
                if !seen.insert(key) {
                    return Err(err_msg!(
                        Registration,
                        "parameter key '{}' is bound more than once",
                        key
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;

    #[test]
    fn duplicate_keys_are_rejected() {
        let spec = ParamSpec::new().options("a", [1]).bools("a");
        let err = spec.validate().unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Registration);
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn dependencies_must_come_from_earlier_steps() {
        let forward = ParamSpec::new()
            .expand("x", ["a"], |_| Ok([1]))
            .options("a", [1, 2]);
        assert!(forward.validate().is_err());

        let self_reference = ParamSpec::new().expand("x", ["x"], |_| Ok([1]));
        assert!(self_reference.validate().is_err());

        let ok = ParamSpec::new()
            .options("a", [1, 2])
            .expand("x", ["a"], |p| Ok([p.get_u64("a")? * 10]))
            .filter(["a", "x"], |_| Ok(true));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn combine_appends_steps() {
        let spec = ParamSpec::new()
            .options("a", [1])
            .combine(ParamSpec::new().bools("b"));
        let keys: Vec<_> = spec.steps().iter().filter_map(Step::key).collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
