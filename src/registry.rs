//! Test groups and suites.
//!
//! A test module builds a [`TestGroup`] bound to one fixture type, registers
//! named tests on it, and hands it to a [`Suite`] under a path. A suite is an
//! ordinary value returned from a module-level function; there is no global
//! registry.
//!
//! Registration errors (duplicate names, invalid names, malformed parameter
//! specs) are returned immediately. After the first one the group is
//! poisoned: further registration and adding it to a suite fail with the
//! same message.

use std::fmt;
use std::rc::Rc;

use futures_lite::future;
use tracing::debug;

use crate::device::{Device, LocalBoxFuture};
use crate::engine::{execute_case, CaseError, CaseErrorKind, CaseResult};
use crate::fixture::Fixture;
use crate::params::{expand, ExpansionFailure, ParamBinding, ParamSpec};
use crate::query::CaseIdentity;
use crate::{err_help, err_msg, CtsError};

/// A test body. Receives the case's fixture and parameter binding.
pub type TestFn<F> =
    Box<dyn for<'a> Fn(&'a mut F, &'a ParamBinding) -> LocalBoxFuture<'a, Result<(), CtsError>>>;

/// One registered test.
pub struct TestCase<F> {
    pub name: String,
    pub params: Option<ParamSpec>,
    pub(crate) body: TestFn<F>,
}

impl<F> fmt::Debug for TestCase<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn boxed<F, B>(body: B) -> TestFn<F>
where
    B: for<'a> Fn(&'a mut F, &'a ParamBinding) -> LocalBoxFuture<'a, Result<(), CtsError>> + 'static,
{
    Box::new(body)
}

/// Checks a suite name, path segment or test name.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<(), CtsError> {
    if name.is_empty() {
        return Err(err_msg!(Registration, "{} must not be empty", kind));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, ':' | '/')) {
        return Err(err_help!(
            Registration,
            "':' separates identity fields and '/' separates path segments",
            "{} '{}' contains reserved character '{}'",
            kind,
            name,
            c
        ));
    }
    Ok(())
}

/// An ordered set of tests sharing a fixture type.
pub struct TestGroup<F> {
    description: String,
    tests: Vec<TestCase<F>>,
    poisoned: Option<String>,
}

impl<F> fmt::Debug for TestGroup<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestGroup")
            .field("description", &self.description)
            .field("tests", &self.tests)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl<F: Fixture> TestGroup<F> {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tests: Vec::new(),
            poisoned: None,
        }
    }

    /// Registers an asynchronous test body.
    pub fn test<B>(
        &mut self,
        name: &str,
        params: Option<ParamSpec>,
        body: B,
    ) -> Result<&mut Self, CtsError>
    where
        B: for<'a> Fn(&'a mut F, &'a ParamBinding) -> LocalBoxFuture<'a, Result<(), CtsError>>
            + 'static,
    {
        self.register(name, params, boxed(body))
    }

    /// Registers a body with no suspension points.
    pub fn test_sync<B>(
        &mut self,
        name: &str,
        params: Option<ParamSpec>,
        body: B,
    ) -> Result<&mut Self, CtsError>
    where
        B: Fn(&mut F, &ParamBinding) -> Result<(), CtsError> + 'static,
    {
        let body = Rc::new(body);
        let body = boxed(move |fixture: &mut F, params: &ParamBinding| {
            let body = Rc::clone(&body);
            Box::pin(async move { body(fixture, params) }) as LocalBoxFuture<'_, _>
        });
        self.register(name, params, body)
    }

    fn register(
        &mut self,
        name: &str,
        params: Option<ParamSpec>,
        body: TestFn<F>,
    ) -> Result<&mut Self, CtsError> {
        if let Some(reason) = &self.poisoned {
            return Err(err_msg!(
                Registration,
                "group '{}' stopped accepting tests after an earlier error: {}",
                self.description,
                reason
            ));
        }
        if let Err(error) = self.check(name, params.as_ref()) {
            self.poisoned = Some(error.to_string());
            return Err(error);
        }
        debug!(group = %self.description, test = name, "registered test");
        self.tests.push(TestCase {
            name: name.to_string(),
            params,
            body,
        });
        Ok(self)
    }

    fn check(&self, name: &str, params: Option<&ParamSpec>) -> Result<(), CtsError> {
        validate_name("test name", name)?;
        if self.tests.iter().any(|t| t.name == name) {
            return Err(err_help!(
                Registration,
                "test names must be unique within a group",
                "duplicate test name '{}'",
                name
            ));
        }
        if let Some(spec) = params {
            spec.validate()?;
        }
        Ok(())
    }

    pub fn tests(&self) -> &[TestCase<F>] {
        &self.tests
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }
}

/// One entry of a group listing: a test name and one expansion result.
#[derive(Debug)]
pub struct ListedCase {
    pub test_name: String,
    /// `None` for tests without a parameter spec.
    pub binding: Option<ParamBinding>,
    pub expansion_error: Option<ExpansionFailure>,
}

/// The object-safe face of a [`TestGroup`], independent of its fixture type.
pub trait RunnableGroup {
    fn description(&self) -> &str;

    /// Every case of every test, in registration then expansion order.
    fn list(&self) -> Vec<ListedCase>;

    /// Runs one case on `device`.
    fn run_case<'a>(
        &'a self,
        test_name: &'a str,
        binding: Option<&'a ParamBinding>,
        device: Box<dyn Device>,
    ) -> LocalBoxFuture<'a, CaseResult>;
}

impl<F: Fixture> RunnableGroup for TestGroup<F> {
    fn description(&self) -> &str {
        &self.description
    }

    fn list(&self) -> Vec<ListedCase> {
        let mut cases = Vec::new();
        for test in &self.tests {
            let Some(spec) = &test.params else {
                cases.push(ListedCase {
                    test_name: test.name.clone(),
                    binding: None,
                    expansion_error: None,
                });
                continue;
            };
            for item in expand(spec) {
                cases.push(match item {
                    Ok(binding) => ListedCase {
                        test_name: test.name.clone(),
                        binding: Some(binding),
                        expansion_error: None,
                    },
                    Err(failure) => ListedCase {
                        test_name: test.name.clone(),
                        binding: Some(failure.partial.clone()),
                        expansion_error: Some(failure),
                    },
                });
            }
        }
        cases
    }

    fn run_case<'a>(
        &'a self,
        test_name: &'a str,
        binding: Option<&'a ParamBinding>,
        device: Box<dyn Device>,
    ) -> LocalBoxFuture<'a, CaseResult> {
        Box::pin(async move {
            let Some(test) = self.tests.iter().find(|t| t.name == test_name) else {
                return CaseResult::errored(CaseError::new(
                    CaseErrorKind::Setup,
                    format!("no test named '{test_name}' in '{}'", self.description),
                ));
            };
            let params = binding.cloned().unwrap_or_default();
            execute_case(test, &params, device).await
        })
    }
}

/// One case of a suite's catalogue.
#[derive(Debug)]
pub struct CaseEntry {
    pub identity: CaseIdentity,
    /// Set when the parameter expansion failed for this branch.
    pub expansion_error: Option<ExpansionFailure>,
    group: usize,
}

/// A named collection of groups, each mounted at a path.
pub struct Suite {
    name: String,
    groups: Vec<(Vec<String>, Box<dyn RunnableGroup>)>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Result<Self, CtsError> {
        let name = name.into();
        validate_name("suite name", &name)?;
        Ok(Self {
            name,
            groups: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mounts `group` at `path` (segments separated by `/`).
    pub fn group<F: Fixture>(mut self, path: &str, group: TestGroup<F>) -> Result<Self, CtsError> {
        if let Some(reason) = &group.poisoned {
            return Err(err_msg!(
                Registration,
                "group '{}' failed to register: {}",
                path,
                reason
            ));
        }
        let segments: Vec<String> = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').map(str::to_string).collect()
        };
        for segment in &segments {
            validate_name("path segment", segment)?;
        }
        if self.groups.iter().any(|(existing, _)| *existing == segments) {
            return Err(err_msg!(Registration, "group path '{}' is used twice", path));
        }
        self.groups.push((segments, Box::new(group)));
        Ok(self)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&[String], &dyn RunnableGroup)> {
        self.groups
            .iter()
            .map(|(path, group)| (path.as_slice(), group.as_ref()))
    }

    /// The full catalogue: every case of every group, in registration order.
    pub fn cases(&self) -> Vec<CaseEntry> {
        let mut entries = Vec::new();
        for (index, (path, group)) in self.groups.iter().enumerate() {
            for listed in group.list() {
                entries.push(CaseEntry {
                    identity: CaseIdentity::new(
                        self.name.clone(),
                        path.clone(),
                        listed.test_name,
                        listed.binding,
                    ),
                    expansion_error: listed.expansion_error,
                    group: index,
                });
            }
        }
        entries
    }

    /// Runs one catalogue entry on `device`.
    pub fn run_case<'a>(
        &'a self,
        entry: &'a CaseEntry,
        device: Box<dyn Device>,
    ) -> LocalBoxFuture<'a, CaseResult> {
        match self.groups.get(entry.group) {
            Some((_, group)) => group.run_case(
                &entry.identity.test_name,
                entry.identity.binding.as_ref(),
                device,
            ),
            None => Box::pin(future::ready(CaseResult::errored(CaseError::new(
                CaseErrorKind::Setup,
                format!("case {} does not belong to suite '{}'", entry.identity, self.name),
            )))),
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field(
                "groups",
                &self.groups.iter().map(|(path, _)| path.join("/")).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorType;
    use crate::device::SoftDevice;
    use crate::fixture::{FixtureContext, GpuTest};

    fn pass(_: &mut GpuTest, _: &ParamBinding) -> Result<(), CtsError> {
        Ok(())
    }

    #[test]
    fn duplicate_name_poisons_the_group() {
        let mut group = TestGroup::<GpuTest>::new("g");
        group.test_sync("a", None, pass).unwrap();
        let err = group.test_sync("a", None, pass).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Registration);
        assert!(group.test_sync("b", None, pass).is_err());
        assert_eq!(group.tests().len(), 1);
        assert!(format!("{group:?}").contains("duplicate test name 'a'"));
        assert!(Suite::new("s").unwrap().group("x", group).is_err());
    }

    #[test]
    fn sync_body_runs_only_when_polled() {
        let mut group = TestGroup::<GpuTest>::new("g");
        group
            .test_sync("boom", None, |_, _| panic!("ran while building the future"))
            .unwrap();
        let mut fixture = GpuTest::init(FixtureContext::new(Box::new(SoftDevice::new()))).unwrap();
        let params = ParamBinding::default();
        drop((group.tests()[0].body)(&mut fixture, &params));
    }

    #[test]
    fn reserved_characters_are_rejected() {
        let mut group = TestGroup::<GpuTest>::new("g");
        assert!(group.test_sync("a:b", None, pass).is_err());
        assert!(Suite::new("web:gpu").is_err());
        let group = TestGroup::<GpuTest>::new("g");
        assert!(Suite::new("s").unwrap().group("a//b", group).is_err());
    }

    #[test]
    fn catalogue_follows_registration_order() {
        let mut first = TestGroup::<GpuTest>::new("first");
        first
            .test_sync("plain", None, pass)
            .unwrap()
            .test_sync("sized", Some(ParamSpec::new().options("size", [4, 8])), pass)
            .unwrap();
        let mut second = TestGroup::<GpuTest>::new("second");
        second.test_sync("empty", Some(ParamSpec::new()), pass).unwrap();

        let suite = Suite::new("s")
            .unwrap()
            .group("a/b", first)
            .unwrap()
            .group("c", second)
            .unwrap();
        let ids: Vec<String> = suite.cases().iter().map(|c| c.identity.to_string()).collect();
        assert_eq!(
            ids,
            [
                "s:a/b:plain:",
                r#"s:a/b:sized:{"size":4}"#,
                r#"s:a/b:sized:{"size":8}"#,
                "s:c:empty:{}",
            ]
        );
    }
}
