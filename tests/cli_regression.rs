// Regression tests for the `cts` binary.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn cts() -> Command {
    Command::cargo_bin("cts").unwrap()
}

#[test]
fn list_prints_raw_identities() {
    cts().arg("list").assert().success().stdout(
        contains("webgpu:command_buffer/compute/basic:memcpy:\n")
            .and(contains(r#"webgpu:command_buffer/compute/basic:fill:{"words":1,"dispatch_x":0}"#))
            .and(contains("webgpu:api/validation/copy_buffer_to_buffer:copy_usage:")),
    );
}

#[test]
fn list_json_includes_queries() {
    cts()
        .args(["list", "--json", "webgpu:command_buffer/compute/basic:memcpy"])
        .assert()
        .success()
        .stdout(
            contains(r#""query": "?q=webgpu:command_buffer/compute/basic:memcpy:""#)
                .and(contains(r#""test_name": "memcpy""#)),
        );
}

#[test]
fn run_reports_each_case_and_a_summary() {
    cts()
        .args(["--no-color", "run", "webgpu:command_buffer/compute/basic:memcpy"])
        .assert()
        .success()
        .stdout(
            contains("PASS webgpu:command_buffer/compute/basic:memcpy:")
                .and(contains("1 passed, 0 failed, 0 errored (1 total)")),
        );
}

#[test]
fn run_accepts_query_strings() {
    cts()
        .args([
            "--no-color",
            "run",
            "?q=webgpu:command_buffer/compute/basic:fill:{\"words\":4,\"dispatch_x\":1}",
        ])
        .assert()
        .success()
        .stdout(contains("(1 total)"));
}

#[test]
fn malformed_query_is_a_usage_error() {
    cts()
        .args(["run", "webgpu:api:copy:{not json"])
        .assert()
        .code(2)
        .stderr(contains("cts::query").or(contains("help:")));
}

#[test]
fn query_matching_nothing_is_a_usage_error() {
    cts()
        .args(["run", "webgpu:no/such/group"])
        .assert()
        .code(2)
        .stderr(contains("no cases match"));
}
