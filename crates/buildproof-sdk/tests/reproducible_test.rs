//! Rebuilding from a wiped cache must reproduce the image identity.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use common::{NEVER, scenario};

fn assert_reproducible(fixture: &str) {
    let mut scenario = scenario(fixture);
    let request = scenario.request().pull_policy(NEVER);
    let report = scenario.reproducible(&request).expect("identical images");
    assert_eq!(report.first, report.second.id);
    assert!(report.second.created.is_some());
    scenario.teardown().expect("teardown");
}

#[test]
#[ignore = "requires docker, pack and a packaged buildpack"]
fn app_without_package_manager_is_reproducible() {
    assert_reproducible("build");
}

#[test]
#[ignore = "requires docker, pack and a packaged buildpack"]
fn go_module_app_is_reproducible() {
    assert_reproducible("go_mod");
}

#[test]
#[ignore = "requires docker, pack and a packaged buildpack"]
fn vendored_dep_app_is_reproducible() {
    assert_reproducible("dep");
}
