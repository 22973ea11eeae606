//! Shared setup for end-to-end scenarios.
//!
//! Requires `docker`, `pack` and a packaged buildpack named by
//! `BUILDPROOF_BUILDPACKS`.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use buildproof_common::transcript::LineMatcher;
use buildproof_image::request::PullPolicy;
use buildproof_runtime::container::RunOptions;
use buildproof_runtime::probe::{ProbeAttempt, ProbeFailure, ProbeRequest, TlsIdentity, read_pem};
use buildproof_sdk::harness::{self, Harness};
use buildproof_sdk::scenario::Scenario;

/// Builder image the buildpack is exercised on.
pub const ALTERNATE_BUILDER: &str = "paketobuildpacks/builder-jammy-buildpackless-base";
/// Run image paired with the alternate builder.
pub const ALTERNATE_RUN_IMAGE: &str = "paketobuildpacks/run-jammy-base";

pub fn harness() -> Arc<Harness> {
    static HARNESS: OnceLock<Arc<Harness>> = OnceLock::new();
    Arc::clone(HARNESS.get_or_init(|| {
        harness::init_tracing();
        Arc::new(Harness::from_env().expect("pack and docker must be installed"))
    }))
}

pub fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("testdata").join(name)
}

pub fn scenario(fixture: &str) -> Scenario {
    Scenario::new(harness(), &testdata(fixture)).expect("scenario")
}

pub const NEVER: PullPolicy = PullPolicy::Never;

/// Matches the header line a component prints when it takes part in a build.
pub fn header(name: &str) -> LineMatcher {
    LineMatcher::substring(format!("Buildpack for {name}"))
}

/// Runs an image from `ca_certificate_apps` with the CA binding mounted and
/// checks that only a client signed by that CA is served.
pub fn assert_mutual_tls(scenario: &mut Scenario, image: &str) {
    let certs = scenario.source().join("client_certs");
    let binding = scenario.source().join("binding");

    let options = RunOptions::new()
        .env("PORT", "8080")
        .env("SERVICE_BINDING_ROOT", "/bindings")
        .publish(8080)
        .volume(format!("{}:/bindings/ca-certificates", binding.display()));
    let container = scenario.run(image, &options).expect("run");
    let _ = scenario
        .wait_for_logs(
            &container,
            &LineMatcher::substring("Added 1 additional CA certificate(s) to system truststore"),
        )
        .expect("binding applied");

    let port = container.host_port(8080).expect("port");
    let ca = read_pem(&certs.join("ca.pem")).expect("ca");
    let trusted = ProbeRequest::https(port)
        .trust_root(ca.clone())
        .identity(TlsIdentity::from_files(&certs.join("cert.pem"), &certs.join("key.pem")).expect("client"))
        .body_contains("Hello, World!");
    let _ = scenario.probe(&trusted).expect("trusted client is served");

    let untrusted = ProbeRequest::https(port).trust_root(ca).identity(
        TlsIdentity::from_files(&certs.join("untrusted_cert.pem"), &certs.join("untrusted_key.pem"))
            .expect("untrusted client"),
    );
    match scenario.harness().probe().probe_once(&untrusted).expect("client") {
        ProbeAttempt::Failed(ProbeFailure::Tls(_)) => {}
        other => panic!("untrusted client was not rejected during the handshake: {other:?}"),
    }
}

/// Bind mount of a fixture's `git-credentials` directory as a build-time
/// service binding.
pub fn git_credentials_volume(scenario: &Scenario) -> String {
    format!("{}:/bindings/git-credentials", scenario.source().join("git-credentials").display())
}
