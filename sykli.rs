//! Sykli CI pipeline for kdeploy
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    // Unit tests run against the in-memory cluster, no k8s needed
    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test")
        .inputs(&["src/**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets -- -D warnings")
        .inputs(&["src/**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["src/**/*.rs"]);

    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin kdeploy")
        .inputs(&["src/**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/kdeploy")
        .after(&["test", "lint", "fmt"]);

    // Deploy, upgrade and delete a bundle on a kind cluster
    let _ = p
        .task("kind-smoke")
        .container("ghcr.io/sykli/kind-runner:latest")
        .mount(&src, "/src")
        .workdir("/src")
        .run(
            r#"#!/bin/bash
set -e

kind create cluster --name kdeploy-ci
export KDEPLOY_NAMESPACE=smoke
export KDEPLOY_DEADLINE=5m
kubectl create namespace smoke || true

bundle() {
cat <<EOF
{
  "name": "smoke",
  "version": "$1",
  "services": {
    "web": {"apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"},
            "spec": {"ports": [{"port": 80}], "selector": {"app": "web"}}}
  },
  "workloads": {
    "web": {"apiVersion": "v1", "kind": "ReplicationController", "metadata": {"name": "web"},
            "spec": {"replicas": 2, "template": {"metadata": {"labels": {"app": "web"}},
              "spec": {"containers": [{"name": "nginx", "image": "nginx:$2"}]}}}}
  }
}
EOF
}

bundle 1.0.0 1.25 > /tmp/v1.json
bundle 1.1.0 1.27 > /tmp/v2.json

./target/release/kdeploy deploy /tmp/v1.json
./target/release/kdeploy upgrade /tmp/v2.json
./target/release/kdeploy list

VERSION=$(kubectl get rc web -n smoke -o jsonpath='{.metadata.labels.kubeware-version}')
if [ "$VERSION" != "1.1.0" ]; then
  echo "ERROR: expected web at 1.1.0, got $VERSION"
  exit 1
fi

./target/release/kdeploy delete smoke
if [ -n "$(kubectl get rc,svc -n smoke -l kubeware=smoke -o name)" ]; then
  echo "ERROR: resources left after delete"
  exit 1
fi

kind delete cluster --name kdeploy-ci || true
"#,
        )
        .input_from("build", "binary", "/src/target/release/kdeploy")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(600);

    p.emit();
}
