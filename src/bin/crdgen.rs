//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for all custom resources
//! read by controller-pause.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use controller_pause::crd::generate_crds;

fn main() {
    for crd in generate_crds() {
        println!("---");
        print!("{}", crd);
    }
}
