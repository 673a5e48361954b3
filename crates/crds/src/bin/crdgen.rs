//! Prints the CustomResourceDefinitions as a multi-document YAML stream.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > config/crd/bases/crds.yaml
//! ```

use crds::{AWSCluster, Cluster};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let documents = [
        serde_yaml::to_string(&AWSCluster::crd())?,
        serde_yaml::to_string(&Cluster::crd())?,
    ];
    print!("---\n{}", documents.join("---\n"));
    Ok(())
}
