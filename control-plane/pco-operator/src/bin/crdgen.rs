use kube::core::CustomResourceExt;
use pco_operator::crd::PolicyControl;

fn main() -> anyhow::Result<()> {
    let yaml = serde_yaml::to_string(&PolicyControl::crd())?;
    println!("{yaml}");
    Ok(())
}
