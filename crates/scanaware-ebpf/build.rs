//! Compiles the `scanaware-tc` classifier for the BPF target when the
//! `ebpf` feature is enabled. The object lands in `OUT_DIR` and is
//! embedded by `programs::object`.

#[cfg(feature = "ebpf")]
fn main() -> anyhow::Result<()> {
    use anyhow::{Context as _, anyhow};
    use aya_build::cargo_metadata;

    // The kernel crate is excluded from the host workspace, so its metadata
    // is queried through its own manifest.
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("scanaware-tc")
        .join("Cargo.toml");
    let cargo_metadata::Metadata { packages, .. } = cargo_metadata::MetadataCommand::new()
        .manifest_path(manifest)
        .no_deps()
        .exec()
        .context("MetadataCommand::exec")?;
    let ebpf_package = packages
        .into_iter()
        .find(|cargo_metadata::Package { name, .. }| name == "scanaware-tc")
        .ok_or_else(|| anyhow!("scanaware-tc package not found"))?;
    aya_build::build_ebpf([ebpf_package])
}

#[cfg(not(feature = "ebpf"))]
fn main() -> anyhow::Result<()> {
    Ok(())
}
