use std::fs;
use std::path::Path;

use anyhow::Result;
use provisor_fsops::{
    ArtifactStager, EnvSecretSource, InventoryWriter, SecretError, SecretSource, SecretStage,
    StageError, TargetRoot, UnstageOutcome,
};
use provisor_test_support::assert::assert_trees_identical;
use provisor_test_support::fixtures::ScratchTarget;

#[test]
fn destination_exists_leaves_target_untouched() -> Result<()> {
    let scratch = ScratchTarget::new()?;
    let source = scratch.playbooks()?;
    let destination = scratch.in_target("/var/lib/ansible/playbooks");
    fs::create_dir_all(&destination)?;
    fs::write(destination.join("existing.yml"), "keep me")?;

    let err = ArtifactStager::new()
        .stage(&source, &destination)
        .unwrap_err();

    assert!(matches!(err, StageError::DestinationExists { .. }));
    let entries: Vec<_> = fs::read_dir(&destination)?.collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        fs::read_to_string(destination.join("existing.yml"))?,
        "keep me"
    );
    Ok(())
}

#[test]
fn kept_playbooks_match_source_byte_for_byte() -> Result<()> {
    let scratch = ScratchTarget::new()?;
    let source = scratch.playbooks()?;
    let root = TargetRoot::new(scratch.mount());
    let destination = root.host_path(Path::new("/var/lib/ansible/playbooks"))?;
    let stager = ArtifactStager::new();

    stager.stage(&source, &destination)?;
    assert_eq!(stager.unstage(&destination, true)?, UnstageOutcome::Kept);

    assert_trees_identical(&source, &destination)
}

#[test]
fn unstage_twice_is_idempotent() -> Result<()> {
    let scratch = ScratchTarget::new()?;
    let source = scratch.playbooks()?;
    let destination = scratch.in_target("/opt/playbooks");
    let stager = ArtifactStager::new();

    stager.stage(&source, &destination)?;
    assert_eq!(stager.unstage(&destination, false)?, UnstageOutcome::Removed);
    assert_eq!(
        stager.unstage(&destination, false)?,
        UnstageOutcome::AlreadyAbsent
    );
    assert!(!destination.exists());
    assert!(source.join("site.yml").exists());
    Ok(())
}

#[test]
fn inventory_survives_alongside_staged_tree() -> Result<()> {
    let scratch = ScratchTarget::new()?;
    let record = InventoryWriter::new().write(
        scratch.mount(),
        Path::new("/etc/ansible"),
        "hosts",
        "127.0.0.1",
    )?;
    assert_eq!(record.host_path, scratch.in_target("/etc/ansible/hosts"));
    assert_eq!(fs::read_to_string(record.host_path)?, "127.0.0.1");
    Ok(())
}

#[test]
fn env_secret_source_feeds_secret_stage() -> Result<()> {
    let scratch = ScratchTarget::new()?;
    let stage = SecretStage::new();

    let absent = EnvSecretSource::new("PROVISOR_TEST_UNSET_VAULT_VARIABLE");
    let err = stage
        .write_from_source(scratch.mount(), &absent)
        .unwrap_err();
    assert!(matches!(err, SecretError::SourceMissing { .. }));
    assert!(!scratch.in_target("/tmp/vault_password").exists());

    let present = EnvSecretSource::new("PATH");
    assert_eq!(present.describe(), "env:PATH");
    let expected = std::env::var("PATH")?;
    let staged = stage.write_from_source(scratch.mount(), &present)?;
    assert_eq!(fs::read_to_string(staged.host_path())?, expected);
    stage.erase(staged)?;
    assert!(!scratch.in_target("/tmp/vault_password").exists());
    Ok(())
}
