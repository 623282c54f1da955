#[path = "../src/test_support.rs"]
mod test_support;

use test_support::{bob_jones, detection_config, record_created_at};
use va_registry::{VaRegistry, RegistryError};

#[test]
fn creates_mark_newer_records_duplicate() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let va1 = registry.create_record(record_created_at(100, &bob_jones()))?;
    let va2 = registry.create_record(record_created_at(200, &bob_jones()))?;
    let va3 = registry.create_record(record_created_at(300, &bob_jones()))?;

    assert!(!registry.get_record(va1).unwrap().duplicate);
    assert!(registry.get_record(va2).unwrap().duplicate);
    assert!(registry.get_record(va3).unwrap().duplicate);

    let hash = registry.get_record(va1).unwrap().unique_identifier_hash;
    assert_eq!(hash, "840ba941ac6e608962f86eb05659bad1");
    assert_eq!(
        registry.get_record(va2).unwrap().unique_identifier_hash,
        hash
    );
    Ok(())
}

#[test]
fn distinct_identities_form_distinct_groups() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let bob = registry.create_record(record_created_at(100, &bob_jones()))?;
    let nate = registry.create_record(record_created_at(200, &[
        ("Id10017", "Nate"),
        ("Id10018", "Grey"),
        ("Id10019", "Male"),
        ("Id10020", "Yes"),
        ("Id10021", "dk"),
        ("Id10022", "Yes"),
        ("Id10023", "dk"),
    ]))?;

    assert!(!registry.get_record(bob).unwrap().duplicate);
    assert!(!registry.get_record(nate).unwrap().duplicate);
    assert_eq!(registry.metrics().identity_groups, 2);
    Ok(())
}

#[test]
fn editing_canonical_out_of_group_promotes_next_oldest() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let va1 = registry.create_record(record_created_at(100, &bob_jones()))?;
    let va2 = registry.create_record(record_created_at(200, &bob_jones()))?;
    let va3 = registry.create_record(record_created_at(300, &bob_jones()))?;

    let mut edited = registry.get_record(va1).unwrap();
    edited.set_field("Id10017", "Robert");
    let plan = registry.update_record(edited)?;
    assert_eq!(plan.promote, Some(va2));
    assert_eq!(plan.demote, None);

    // VA1 is sole member of its new group; VA2 is the oldest remaining
    // member of the old group; VA3 stays second-oldest.
    let va1 = registry.get_record(va1).unwrap();
    assert!(!va1.duplicate);
    assert_eq!(va1.unique_identifier_hash, "690b7d0bd136e0e4f7e732b86cbeb12e");
    assert!(!registry.get_record(va2).unwrap().duplicate);
    assert!(registry.get_record(va3).unwrap().duplicate);
    Ok(())
}

#[test]
fn editing_duplicate_into_sole_group_makes_it_canonical() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let va1 = registry.create_record(record_created_at(100, &bob_jones()))?;
    let va2 = registry.create_record(record_created_at(200, &bob_jones()))?;
    assert!(registry.get_record(va2).unwrap().duplicate);

    let mut edited = registry.get_record(va2).unwrap();
    edited.set_field("Id10017", "Barb");
    edited.set_field("Id10019", "Female");
    registry.update_record(edited)?;

    assert!(!registry.get_record(va1).unwrap().duplicate);
    assert!(!registry.get_record(va2).unwrap().duplicate);
    Ok(())
}

#[test]
fn older_record_joining_group_demotes_incumbent() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    // The younger record owns the Bob Jones group; the older one sits in
    // its own group until the edit backdates it into Bob's.
    let young = registry.create_record(record_created_at(500, &bob_jones()))?;
    let old = registry.create_record(record_created_at(100, &[
        ("Id10017", "Nate"),
        ("Id10018", "Grey"),
        ("Id10019", "Male"),
        ("Id10020", "Yes"),
        ("Id10021", "dk"),
        ("Id10022", "Yes"),
        ("Id10023", "dk"),
    ]))?;

    let mut edited = registry.get_record(old).unwrap();
    for (name, value) in bob_jones() {
        edited.set_field(name, value);
    }
    let plan = registry.update_record(edited)?;
    assert_eq!(plan.demote, Some(young));

    assert!(!registry.get_record(old).unwrap().duplicate);
    assert!(registry.get_record(young).unwrap().duplicate);
    Ok(())
}

#[test]
fn update_without_identity_change_leaves_group_state() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let va1 = registry.create_record(record_created_at(100, &bob_jones()))?;
    let va2 = registry.create_record(record_created_at(200, &bob_jones()))?;

    let mut edited = registry.get_record(va2).unwrap();
    edited.set_field("comment", "reviewed by supervisor");
    let plan = registry.update_record(edited)?;
    assert!(!plan.identity_changed);

    let va2 = registry.get_record(va2).unwrap();
    assert!(va2.duplicate);
    assert_eq!(va2.field("comment"), Some("reviewed by supervisor"));
    assert!(!registry.get_record(va1).unwrap().duplicate);
    Ok(())
}

#[test]
fn upsert_routes_by_instance_id() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let mut submission = record_created_at(100, &bob_jones());
    submission.instance_id = "uuid:abc".to_string();

    let (id, created) = registry.upsert_by_instance_id(submission.clone())?;
    assert!(created);

    submission.set_field("Id10017", "Robert");
    let (again, created) = registry.upsert_by_instance_id(submission)?;
    assert!(!created);
    assert_eq!(id, again);

    let stored = registry.get_record(id).unwrap();
    assert_eq!(stored.field("Id10017"), Some("Robert"));
    assert_eq!(
        stored.unique_identifier_hash,
        "690b7d0bd136e0e4f7e732b86cbeb12e"
    );
    assert_eq!(registry.record_count(), 1);
    Ok(())
}

#[test]
fn disabled_configuration_never_marks_duplicates() -> anyhow::Result<()> {
    let registry = VaRegistry::new(va_registry::RegistryConfig::default())?;
    let mut ids = Vec::new();
    for created in [100, 200, 300] {
        ids.push(registry.create_record(record_created_at(created, &bob_jones()))?);
    }
    for id in ids {
        let record = registry.get_record(id).unwrap();
        assert!(!record.duplicate);
        assert_eq!(record.unique_identifier_hash, "");
    }
    assert_eq!(registry.metrics().identity_groups, 0);

    let err = registry.mark_all_duplicates().unwrap_err();
    assert!(matches!(err, RegistryError::Configuration(_)));
    Ok(())
}

#[test]
fn invalid_identity_fields_are_dropped_at_construction() -> anyhow::Result<()> {
    let config = va_registry::RegistryConfig {
        identity_fields: vec!["Id10017".to_string(), "Id99999".to_string()],
        ..Default::default()
    };
    let registry = VaRegistry::new(config)?;
    assert_eq!(registry.identity_fields(), ["Id10017"]);

    let all_invalid = va_registry::RegistryConfig {
        identity_fields: vec!["nope".to_string()],
        ..Default::default()
    };
    assert!(matches!(
        VaRegistry::new(all_invalid),
        Err(RegistryError::Configuration(_))
    ));
    Ok(())
}

#[test]
fn soft_deleted_records_leave_their_group() -> anyhow::Result<()> {
    let registry = VaRegistry::new(detection_config())?;
    let va1 = registry.create_record(record_created_at(100, &bob_jones()))?;
    let va2 = registry.create_record(record_created_at(200, &bob_jones()))?;

    registry.soft_delete_record(va1)?;

    // The group now has a sole surviving member; a fresh create still sees
    // it and lands as duplicate.
    let va3 = registry.create_record(record_created_at(300, &bob_jones()))?;
    assert!(registry.get_record(va3).unwrap().duplicate);
    let _ = va2;

    let visible = registry.scoped_records(&va_registry::UserAccess::national(), None, None);
    assert_eq!(visible.len(), 2);
    Ok(())
}
