use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use va_registry::identity::parse_identity_fields;
use va_registry::tree::LocationKind;
use va_registry::{LocationId, RegistryConfig, VaRecord, VaRegistry};

/// The identity-field configuration used across the integration tests.
#[allow(dead_code)]
pub const IDENTITY_FIELDS: &str =
    "Id10017, Id10018, Id10019, Id10020, Id10021, Id10022, Id10023";

#[allow(dead_code)]
pub fn detection_config() -> RegistryConfig {
    RegistryConfig {
        identity_fields: parse_identity_fields(IDENTITY_FIELDS),
        ..RegistryConfig::default()
    }
}

#[allow(dead_code)]
pub fn record(fields: &[(&str, &str)]) -> VaRecord {
    let mut record = VaRecord::new();
    for (name, value) in fields {
        record.set_field(name, value);
    }
    record
}

#[allow(dead_code)]
pub fn record_created_at(created: i64, fields: &[(&str, &str)]) -> VaRecord {
    let mut record = record(fields);
    record.created = created;
    record
}

#[allow(dead_code)]
pub fn bob_jones() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Id10017", "Bob"),
        ("Id10018", "Jones"),
        ("Id10019", "Male"),
        ("Id10020", "Yes"),
        ("Id10021", "1/1/60"),
        ("Id10022", "Yes"),
        ("Id10023", "1/5/21"),
    ]
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub struct SampleTree {
    pub province: LocationId,
    pub district_x: LocationId,
    pub district_y: LocationId,
    pub facility1: LocationId,
    pub facility2: LocationId,
    pub facility3: LocationId,
}

/// Province1 -> DistrictX -> Facility1; Province1 -> DistrictY ->
/// {Facility2, Facility3}.
#[allow(dead_code)]
pub fn load_sample_tree(registry: &VaRegistry) -> SampleTree {
    registry.edit_tree(|tree| {
        let province = tree.add_root("Province1", LocationKind::Province).unwrap();
        let district_x = tree
            .add_child(province, "DistrictX", LocationKind::District)
            .unwrap();
        let district_y = tree
            .add_child(province, "DistrictY", LocationKind::District)
            .unwrap();
        let facility1 = tree
            .add_child(district_x, "Facility1", LocationKind::Facility)
            .unwrap();
        let facility2 = tree
            .add_child(district_y, "Facility2", LocationKind::Facility)
            .unwrap();
        let facility3 = tree
            .add_child(district_y, "Facility3", LocationKind::Facility)
            .unwrap();
        SampleTree {
            province,
            district_x,
            district_y,
            facility1,
            facility2,
            facility3,
        }
    })
}

/// Generate records with controlled identity collisions: with probability
/// `duplicate_probability` a record reuses the shared identity values,
/// otherwise it gets unique ones.
#[allow(dead_code)]
pub fn generate_records(count: u32, duplicate_probability: f64, seed: u64) -> Vec<VaRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut rec = if rng.random_bool(duplicate_probability) {
            record(&bob_jones())
        } else {
            let name = format!("Person{:06}", i);
            record(&[
                ("Id10017", name.as_str()),
                ("Id10018", "Smith"),
                ("Id10019", "Female"),
                ("Id10020", "Yes"),
                ("Id10021", "2/2/70"),
                ("Id10022", "Yes"),
                ("Id10023", "3/6/20"),
            ])
        };
        rec.created = 1_000 + i as i64;
        rec.instance_id = format!("uuid:{:06}", i);
        records.push(rec);
    }
    records
}
