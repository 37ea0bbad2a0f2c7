use serde_json::{Map, Value};

use dataset_edits::{
    EditConfig, FeatureRecord, InMemoryAttachmentStore, InMemoryRecordStore, RelationRegistry,
    UploadedFile,
};

pub const PARENT_DATASET: &str = "edit_points";
pub const CHILD_TABLE: &str = "children";
pub const PARENT_ID: i64 = 7;

/// Stores, registry and config shared by the integration scenarios.
pub struct Fixture {
    pub records: InMemoryRecordStore,
    pub attachments: InMemoryAttachmentStore,
    pub registry: RelationRegistry,
    pub config: EditConfig,
}

/// A parent record with id 7 in `edit_points`, and an empty `children`
/// relation table with foreign key `parent_id`.
pub fn fixture() -> Fixture {
    let records = InMemoryRecordStore::new();
    records.add_table(PARENT_DATASET);
    records.add_table(CHILD_TABLE);
    records.seed(
        PARENT_DATASET,
        FeatureRecord::with_id(PARENT_ID, props(serde_json::json!({"name": "parent"}))),
    );

    let mut registry = RelationRegistry::new();
    registry.register(PARENT_DATASET, CHILD_TABLE);

    Fixture {
        records,
        attachments: InMemoryAttachmentStore::new(),
        registry,
        config: EditConfig::new(),
    }
}

pub fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn upload(field_key: &str, file_name: &str) -> UploadedFile {
    UploadedFile::new(field_key, file_name, vec![0xAB, 0xCD])
}
