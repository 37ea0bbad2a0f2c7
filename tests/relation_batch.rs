mod support;

use serde_json::json;

use dataset_edits::{
    decode_batch, AttachmentError, DataError, FeatureRecord, RecordStore, RelationBatchProcessor,
};
use support::{fixture, props, upload, CHILD_TABLE, PARENT_DATASET, PARENT_ID};

fn processor<'a>(fx: &'a support::Fixture) -> RelationBatchProcessor<'a> {
    RelationBatchProcessor::new(&fx.records, &fx.attachments, &fx.registry, &fx.config)
}

#[test]
fn new_record_is_created_with_forced_foreign_key() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "children__name": "a"}]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(result.success);
    let record = &result.tables[0].1.records[0];
    assert_eq!(record["children__name"], json!("a"));
    assert_eq!(record["children__parent_id"], json!(PARENT_ID));
    assert_eq!(record["id"], json!(1));

    let stored = fx.records.show("alice", CHILD_TABLE, 1).unwrap().unwrap();
    assert_eq!(stored.properties["parent_id"], json!(PARENT_ID));
}

#[test]
fn new_record_with_conflicting_foreign_key_is_corrected_not_rejected() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [
                {"__status__": "new", "children__name": "a", "children__parent_id": 99}
            ]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(result.success);
    let stored = fx.records.show("alice", CHILD_TABLE, 1).unwrap().unwrap();
    assert_eq!(stored.properties["parent_id"], json!(PARENT_ID));
}

#[test]
fn changed_record_with_mismatched_foreign_key_is_rejected() {
    let fx = fixture();
    let child_id = fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({"name": "a", "parent_id": PARENT_ID}))),
    );
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [
                {"id": child_id, "__status__": "changed",
                 "children__name": "b", "children__parent_id": 99}
            ]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(!result.success);
    let record = &result.tables[0].1.records[0];
    assert_eq!(record["__error__"], json!("FK validation failed"));
    // the record was never sent to the store
    let stored = fx.records.show("alice", CHILD_TABLE, child_id).unwrap().unwrap();
    assert_eq!(stored.properties["name"], json!("a"));
}

#[test]
fn record_without_status_is_echoed_unchanged() {
    let fx = fixture();
    let child_id = fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({"name": "a", "parent_id": PARENT_ID}))),
    );
    let wire = json!({
        "id": child_id,
        "children__name": "edited but unmarked",
        "children__parent_id": PARENT_ID
    });
    let batch = decode_batch(&json!({
        "children": {"fk": "parent_id", "records": [wire]}
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(result.success);
    assert_eq!(result.tables[0].1.records[0], wire);
    let stored = fx.records.show("alice", CHILD_TABLE, child_id).unwrap().unwrap();
    assert_eq!(stored.properties["name"], json!("a"));
}

#[test]
fn failed_update_rolls_back_new_attachment_and_keeps_old() {
    let fx = fixture();
    fx.records.require_fields(CHILD_TABLE, &["name"]);
    fx.attachments.seed(PARENT_DATASET, "old1/p.jpg", vec![1]);
    fx.attachments.seed(PARENT_DATASET, "new1/p.jpg", vec![2]);
    let child_id = fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({
            "name": "a",
            "parent_id": PARENT_ID,
            "photo": "attachment://old1/p.jpg"
        }))),
    );

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{
                "id": child_id,
                "__status__": "changed",
                "children__name": null,
                "children__parent_id": PARENT_ID,
                "children__photo": "attachment://new1/p.jpg"
            }]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(!result.success);
    let record = &result.tables[0].1.records[0];
    assert!(record["error"].as_str().unwrap().contains("validation"));
    assert!(!fx.attachments.has_slug(PARENT_DATASET, "new1/p.jpg"));
    assert!(fx.attachments.has_slug(PARENT_DATASET, "old1/p.jpg"));
    // stored record still points at the old file
    let stored = fx.records.show("alice", CHILD_TABLE, child_id).unwrap().unwrap();
    assert_eq!(stored.properties["photo"], json!("attachment://old1/p.jpg"));
}

#[test]
fn successful_update_removes_superseded_attachment() {
    let fx = fixture();
    fx.attachments.seed(PARENT_DATASET, "old1/p.jpg", vec![1]);
    fx.attachments.seed(PARENT_DATASET, "new1/p.jpg", vec![2]);
    let child_id = fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({
            "name": "a",
            "parent_id": PARENT_ID,
            "photo": "attachment://old1/p.jpg"
        }))),
    );

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{
                "id": child_id,
                "__status__": "changed",
                "children__name": "a",
                "children__parent_id": PARENT_ID,
                "children__photo": "attachment://new1/p.jpg"
            }]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(result.success);
    assert!(!fx.attachments.has_slug(PARENT_DATASET, "old1/p.jpg"));
    assert!(fx.attachments.has_slug(PARENT_DATASET, "new1/p.jpg"));
    let record = &result.tables[0].1.records[0];
    assert_eq!(record["children__photo"], json!("attachment://new1/p.jpg"));
}

#[test]
fn successful_delete_removes_referenced_attachments() {
    let fx = fixture();
    fx.attachments.seed(PARENT_DATASET, "x1/p.jpg", vec![1]);
    let child_id = fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({
            "name": "a",
            "parent_id": PARENT_ID,
            "photo": "attachment://x1/p.jpg"
        }))),
    );

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{
                "id": child_id,
                "__status__": "deleted",
                "children__name": "a",
                "children__parent_id": PARENT_ID,
                "children__photo": "attachment://x1/p.jpg"
            }]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(result.success);
    assert!(fx.records.show("alice", CHILD_TABLE, child_id).unwrap().is_none());
    assert!(!fx.attachments.has_slug(PARENT_DATASET, "x1/p.jpg"));
    // the processed record is still echoed in the response
    assert_eq!(result.tables[0].1.records.len(), 1);
}

#[test]
fn failed_delete_keeps_committed_attachments() {
    let fx = fixture();
    fx.attachments.seed(PARENT_DATASET, "x1/p.jpg", vec![1]);
    let child_id = fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({
            "name": "a",
            "parent_id": PARENT_ID,
            "photo": "attachment://x1/p.jpg"
        }))),
    );
    fx.records.set_read_only(CHILD_TABLE);

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{
                "id": child_id,
                "__status__": "deleted",
                "children__name": "a",
                "children__parent_id": PARENT_ID,
                "children__photo": "attachment://x1/p.jpg"
            }]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(!result.success);
    // the record survived, so its attachment must too
    assert!(fx.attachments.has_slug(PARENT_DATASET, "x1/p.jpg"));
    assert!(fx.records.show("alice", CHILD_TABLE, child_id).unwrap().is_some());
}

#[test]
fn partial_failure_commits_unrelated_records() {
    let fx = fixture();
    fx.records.require_fields(CHILD_TABLE, &["name"]);

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [
                {"__status__": "new", "children__name": "ok"},
                {"__status__": "new", "children__other": "no name field"},
                {"__status__": "new", "children__name": "also ok"}
            ]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(!result.success);
    let records = &result.tables[0].1.records;
    assert_eq!(records.len(), 3);
    assert!(records[0].get("error").is_none());
    assert!(records[1].get("error").is_some());
    assert!(records[2].get("error").is_none());

    let committed = fx.records.index("alice", CHILD_TABLE, None).unwrap();
    assert_eq!(committed.len(), 2);
}

#[test]
fn missing_id_on_changed_record_is_reported_per_record() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [
                {"__status__": "changed", "children__name": "b",
                 "children__parent_id": PARENT_ID}
            ]
        }
    }))
    .unwrap();

    let result = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap();

    assert!(!result.success);
    let record = &result.tables[0].1.records[0];
    assert!(record["error"].as_str().unwrap().contains("id"));
}

#[test]
fn uneditable_parent_rejects_the_whole_batch() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "children__name": "a"}]
        }
    }))
    .unwrap();

    let err = processor(&fx)
        .process("alice", PARENT_DATASET, 999, batch)
        .unwrap_err();

    assert_eq!(err, DataError::Permission);
    assert!(fx.records.index("alice", CHILD_TABLE, None).unwrap().is_empty());
}

#[test]
fn undeclared_relation_table_is_a_client_error() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "strangers": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "strangers__name": "a"}]
        }
    }))
    .unwrap();

    let err = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap_err();

    assert!(matches!(err, DataError::Validation(_)));
}

#[test]
fn uploads_are_bound_and_audit_fields_stripped_from_response() {
    let mut fx = fixture();
    fx.config = fx.config.with_upload_user_field_suffix("uploaded_by");

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "children__name": "a"}]
        }
    }))
    .unwrap();
    let files = vec![upload("file:children__photo__0", "p.jpg")];

    let result = processor(&fx)
        .process_with_uploads("alice", PARENT_DATASET, PARENT_ID, batch, &files)
        .unwrap();

    assert!(result.success);
    let record = &result.tables[0].1.records[0];
    let reference = record["children__photo"].as_str().unwrap();
    let slug = reference.strip_prefix("attachment://").unwrap();
    assert!(fx.attachments.has_slug(PARENT_DATASET, slug));
    // the audit field is persisted but not echoed
    assert!(record.get("children__photo__uploaded_by").is_none());
    let stored = fx.records.show("alice", CHILD_TABLE, 1).unwrap().unwrap();
    assert_eq!(stored.properties["photo__uploaded_by"], json!("alice"));
}

#[test]
fn failed_upload_save_rolls_back_earlier_saves_and_aborts() {
    let fx = fixture();
    fx.attachments.fail_file("b.jpg");

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [
                {"__status__": "new", "children__photo": null, "children__name": "a"},
                {"__status__": "new", "children__photo": null, "children__name": "b"}
            ]
        }
    }))
    .unwrap();
    let files = vec![
        upload("file:children__photo__0", "a.jpg"),
        upload("file:children__photo__1", "b.jpg"),
    ];

    let err = processor(&fx)
        .process_with_uploads("alice", PARENT_DATASET, PARENT_ID, batch, &files)
        .unwrap_err();

    assert_eq!(
        err,
        DataError::Attachment(AttachmentError::SaveFailed {
            field_key: "file:children__photo__1".into()
        })
    );
    assert!(fx.attachments.slugs(PARENT_DATASET).is_empty());
    assert!(fx.records.index("alice", CHILD_TABLE, None).unwrap().is_empty());
}

#[test]
fn upload_addressing_no_batch_record_aborts_before_any_save() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "children__name": "a"}]
        }
    }))
    .unwrap();
    let files = vec![upload("file:children__photo__5", "p.jpg")];

    let err = processor(&fx)
        .process_with_uploads("alice", PARENT_DATASET, PARENT_ID, batch, &files)
        .unwrap_err();

    assert!(matches!(err, DataError::Validation(_)));
    assert!(fx.attachments.slugs(PARENT_DATASET).is_empty());
}

#[test]
fn failed_create_rolls_back_its_uploaded_file() {
    let fx = fixture();
    fx.records.require_fields(CHILD_TABLE, &["name"]);

    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "children__other": "no name"}]
        }
    }))
    .unwrap();
    let files = vec![upload("file:children__photo__0", "p.jpg")];

    let result = processor(&fx)
        .process_with_uploads("alice", PARENT_DATASET, PARENT_ID, batch, &files)
        .unwrap();

    assert!(!result.success);
    assert!(fx.attachments.slugs(PARENT_DATASET).is_empty());
}

#[test]
fn relation_values_lists_children_of_the_parent_sorted_by_id() {
    let fx = fixture();
    fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({"name": "mine-2", "parent_id": PARENT_ID}))),
    );
    fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({"name": "other", "parent_id": 99}))),
    );
    fx.records.seed(
        CHILD_TABLE,
        FeatureRecord::new(props(json!({"name": "mine-1", "parent_id": PARENT_ID}))),
    );

    let values = processor(&fx)
        .relation_values(
            "alice",
            PARENT_DATASET,
            PARENT_ID,
            &[(CHILD_TABLE.to_string(), "parent_id".to_string())],
        )
        .unwrap();

    let (table, result) = &values.tables[0];
    assert_eq!(table, CHILD_TABLE);
    assert_eq!(result.fk, "parent_id");
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0]["id"], json!(1));
    assert_eq!(result.records[0]["children__name"], json!("mine-2"));
    assert_eq!(result.records[1]["id"], json!(3));
}

#[test]
fn batch_result_serializes_to_the_wire_shape() {
    let fx = fixture();
    let batch = decode_batch(&json!({
        "children": {
            "fk": "parent_id",
            "records": [{"__status__": "new", "children__name": "a"}]
        }
    }))
    .unwrap();

    let wire = processor(&fx)
        .process("alice", PARENT_DATASET, PARENT_ID, batch)
        .unwrap()
        .to_wire();

    assert_eq!(wire["success"], json!(true));
    assert_eq!(wire["relationvalues"]["children"]["fk"], json!("parent_id"));
    assert_eq!(
        wire["relationvalues"]["children"]["records"][0]["children__name"],
        json!("a")
    );
}
