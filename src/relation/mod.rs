//! Relation batch transactions.
//!
//! A relation batch applies create/update/delete operations across one or
//! more child tables of a parent record in a single request. The flattened
//! `<table>__<field>` encoding is decoded at the boundary (`wire`), the
//! statuses become a closed variant at ingestion time (`batch`), and the
//! processor drives the record store and the attachment coordinator
//! (`processor`).

mod batch;
mod processor;
mod wire;

pub use batch::{EditStatus, RelationBatch, RelationRecordEdit, RelationTable};
pub use processor::{
    BatchResult, RelationBatchProcessor, RelationRegistry, RelationValues, TableResult,
};
pub use wire::{decode_batch, parse_upload_key, UploadTarget};
