use exam_core::model::AssessmentId;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn assessment_id_from_i64(v: i64) -> Result<AssessmentId, StorageError> {
    u64::try_from(v)
        .map(AssessmentId::new)
        .map_err(|_| StorageError::Serialization(format!("invalid assessment id: {v}")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}
