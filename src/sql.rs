//! SQLite column support for [`Envelope`].
//!
//! Envelopes are written as BLOBs. NULL and zero-length values read back as
//! the absent envelope; BLOB and TEXT values must pass the structural
//! check; numeric columns are rejected.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::envelope::Envelope;
use crate::error::Error;

impl FromSql for Envelope {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Envelope::empty()),
            ValueRef::Blob(bytes) | ValueRef::Text(bytes) => {
                Envelope::from_bytes(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
            other => Err(FromSqlError::Other(Box::new(Error::UnsupportedInputType(
                other.data_type().to_string(),
            )))),
        }
    }
}

impl ToSql for Envelope {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(self.as_bytes())))
    }
}
