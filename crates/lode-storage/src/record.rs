//! Record layer: columns, schemas, fields, and serialized rows.
//!
//! Serialized row format (all integers little-endian):
//! ```text
//! +----------------+----------------+------------------------+
//! | field count u32| null bitset u32| per field: tag + bytes |
//! +----------------+----------------+------------------------+
//! ```
//! Each field starts with its one-byte type tag. Null fields carry the tag
//! only; their bit is set in the bitset. The 32-bit bitset caps rows at 32
//! fields.

use bytes::{BufMut, Bytes, BytesMut};
use lode_common::page::RowId;
use lode_common::types::TypeId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Maximum number of fields per row, bounded by the null bitset width.
pub const MAX_FIELD_COUNT: usize = 32;

/// Definition of one column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Value type.
    pub type_id: TypeId,
    /// Declared length for CHAR columns, 0 otherwise.
    pub length: u32,
    /// Whether the column accepts nulls.
    pub nullable: bool,
}

impl Column {
    /// Creates a column definition.
    pub fn new(name: impl Into<String>, type_id: TypeId, length: u32, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_id,
            length,
            nullable,
        }
    }
}

/// Ordered set of columns describing a row layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from a column list.
    pub fn new(columns: Vec<Column>) -> Arc<Self> {
        Arc::new(Self { columns })
    }

    /// Returns the columns.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the position of the named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Checks a row against this schema: matching arity, matching types,
    /// and nulls only in nullable columns.
    pub fn validate_row(&self, row: &Row) -> bool {
        if row.field_count() != self.columns.len() {
            return false;
        }
        row.fields().iter().zip(&self.columns).all(|(field, column)| {
            if field.is_null() {
                column.nullable && field.type_id() == column.type_id
            } else {
                field.type_id() == column.type_id
            }
        })
    }
}

/// One typed value of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i32),
    Float(f32),
    Char(String),
    Varchar(String),
    /// Null value carrying the column type.
    Null(TypeId),
}

impl Field {
    /// Returns the type of this field.
    pub fn type_id(&self) -> TypeId {
        match self {
            Field::Int(_) => TypeId::Int,
            Field::Float(_) => TypeId::Float,
            Field::Char(_) => TypeId::Char,
            Field::Varchar(_) => TypeId::Varchar,
            Field::Null(type_id) => *type_id,
        }
    }

    /// Returns true for null fields.
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null(_))
    }

    /// Serialized size of this field including its type tag.
    pub fn serialized_size(&self) -> usize {
        match self {
            Field::Int(_) | Field::Float(_) => 1 + 4,
            Field::Char(s) | Field::Varchar(s) => 1 + 4 + s.len(),
            Field::Null(_) => 1,
        }
    }

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_id() as u8);
        match self {
            Field::Int(v) => buf.put_i32_le(*v),
            Field::Float(v) => buf.put_f32_le(*v),
            Field::Char(s) | Field::Varchar(s) => {
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Field::Null(_) => {}
        }
    }

    fn read_from(buf: &[u8], pos: &mut usize, is_null: bool) -> Option<Field> {
        let tag = *buf.get(*pos)?;
        *pos += 1;
        let type_id = TypeId::from_u8(tag)?;
        if is_null {
            return Some(Field::Null(type_id));
        }
        match type_id {
            TypeId::Int => {
                let bytes = buf.get(*pos..*pos + 4)?;
                *pos += 4;
                Some(Field::Int(i32::from_le_bytes(bytes.try_into().ok()?)))
            }
            TypeId::Float => {
                let bytes = buf.get(*pos..*pos + 4)?;
                *pos += 4;
                Some(Field::Float(f32::from_le_bytes(bytes.try_into().ok()?)))
            }
            TypeId::Char | TypeId::Varchar => {
                let len_bytes = buf.get(*pos..*pos + 4)?;
                *pos += 4;
                let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
                let string_bytes = buf.get(*pos..*pos + len)?;
                *pos += len;
                let s = std::str::from_utf8(string_bytes).ok()?.to_string();
                Some(match type_id {
                    TypeId::Char => Field::Char(s),
                    _ => Field::Varchar(s),
                })
            }
        }
    }

    /// Orders two fields of the same type; nulls sort before every value.
    pub fn compare(&self, other: &Field) -> Ordering {
        match (self, other) {
            (Field::Null(_), Field::Null(_)) => Ordering::Equal,
            (Field::Null(_), _) => Ordering::Less,
            (_, Field::Null(_)) => Ordering::Greater,
            (Field::Int(a), Field::Int(b)) => a.cmp(b),
            (Field::Float(a), Field::Float(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Field::Char(a), Field::Char(b)) => a.cmp(b),
            (Field::Varchar(a), Field::Varchar(b)) => a.cmp(b),
            // Mismatched types order by tag; callers compare like with like.
            (a, b) => (a.type_id() as u8).cmp(&(b.type_id() as u8)),
        }
    }
}

/// A row of field values, carrying its row id once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    rid: RowId,
    fields: Vec<Field>,
}

impl Row {
    /// Creates a row that has not been stored yet.
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            rid: RowId::INVALID,
            fields,
        }
    }

    /// Returns the row id.
    pub fn rid(&self) -> RowId {
        self.rid
    }

    /// Sets the row id.
    pub fn set_rid(&mut self, rid: RowId) {
        self.rid = rid;
    }

    /// Returns the fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Serialized size of this row.
    pub fn serialized_size(&self) -> usize {
        8 + self.fields.iter().map(Field::serialized_size).sum::<usize>()
    }

    /// Serializes the row.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.serialized_size());
        buf.put_u32_le(self.fields.len() as u32);
        let mut nulls: u32 = 0;
        for (i, field) in self.fields.iter().enumerate().take(MAX_FIELD_COUNT) {
            if field.is_null() {
                nulls |= 1 << i;
            }
        }
        buf.put_u32_le(nulls);
        for field in &self.fields {
            field.write_to(&mut buf);
        }
        buf.freeze()
    }

    /// Deserializes a row. Returns None on malformed input.
    pub fn from_bytes(buf: &[u8]) -> Option<Row> {
        if buf.len() < 8 {
            return None;
        }
        let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if count > MAX_FIELD_COUNT {
            return None;
        }
        let nulls = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let mut pos = 8;
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let is_null = nulls & (1 << i) != 0;
            fields.push(Field::read_from(buf, &mut pos, is_null)?);
        }
        Some(Row::new(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_common::page::PageId;

    fn test_schema() -> Arc<Schema> {
        Schema::new(vec![
            Column::new("id", TypeId::Int, 0, false),
            Column::new("name", TypeId::Char, 4, true),
        ])
    }

    #[test]
    fn test_schema_lookup() {
        let schema = test_schema();
        assert_eq!(schema.column_count(), 2);
        assert_eq!(schema.column_index("id"), Some(0));
        assert_eq!(schema.column_index("name"), Some(1));
        assert_eq!(schema.column_index("missing"), None);
    }

    #[test]
    fn test_validate_row() {
        let schema = test_schema();
        assert!(schema.validate_row(&Row::new(vec![
            Field::Int(1),
            Field::Char("ab".to_string()),
        ])));
        assert!(schema.validate_row(&Row::new(vec![
            Field::Int(1),
            Field::Null(TypeId::Char),
        ])));
        // Null in a non-nullable column.
        assert!(!schema.validate_row(&Row::new(vec![
            Field::Null(TypeId::Int),
            Field::Char("ab".to_string()),
        ])));
        // Wrong arity.
        assert!(!schema.validate_row(&Row::new(vec![Field::Int(1)])));
        // Wrong type.
        assert!(!schema.validate_row(&Row::new(vec![
            Field::Float(1.0),
            Field::Char("ab".to_string()),
        ])));
    }

    #[test]
    fn test_field_sizes() {
        assert_eq!(Field::Int(7).serialized_size(), 5);
        assert_eq!(Field::Float(1.5).serialized_size(), 5);
        assert_eq!(Field::Char("abcd".to_string()).serialized_size(), 9);
        assert_eq!(Field::Null(TypeId::Int).serialized_size(), 1);
    }

    #[test]
    fn test_field_compare() {
        assert_eq!(Field::Int(1).compare(&Field::Int(2)), Ordering::Less);
        assert_eq!(Field::Int(2).compare(&Field::Int(2)), Ordering::Equal);
        assert_eq!(
            Field::Char("b".to_string()).compare(&Field::Char("a".to_string())),
            Ordering::Greater
        );
        assert_eq!(
            Field::Null(TypeId::Int).compare(&Field::Int(-100)),
            Ordering::Less
        );
        assert_eq!(
            Field::Null(TypeId::Int).compare(&Field::Null(TypeId::Char)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_row_roundtrip() {
        let row = Row::new(vec![
            Field::Int(42),
            Field::Float(2.5),
            Field::Char("ab".to_string()),
            Field::Varchar("hello world".to_string()),
        ]);
        let bytes = row.to_bytes();
        assert_eq!(bytes.len(), row.serialized_size());

        let recovered = Row::from_bytes(&bytes).unwrap();
        assert_eq!(recovered.fields(), row.fields());
    }

    #[test]
    fn test_row_roundtrip_with_nulls() {
        let row = Row::new(vec![
            Field::Int(1),
            Field::Null(TypeId::Varchar),
            Field::Null(TypeId::Int),
        ]);
        let bytes = row.to_bytes();
        let recovered = Row::from_bytes(&bytes).unwrap();

        assert!(recovered.fields()[1].is_null());
        assert_eq!(recovered.fields()[1].type_id(), TypeId::Varchar);
        assert!(recovered.fields()[2].is_null());
        assert_eq!(recovered.fields()[0], Field::Int(1));
    }

    #[test]
    fn test_row_from_bytes_rejects_garbage() {
        assert!(Row::from_bytes(&[]).is_none());
        assert!(Row::from_bytes(&[1, 2, 3]).is_none());
        // Field count beyond the bitset width.
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&100u32.to_le_bytes());
        assert!(Row::from_bytes(&buf).is_none());
        // Truncated payload.
        let row = Row::new(vec![Field::Varchar("truncate me".to_string())]);
        let bytes = row.to_bytes();
        assert!(Row::from_bytes(&bytes[..bytes.len() - 3]).is_none());
    }

    #[test]
    fn test_row_rid() {
        let mut row = Row::new(vec![Field::Int(1)]);
        assert!(!row.rid().is_valid());
        row.set_rid(RowId::new(PageId(5), 2));
        assert_eq!(row.rid(), RowId::new(PageId(5), 2));
    }
}
