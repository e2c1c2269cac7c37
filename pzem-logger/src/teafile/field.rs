//! Field types, values and the layout of one item.

use std::fmt;

use crate::error::SeriesError;

/// Storage type of a field, with its on-disk code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
}

impl FieldType {
    const ALL: [FieldType; 10] = [
        FieldType::Int8,
        FieldType::Int16,
        FieldType::Int32,
        FieldType::Int64,
        FieldType::UInt8,
        FieldType::UInt16,
        FieldType::UInt32,
        FieldType::UInt64,
        FieldType::Float,
        FieldType::Double,
    ];

    pub fn from_code(code: i32) -> Result<Self, SeriesError> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.code() == code)
            .ok_or(SeriesError::FieldType(code))
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Size in bytes, which is also the field alignment.
    pub fn size(self) -> usize {
        match self {
            FieldType::Int8 | FieldType::UInt8 => 1,
            FieldType::Int16 | FieldType::UInt16 => 2,
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float => 4,
            FieldType::Int64 | FieldType::UInt64 | FieldType::Double => 8,
        }
    }

    /// Single character type tag: `b h i q B H I Q f d`.
    pub fn from_format_char(c: char) -> Result<Self, SeriesError> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.format_char() == c)
            .ok_or(SeriesError::FormatChar(c))
    }

    pub fn format_char(self) -> char {
        match self {
            FieldType::Int8 => 'b',
            FieldType::Int16 => 'h',
            FieldType::Int32 => 'i',
            FieldType::Int64 => 'q',
            FieldType::UInt8 => 'B',
            FieldType::UInt16 => 'H',
            FieldType::UInt32 => 'I',
            FieldType::UInt64 => 'Q',
            FieldType::Float => 'f',
            FieldType::Double => 'd',
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single field value of an item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int8(_) => FieldType::Int8,
            FieldValue::Int16(_) => FieldType::Int16,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::UInt8(_) => FieldType::UInt8,
            FieldValue::UInt16(_) => FieldType::UInt16,
            FieldValue::UInt32(_) => FieldType::UInt32,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Double(_) => FieldType::Double,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Int8(v) => f64::from(v),
            FieldValue::Int16(v) => f64::from(v),
            FieldValue::Int32(v) => f64::from(v),
            FieldValue::Int64(v) => v as f64,
            FieldValue::UInt8(v) => f64::from(v),
            FieldValue::UInt16(v) => f64::from(v),
            FieldValue::UInt32(v) => f64::from(v),
            FieldValue::UInt64(v) => v as f64,
            FieldValue::Float(v) => f64::from(v),
            FieldValue::Double(v) => v,
        }
    }

    fn encode_into(&self, dst: &mut [u8]) {
        match *self {
            FieldValue::Int8(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::Int16(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::Int32(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::Int64(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::UInt8(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::UInt16(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::UInt32(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::UInt64(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::Float(v) => dst.copy_from_slice(&v.to_le_bytes()),
            FieldValue::Double(v) => dst.copy_from_slice(&v.to_le_bytes()),
        }
    }

    /// `src` must be exactly `ty.size()` bytes.
    fn decode(ty: FieldType, src: &[u8]) -> Self {
        let mut b8 = [0u8; 8];
        b8[..src.len()].copy_from_slice(src);
        let [b0, b1, b2, b3, ..] = b8;
        match ty {
            FieldType::Int8 => FieldValue::Int8(i8::from_le_bytes([b0])),
            FieldType::Int16 => FieldValue::Int16(i16::from_le_bytes([b0, b1])),
            FieldType::Int32 => FieldValue::Int32(i32::from_le_bytes([b0, b1, b2, b3])),
            FieldType::Int64 => FieldValue::Int64(i64::from_le_bytes(b8)),
            FieldType::UInt8 => FieldValue::UInt8(b0),
            FieldType::UInt16 => FieldValue::UInt16(u16::from_le_bytes([b0, b1])),
            FieldType::UInt32 => FieldValue::UInt32(u32::from_le_bytes([b0, b1, b2, b3])),
            FieldType::UInt64 => FieldValue::UInt64(u64::from_le_bytes(b8)),
            FieldType::Float => FieldValue::Float(f32::from_le_bytes([b0, b1, b2, b3])),
            FieldType::Double => FieldValue::Double(f64::from_le_bytes(b8)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int8(v) => write!(f, "{v}"),
            FieldValue::Int16(v) => write!(f, "{v}"),
            FieldValue::Int32(v) => write!(f, "{v}"),
            FieldValue::Int64(v) => write!(f, "{v}"),
            FieldValue::UInt8(v) => write!(f, "{v}"),
            FieldValue::UInt16(v) => write!(f, "{v}"),
            FieldValue::UInt32(v) => write!(f, "{v}"),
            FieldValue::UInt64(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Double(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    /// Byte offset inside the item.
    pub offset: usize,
    /// Field holds milliseconds since 1970-01-01.
    pub is_time: bool,
}

impl Field {
    fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.ty.size()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:10}   Type:{:>7}   Offset:{:>2}   IsTime:{}",
            self.name,
            self.ty,
            self.offset,
            u8::from(self.is_time)
        )
    }
}

/// Name, size and field layout of the fixed-width items of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDescription {
    pub name: String,
    pub size: usize,
    pub fields: Vec<Field>,
}

impl ItemDescription {
    /// Lay out `fields` in order, each aligned to its own size, and pad the
    /// item to a multiple of its largest field. Without `name` the item is
    /// named after the first letter of each field.
    pub fn new(name: Option<&str>, fields: &[(&str, FieldType)]) -> Result<Self, SeriesError> {
        if fields.is_empty() {
            return Err(SeriesError::NoFields);
        }

        let mut offset: usize = 0;
        let mut laid_out = Vec::with_capacity(fields.len());
        for &(field_name, ty) in fields {
            offset = offset.next_multiple_of(ty.size());
            laid_out.push(Field {
                name: field_name.to_string(),
                ty,
                offset,
                is_time: field_name.eq_ignore_ascii_case("time"),
            });
            offset += ty.size();
        }

        let alignment = fields.iter().map(|(_, ty)| ty.size()).max().unwrap_or(1);
        let name = match name {
            Some(name) => name.to_string(),
            None => fields
                .iter()
                .filter_map(|(field_name, _)| field_name.chars().next())
                .collect(),
        };

        Ok(Self {
            name,
            size: offset.next_multiple_of(alignment),
            fields: laid_out,
        })
    }

    /// Like [`ItemDescription::new`] with one format character per field, e.g. `"qdd"`.
    pub fn from_format(names: &[&str], format: &str) -> Result<Self, SeriesError> {
        let types = format
            .chars()
            .map(FieldType::from_format_char)
            .collect::<Result<Vec<_>, _>>()?;
        if types.len() != names.len() {
            return Err(SeriesError::ValueCount {
                expected: names.len(),
                actual: types.len(),
            });
        }
        let fields = names.iter().copied().zip(types).collect::<Vec<_>>();
        Self::new(None, &fields)
    }

    /// Description as read back from a file header.
    pub(crate) fn from_parts(name: String, size: usize, fields: Vec<Field>) -> Result<Self, SeriesError> {
        if fields.is_empty() {
            return Err(SeriesError::NoFields);
        }
        if let Some(field) = fields.iter().find(|field| field.range().end > size) {
            return Err(SeriesError::FieldOffset(field.offset as i32));
        }
        Ok(Self { name, size, fields })
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn encode(&self, values: &[FieldValue]) -> Result<Vec<u8>, SeriesError> {
        if values.len() != self.fields.len() {
            return Err(SeriesError::ValueCount {
                expected: self.fields.len(),
                actual: values.len(),
            });
        }

        let mut bytes = vec![0u8; self.size];
        for (field, value) in self.fields.iter().zip(values) {
            if value.field_type() != field.ty {
                return Err(SeriesError::ValueType(field.name.clone()));
            }
            value.encode_into(&mut bytes[field.range()]);
        }
        Ok(bytes)
    }

    /// `bytes` must hold one whole item.
    pub fn decode(&self, bytes: &[u8]) -> Vec<FieldValue> {
        self.fields
            .iter()
            .map(|field| FieldValue::decode(field.ty, &bytes[field.range()]))
            .collect()
    }
}

impl fmt::Display for ItemDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name:\t{}", self.name)?;
        writeln!(f, "Size:\t{}", self.size)?;
        write!(f, "Fields:")?;
        for field in &self.fields {
            write!(f, "\n  {field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_alignment_and_padding() {
        let item = ItemDescription::from_format(&["Time", "Price", "Volume"], "qdq").unwrap();
        assert_eq!(item.name, "TPV");
        assert_eq!(item.size, 24);
        assert_eq!(
            item.fields.iter().map(|f| f.offset).collect::<Vec<_>>(),
            vec![0, 8, 16]
        );
        assert!(item.fields[0].is_time);

        let item = ItemDescription::from_format(&["a", "b", "c"], "bdh").unwrap();
        assert_eq!(
            item.fields.iter().map(|f| f.offset).collect::<Vec<_>>(),
            vec![0, 8, 16]
        );
        assert_eq!(item.size, 24);

        let item = ItemDescription::from_format(&["a", "b"], "ff").unwrap();
        assert_eq!(item.size, 8);
        let item = ItemDescription::from_format(&["a", "b", "c"], "fhb").unwrap();
        assert_eq!(item.size, 8);
    }

    #[test]
    fn test_invalid_formats() {
        assert!(matches!(
            ItemDescription::from_format(&["a"], "x"),
            Err(SeriesError::FormatChar('x'))
        ));
        assert!(matches!(
            ItemDescription::from_format(&["a", "b"], "f"),
            Err(SeriesError::ValueCount { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            ItemDescription::new(None, &[]),
            Err(SeriesError::NoFields)
        ));
        assert!(matches!(
            FieldType::from_code(11),
            Err(SeriesError::FieldType(11))
        ));
    }

    #[test]
    fn test_encode_decode_item() {
        let item = ItemDescription::from_format(&["level", "count", "energy"], "bId").unwrap();
        let values = [
            FieldValue::Int8(-3),
            FieldValue::UInt32(70_000),
            FieldValue::Double(12.5),
        ];
        let bytes = item.encode(&values).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[0], 0xfd);
        assert_eq!(&bytes[4..8], &70_000u32.to_le_bytes());
        assert_eq!(item.decode(&bytes), values.to_vec());
    }

    #[test]
    fn test_encode_rejects_wrong_values() {
        let item = ItemDescription::from_format(&["a", "b"], "ff").unwrap();
        assert!(matches!(
            item.encode(&[FieldValue::Float(1.0)]),
            Err(SeriesError::ValueCount { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            item.encode(&[FieldValue::Float(1.0), FieldValue::Double(2.0)]),
            Err(SeriesError::ValueType(name)) if name == "b"
        ));
    }
}
