//! File header: byte order mark, item area bounds and the description sections.

use std::fmt;

use crate::error::SeriesError;
use crate::teafile::field::{Field, FieldType, ItemDescription};

pub const BYTE_ORDER_MARK: u64 = 0x0d0e_0a04_0208_0500;

/// Byte order mark, item area start, item area end and section count.
pub const FIXED_HEADER_SIZE: usize = 32;

const ITEM_SECTION: i32 = 10;
const CONTENT_SECTION: i32 = 0x80;
const NAME_VALUE_SECTION: i32 = 0x81;
const TIME_SECTION: i32 = 0x40;

/// Value of a header name value.
#[derive(Debug, Clone, PartialEq)]
pub enum NameValue {
    Int32(i32),
    Double(f64),
    Text(String),
    Uuid([u8; 16]),
}

impl NameValue {
    fn kind(&self) -> i32 {
        match self {
            NameValue::Int32(_) => 1,
            NameValue::Double(_) => 2,
            NameValue::Text(_) => 3,
            NameValue::Uuid(_) => 4,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NameValue::Int32(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for NameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameValue::Int32(value) => write!(f, "{value}"),
            NameValue::Double(value) => write!(f, "{value}"),
            NameValue::Text(value) => write!(f, "'{value}'"),
            NameValue::Uuid(bytes) => {
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// How integer time fields map to instants: days from 0001-01-01 to the
/// epoch, and ticks per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeScale {
    pub epoch: i64,
    pub ticks_per_day: i64,
}

impl TimeScale {
    /// 1970-01-01 in milliseconds.
    pub const JAVA: TimeScale = TimeScale {
        epoch: 719_162,
        ticks_per_day: 86_400_000,
    };
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Epoch:         {:>8}", self.epoch)?;
        write!(f, "Ticks per Day: {:>8}", self.ticks_per_day)?;
        if *self == TimeScale::JAVA {
            write!(f, "\nWellknown Scale:   Java")?;
        }
        Ok(())
    }
}

/// Everything the header says about a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub item: ItemDescription,
    pub content: Option<String>,
    pub name_values: Vec<(String, NameValue)>,
    pub time_scale: TimeScale,
}

impl Description {
    pub fn new(item: ItemDescription) -> Self {
        Self {
            item,
            content: None,
            name_values: Vec::new(),
            time_scale: TimeScale::JAVA,
        }
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn with_name_value(mut self, name: &str, value: NameValue) -> Self {
        self.name_values.push((name.to_string(), value));
        self
    }

    pub fn name_value(&self, name: &str) -> Option<&NameValue> {
        self.name_values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ItemDescription\n{}\n", self.item)?;
        writeln!(
            f,
            "ContentDescription\n{}\n",
            self.content.as_deref().unwrap_or("None")
        )?;
        write!(f, "NameValues\n{{")?;
        for (i, (name, value)) in self.name_values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{name}': {value}")?;
        }
        writeln!(f, "}}\n")?;
        write!(f, "TimeScale\n{}", self.time_scale)
    }
}

/// Parsed header with the position of the item area.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub item_area_start: u64,
    /// Zero when items run to the end of the file.
    pub item_area_end: u64,
    pub description: Description,
}

struct Encoder(Vec<u8>);

impl Encoder {
    fn i32(&mut self, value: i32) {
        self.0.extend_from_slice(&value.to_le_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.0.extend_from_slice(&value.to_le_bytes());
    }

    fn text(&mut self, text: &str) {
        self.i32(text.len() as i32);
        self.0.extend_from_slice(text.as_bytes());
    }

    fn name_value(&mut self, name: &str, value: &NameValue) {
        self.text(name);
        self.i32(value.kind());
        match value {
            NameValue::Int32(value) => self.i32(*value),
            NameValue::Double(value) => self.0.extend_from_slice(&value.to_le_bytes()),
            NameValue::Text(value) => self.text(value),
            NameValue::Uuid(bytes) => self.0.extend_from_slice(bytes),
        }
    }
}

/// Serialize the header, padded so that the item area starts on an 8 byte boundary.
pub fn encode(description: &Description) -> Vec<u8> {
    let mut sections = Vec::new();

    let mut item = Encoder(Vec::new());
    item.i32(description.item.size as i32);
    item.text(&description.item.name);
    item.i32(description.item.fields.len() as i32);
    for field in &description.item.fields {
        item.i32(field.ty.code());
        item.i32(field.offset as i32);
        item.text(&field.name);
    }
    sections.push((ITEM_SECTION, item.0));

    if let Some(content) = description.content.as_deref().filter(|c| !c.is_empty()) {
        let mut payload = Encoder(Vec::new());
        payload.text(content);
        sections.push((CONTENT_SECTION, payload.0));
    }

    if !description.name_values.is_empty() {
        let mut payload = Encoder(Vec::new());
        payload.i32(description.name_values.len() as i32);
        for (name, value) in &description.name_values {
            payload.name_value(name, value);
        }
        sections.push((NAME_VALUE_SECTION, payload.0));
    }

    let mut time = Encoder(Vec::new());
    time.i64(description.time_scale.epoch);
    time.i64(description.time_scale.ticks_per_day);
    let time_fields = description
        .item
        .fields
        .iter()
        .filter(|field| field.is_time)
        .collect::<Vec<_>>();
    time.i32(time_fields.len() as i32);
    for field in time_fields {
        time.i32(field.offset as i32);
    }
    sections.push((TIME_SECTION, time.0));

    let section_bytes = sections
        .iter()
        .map(|(_, payload)| 8 + payload.len())
        .sum::<usize>();
    let item_area_start = (FIXED_HEADER_SIZE + section_bytes).next_multiple_of(8);

    let mut header = Encoder(Vec::with_capacity(item_area_start));
    header.0.extend_from_slice(&BYTE_ORDER_MARK.to_le_bytes());
    header.i64(item_area_start as i64);
    header.i64(0);
    header.i64(sections.len() as i64);
    for (id, payload) in sections {
        header.i32(id);
        header.i32(payload.len() as i32);
        header.0.extend_from_slice(&payload);
    }
    header.0.resize(item_area_start, 0);
    header.0
}

/// Reads little-endian values from a byte slice. Running past the end is an
/// overrun of `section` when reading a section payload.
struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    section: Option<i32>,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8], section: Option<i32>) -> Self {
        Self {
            bytes,
            pos: 0,
            section,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], SeriesError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.slice(N)?);
        Ok(buf)
    }

    fn slice(&mut self, len: usize) -> Result<&'a [u8], SeriesError> {
        let end = self.pos + len;
        let Some(bytes) = self.bytes.get(self.pos..end) else {
            return Err(match self.section {
                Some(id) => SeriesError::SectionOverrun {
                    id,
                    read: end as u64,
                    declared: self.bytes.len() as u64,
                },
                None => std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into(),
            });
        };
        self.pos = end;
        Ok(bytes)
    }

    fn i32(&mut self) -> Result<i32, SeriesError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn i64(&mut self) -> Result<i64, SeriesError> {
        Ok(i64::from_le_bytes(self.take()?))
    }

    fn f64(&mut self) -> Result<f64, SeriesError> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn len(&mut self) -> Result<usize, SeriesError> {
        let len = self.i32()?;
        // A negative length cannot fit anywhere.
        usize::try_from(len).map_err(|_| SeriesError::SectionOverrun {
            id: self.section.unwrap_or(0),
            read: self.pos as u64,
            declared: self.bytes.len() as u64,
        })
    }

    fn text(&mut self) -> Result<String, SeriesError> {
        let len = self.len()?;
        Ok(String::from_utf8(self.slice(len)?.to_vec())?)
    }

    fn name_value(&mut self) -> Result<(String, NameValue), SeriesError> {
        let name = self.text()?;
        let value = match self.i32()? {
            1 => NameValue::Int32(self.i32()?),
            2 => NameValue::Double(self.f64()?),
            3 => NameValue::Text(self.text()?),
            4 => NameValue::Uuid(self.take()?),
            kind => return Err(SeriesError::NameValueKind(kind)),
        };
        Ok((name, value))
    }
}

/// Item area start and section count from the first [`FIXED_HEADER_SIZE`] bytes.
pub fn decode_fixed(bytes: &[u8; FIXED_HEADER_SIZE]) -> Result<(u64, u64, u64), SeriesError> {
    let mut decoder = Decoder::new(bytes, None);
    let bom = u64::from_le_bytes(decoder.take()?);
    if bom != BYTE_ORDER_MARK {
        return Err(SeriesError::ByteOrderMark(bom));
    }
    let item_area_start = decoder.i64()? as u64;
    let item_area_end = decoder.i64()? as u64;
    let section_count = decoder.i64()? as u64;
    Ok((item_area_start, item_area_end, section_count))
}

/// Parse a whole header, `bytes` running from the file start up to the item area.
pub fn decode(bytes: &[u8]) -> Result<Header, SeriesError> {
    let fixed = bytes
        .first_chunk::<FIXED_HEADER_SIZE>()
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
    let (item_area_start, item_area_end, section_count) = decode_fixed(fixed)?;

    let mut decoder = Decoder::new(bytes, None);
    decoder.pos = FIXED_HEADER_SIZE;

    let mut item = None;
    let mut content = None;
    let mut name_values = Vec::new();
    let mut time_scale = TimeScale::JAVA;
    let mut time_offsets = Vec::new();

    for _ in 0..section_count {
        let id = decoder.i32()?;
        let size = decoder.len()?;
        let mut section = Decoder::new(decoder.slice(size)?, Some(id));
        match id {
            ITEM_SECTION => {
                let size = section.len()?;
                let name = section.text()?;
                let count = section.len()?;
                let mut fields = Vec::with_capacity(count);
                for _ in 0..count {
                    let ty = FieldType::from_code(section.i32()?)?;
                    let offset = section.len()?;
                    let name = section.text()?;
                    fields.push(Field {
                        name,
                        ty,
                        offset,
                        is_time: false,
                    });
                }
                item = Some(ItemDescription::from_parts(name, size, fields)?);
            }
            CONTENT_SECTION => content = Some(section.text()?),
            NAME_VALUE_SECTION => {
                let count = section.len()?;
                for _ in 0..count {
                    name_values.push(section.name_value()?);
                }
            }
            TIME_SECTION => {
                time_scale = TimeScale {
                    epoch: section.i64()?,
                    ticks_per_day: section.i64()?,
                };
                let count = section.len()?;
                for _ in 0..count {
                    time_offsets.push(section.i32()?);
                }
            }
            id => return Err(SeriesError::UnknownSection(id)),
        }
    }

    let mut item = item.ok_or(SeriesError::MissingItemDescription)?;
    for offset in time_offsets {
        let field = item
            .fields
            .iter_mut()
            .find(|field| field.offset as i64 == i64::from(offset))
            .ok_or(SeriesError::FieldOffset(offset))?;
        field.is_time = true;
    }

    Ok(Header {
        item_area_start,
        item_area_end,
        description: Description {
            item,
            content,
            name_values,
            time_scale,
        },
    })
}
