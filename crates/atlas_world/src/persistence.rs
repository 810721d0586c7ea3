//! # Cell Records
//!
//! One record per evicted cell.
//!
//! ## Format
//!
//! ```text
//! ┌──────────┬────────────┬───────────┬──────────────────────────────┐
//! │ "ACEL"   │ version u32│ crc32 u32 │ LZ4 payload (size-prepended) │
//! └──────────┴────────────┴───────────┴──────────────────────────────┘
//! ```
//!
//! The CRC covers the compressed payload. The payload is little-endian:
//! the cell coordinate, the component and flag name tables, then one
//! snapshot per entity (optional body, flag ids, component bytes).
//!
//! Component ids in the payload are those of the process that wrote it;
//! readers translate them through the name tables.

use atlas_core::{EntitySnapshot, SchemaTable, SimError, SimResult};
use atlas_shared::Vec3;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::body::Body;
use crate::broad_phase::Mobility;
use crate::cell::CellCoord;

/// Magic bytes at the start of every record.
pub const RECORD_MAGIC: &[u8; 4] = b"ACEL";

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

const HEADER_LEN: usize = 12;

/// One persisted entity.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityRecord {
    /// Spatial presence, if the entity had one.
    pub body: Option<Body>,
    /// Flags and component bytes.
    pub snapshot: EntitySnapshot,
}

/// Everything needed to bring an evicted cell back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellRecord {
    /// The cell.
    pub coord: CellCoord,
    /// Name tables for the ids used in `entities`.
    pub schema: SchemaTable,
    /// Entities that were in the cell.
    pub entities: Vec<EntityRecord>,
}

impl CellRecord {
    /// Creates an empty record for `coord`.
    #[must_use]
    pub fn new(coord: CellCoord, schema: SchemaTable) -> Self {
        Self {
            coord,
            schema,
            entities: Vec::new(),
        }
    }

    /// Serializes to header + compressed payload.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` if a name, table, flag list or component list is
    /// longer than its length prefix can hold.
    pub fn encode(&self) -> SimResult<Vec<u8>> {
        let payload = compress_prepend_size(&self.encode_payload()?);
        let crc = crc32fast::hash(&payload);

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(RECORD_MAGIC);
        buf.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Parses and validates a record.
    ///
    /// # Errors
    ///
    /// `IoFailure` on bad magic, unknown version, CRC mismatch, a payload
    /// that does not decompress, or truncated contents.
    pub fn decode(data: &[u8]) -> SimResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(SimError::IoFailure(format!(
                "cell record too short: {} bytes",
                data.len()
            )));
        }
        if &data[0..4] != RECORD_MAGIC {
            return Err(SimError::IoFailure("invalid cell record magic".to_string()));
        }
        let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if version != RECORD_VERSION {
            return Err(SimError::IoFailure(format!(
                "unsupported cell record version: {version}"
            )));
        }
        let stored_crc = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let payload = &data[HEADER_LEN..];
        if crc32fast::hash(payload) != stored_crc {
            return Err(SimError::IoFailure("cell record CRC mismatch".to_string()));
        }

        let raw = decompress_size_prepended(payload)
            .map_err(|e| SimError::IoFailure(format!("cell record decompression failed: {e}")))?;
        Self::decode_payload(&raw)
    }

    fn encode_payload(&self) -> SimResult<Vec<u8>> {
        let mut buf = Vec::new();
        for v in self.coord.to_array() {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        write_names(&mut buf, &self.schema.components, "record component names")?;
        write_names(&mut buf, &self.schema.flags, "record flag names")?;

        buf.extend_from_slice(&prefix::<u32>(self.entities.len(), "record entities")?.to_le_bytes());
        for entity in &self.entities {
            match &entity.body {
                Some(body) => {
                    buf.push(1);
                    for v in body.position.to_array().into_iter().chain(body.half_extents.to_array()) {
                        buf.extend_from_slice(&v.to_le_bytes());
                    }
                    buf.push(body.mobility as u8);
                }
                None => buf.push(0),
            }

            buf.push(prefix::<u8>(entity.snapshot.flags.len(), "record entity flags")?);
            buf.extend_from_slice(&entity.snapshot.flags);

            buf.push(prefix::<u8>(entity.snapshot.components.len(), "record entity components")?);
            for (id, bytes) in &entity.snapshot.components {
                buf.push(*id);
                buf.extend_from_slice(&prefix::<u32>(bytes.len(), "record component bytes")?.to_le_bytes());
                buf.extend_from_slice(bytes);
            }
        }
        Ok(buf)
    }

    fn decode_payload(data: &[u8]) -> SimResult<Self> {
        let mut reader = Reader { data, pos: 0 };

        let coord = CellCoord::new(reader.i32()?, reader.i32()?, reader.i32()?);
        let schema = SchemaTable {
            components: read_names(&mut reader)?,
            flags: read_names(&mut reader)?,
        };

        let count = reader.u32()? as usize;
        let mut entities = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let body = match reader.u8()? {
                0 => None,
                1 => {
                    let position = Vec3::new(reader.f32()?, reader.f32()?, reader.f32()?);
                    let half_extents = Vec3::new(reader.f32()?, reader.f32()?, reader.f32()?);
                    let raw = reader.u8()?;
                    let mobility = Mobility::from_u8(raw)
                        .ok_or_else(|| SimError::IoFailure(format!("invalid mobility tag {raw}")))?;
                    Some(Body {
                        position,
                        half_extents,
                        mobility,
                    })
                }
                tag => return Err(SimError::IoFailure(format!("invalid body tag {tag}"))),
            };

            let flag_count = reader.u8()? as usize;
            let flags = reader.take(flag_count)?.to_vec();

            let component_count = reader.u8()? as usize;
            let mut components = Vec::with_capacity(component_count);
            for _ in 0..component_count {
                let id = reader.u8()?;
                let len = reader.u32()? as usize;
                components.push((id, reader.take(len)?.to_vec()));
            }

            entities.push(EntityRecord {
                body,
                snapshot: EntitySnapshot { flags, components },
            });
        }

        if reader.pos != data.len() {
            return Err(SimError::IoFailure(format!(
                "cell record has {} trailing bytes",
                data.len() - reader.pos
            )));
        }

        Ok(Self {
            coord,
            schema,
            entities,
        })
    }
}

/// Converts a length to the integer type of its prefix.
fn prefix<T>(len: usize, what: &'static str) -> SimResult<T>
where
    T: TryFrom<usize> + Bounded,
{
    T::try_from(len).map_err(|_| SimError::CapacityExceeded {
        what,
        capacity: T::CAPACITY,
    })
}

/// Largest length a prefix type can hold.
trait Bounded {
    const CAPACITY: usize;
}

impl Bounded for u8 {
    const CAPACITY: usize = u8::MAX as usize;
}

impl Bounded for u16 {
    const CAPACITY: usize = u16::MAX as usize;
}

impl Bounded for u32 {
    const CAPACITY: usize = u32::MAX as usize;
}

fn write_names(buf: &mut Vec<u8>, names: &[(u8, String)], what: &'static str) -> SimResult<()> {
    buf.push(prefix::<u8>(names.len(), what)?);
    for (id, name) in names {
        buf.push(*id);
        buf.extend_from_slice(&prefix::<u16>(name.len(), "record name length")?.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
    }
    Ok(())
}

fn read_names(reader: &mut Reader<'_>) -> SimResult<Vec<(u8, String)>> {
    let count = reader.u8()? as usize;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.u8()?;
        let len = reader.u16()? as usize;
        let name = std::str::from_utf8(reader.take(len)?)
            .map_err(|e| SimError::IoFailure(format!("invalid name in cell record: {e}")))?;
        names.push((id, name.to_owned()));
    }
    Ok(names)
}

/// Bounds-checked little-endian reader.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> SimResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                SimError::IoFailure(format!("cell record truncated at byte {}", self.pos))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> SimResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> SimResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> SimResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> SimResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> SimResult<i32> {
        self.array().map(i32::from_le_bytes)
    }

    fn f32(&mut self) -> SimResult<f32> {
        self.array().map(f32::from_le_bytes)
    }
}
