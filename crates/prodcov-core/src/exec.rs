//! JaCoCo execution data (`*.exec`) codec and session model.
//!
//! File layout (all multi-byte integers big-endian):
//!
//! | block | payload |
//! |-------|---------|
//! | `0x01` header | `u16` magic `0xC0C0`, `u16` version `0x1007` |
//! | `0x10` session info | UTF id, `i64` start millis, `i64` dump millis |
//! | `0x11` execution data | `i64` class id, UTF class name, probe array |
//!
//! UTF strings are a `u16` byte length followed by Java's modified UTF-8:
//! NUL is written as `C0 80` and characters outside the BMP as two encoded
//! UTF-16 surrogates. An unpaired surrogate is rejected. A probe array
//! is a var-int length (7 bits per byte, low bits first) followed by the
//! probes packed eight per byte, least significant bit first. Dumps from
//! several runs may be concatenated, so header blocks can repeat.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{CoverageError, Result};

pub const BLOCK_HEADER: u8 = 0x01;
pub const BLOCK_SESSION_INFO: u8 = 0x10;
pub const BLOCK_EXECUTION_DATA: u8 = 0x11;
pub const MAGIC_NUMBER: u16 = 0xC0C0;
pub const FORMAT_VERSION: u16 = 0x1007;

/// Metadata of one recorded test session.
///
/// Field order is the sort order: sessions are kept sorted by start time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionInfo {
    pub start: i64,
    pub dump: i64,
    pub id: String,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>, start: i64, dump: i64) -> Self {
        Self {
            start,
            dump,
            id: id.into(),
        }
    }
}

/// Probe hits recorded for one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassExecution {
    /// CRC64 of the class bytes; identical classes share an id across builds.
    pub id: i64,
    /// VM name, e.g. `org/acme/auth/TokenService`.
    pub name: String,
    pub probes: Vec<bool>,
}

impl ClassExecution {
    pub fn new(id: i64, name: impl Into<String>, probes: Vec<bool>) -> Self {
        Self {
            id,
            name: name.into(),
            probes,
        }
    }

    pub fn hit_count(&self) -> usize {
        self.probes.iter().filter(|p| **p).count()
    }

    /// OR `other`'s probes into these.
    pub fn merge(&mut self, other: &ClassExecution) -> Result<()> {
        if self.id != other.id {
            return Err(CoverageError::ExecData(format!(
                "cannot merge class ids {:016x} and {:016x}",
                self.id, other.id
            )));
        }
        if self.name != other.name {
            return Err(CoverageError::ExecData(format!(
                "different class names {} and {} for id {:016x}",
                self.name, other.name, self.id
            )));
        }
        if self.probes.len() != other.probes.len() {
            return Err(CoverageError::ExecData(format!(
                "incompatible execution data for class {} with id {:016x}",
                self.name, self.id
            )));
        }
        for (mine, theirs) in self.probes.iter_mut().zip(&other.probes) {
            *mine |= *theirs;
        }
        Ok(())
    }
}

/// Union of execution data keyed by class id.
///
/// Merging is commutative and associative: probes are OR-ed per class and
/// session infos form a set, so any load order produces an equal session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSession {
    sessions: BTreeSet<SessionInfo>,
    classes: BTreeMap<i64, ClassExecution>,
}

impl ExecutionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&mut self, info: SessionInfo) {
        self.sessions.insert(info);
    }

    pub fn add_class(&mut self, class: ClassExecution) -> Result<()> {
        match self.classes.get_mut(&class.id) {
            Some(existing) => existing.merge(&class),
            None => {
                self.classes.insert(class.id, class);
                Ok(())
            }
        }
    }

    pub fn merge(&mut self, other: ExecutionSession) -> Result<()> {
        self.sessions.extend(other.sessions);
        for class in other.classes.into_values() {
            self.add_class(class)?;
        }
        Ok(())
    }

    pub fn sessions(&self) -> impl Iterator<Item = &SessionInfo> {
        self.sessions.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassExecution> {
        self.classes.values()
    }

    pub fn class(&self, id: i64) -> Option<&ClassExecution> {
        self.classes.get(&id)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.sessions.is_empty()
    }

    /// Decode one (possibly concatenated) execution data stream.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut session = ExecutionSession::new();
        let mut input = ExecReader { inner: reader };
        let mut first_block = true;

        while let Some(block) = input.next_block_type()? {
            if first_block && block != BLOCK_HEADER {
                return Err(CoverageError::ExecData(
                    "invalid execution data file: missing header".to_string(),
                ));
            }
            first_block = false;

            match block {
                BLOCK_HEADER => {
                    let magic = input.read_u16()?;
                    if magic != MAGIC_NUMBER {
                        return Err(CoverageError::ExecData(format!(
                            "invalid execution data file: bad magic {magic:#06x}"
                        )));
                    }
                    let version = input.read_u16()?;
                    if version != FORMAT_VERSION {
                        return Err(CoverageError::ExecData(format!(
                            "incompatible execution data version {version:#06x}, expected {FORMAT_VERSION:#06x}"
                        )));
                    }
                }
                BLOCK_SESSION_INFO => {
                    let id = input.read_utf()?;
                    let start = input.read_i64()?;
                    let dump = input.read_i64()?;
                    session.add_session(SessionInfo::new(id, start, dump));
                }
                BLOCK_EXECUTION_DATA => {
                    let id = input.read_i64()?;
                    let name = input.read_utf()?;
                    let probes = input.read_bool_array()?;
                    session.add_class(ClassExecution::new(id, name, probes))?;
                }
                other => {
                    return Err(CoverageError::ExecData(format!(
                        "unknown block type {other:#04x}"
                    )));
                }
            }
        }
        Ok(session)
    }

    /// Read `path` and merge its contents into this session.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let loaded = Self::read_from(BufReader::new(file)).map_err(|e| match e {
            CoverageError::ExecData(detail) => {
                CoverageError::ExecData(format!("{}: {detail}", path.display()))
            }
            other => other,
        })?;
        self.merge(loaded)
    }

    /// Encode as a single execution data stream: header, sessions, classes
    /// in ascending id order.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = ExecWriter { inner: writer };
        out.write_u8(BLOCK_HEADER)?;
        out.write_u16(MAGIC_NUMBER)?;
        out.write_u16(FORMAT_VERSION)?;

        for info in &self.sessions {
            out.write_u8(BLOCK_SESSION_INFO)?;
            out.write_utf(&info.id)?;
            out.write_i64(info.start)?;
            out.write_i64(info.dump)?;
        }
        for class in self.classes.values() {
            out.write_u8(BLOCK_EXECUTION_DATA)?;
            out.write_i64(class.id)?;
            out.write_utf(&class.name)?;
            out.write_bool_array(&class.probes)?;
        }
        out.inner.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(BufWriter::new(file))
    }
}

struct ExecReader<R> {
    inner: R,
}

impl<R: Read> ExecReader<R> {
    /// `None` on a clean end of stream between blocks.
    fn next_block_type(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                CoverageError::ExecData("truncated execution data".to_string())
            } else {
                CoverageError::Io(e)
            }
        })
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    fn read_utf(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        decode_modified_utf8(&buf)
    }

    fn read_var_int(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 28 {
                return Err(CoverageError::ExecData("var-int too long".to_string()));
            }
        }
    }

    fn read_bool_array(&mut self) -> Result<Vec<bool>> {
        let len = self.read_var_int()? as usize;
        let mut packed = vec![0u8; len.div_ceil(8)];
        self.read_exact(&mut packed)?;
        Ok((0..len)
            .map(|i| packed[i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }
}

struct ExecWriter<W> {
    inner: W,
}

impl<W: Write> ExecWriter<W> {
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.inner.write_all(&[value])?;
        Ok(())
    }

    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.inner.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn write_utf(&mut self, value: &str) -> Result<()> {
        let bytes = encode_modified_utf8(value);
        let len = u16::try_from(bytes.len()).map_err(|_| {
            CoverageError::ExecData(format!("string of {} bytes is too long", bytes.len()))
        })?;
        self.write_u16(len)?;
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    fn write_var_int(&mut self, mut value: u32) -> Result<()> {
        while value & !0x7F != 0 {
            self.write_u8(0x80 | (value & 0x7F) as u8)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    fn write_bool_array(&mut self, probes: &[bool]) -> Result<()> {
        let len = u32::try_from(probes.len())
            .map_err(|_| CoverageError::ExecData("probe array too long".to_string()))?;
        self.write_var_int(len)?;
        for chunk in probes.chunks(8) {
            let byte = chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (bit, hit)| if *hit { acc | (1 << bit) } else { acc });
            self.write_u8(byte)?;
        }
        Ok(())
    }
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let malformed = || CoverageError::ExecData("malformed modified UTF-8 string".to_string());
    let continuation = |b: Option<&u8>| match b {
        Some(&b) if b & 0xC0 == 0x80 => Ok(u16::from(b & 0x3F)),
        _ => Err(malformed()),
    };

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        let unit = match b {
            0x00..=0x7F => u16::from(b),
            0xC0..=0xDF => (u16::from(b & 0x1F) << 6) | continuation(iter.next())?,
            0xE0..=0xEF => {
                let hi = continuation(iter.next())?;
                let lo = continuation(iter.next())?;
                (u16::from(b & 0x0F) << 12) | (hi << 6) | lo
            }
            _ => return Err(malformed()),
        };
        units.push(unit);
    }
    String::from_utf16(&units)
        .map_err(|e| CoverageError::ExecData(format!("invalid UTF string: {e}")))
}

fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(session: &ExecutionSession) -> Vec<u8> {
        let mut buf = Vec::new();
        session.write_to(&mut buf).unwrap();
        buf
    }

    fn sample(id: &str, class_probes: &[(i64, &str, &[bool])]) -> ExecutionSession {
        let mut session = ExecutionSession::new();
        session.add_session(SessionInfo::new(id, 1_000, 2_000));
        for (class_id, name, probes) in class_probes {
            session
                .add_class(ClassExecution::new(*class_id, *name, probes.to_vec()))
                .unwrap();
        }
        session
    }

    #[test]
    fn test_known_byte_layout() {
        let session = sample("s", &[(1, "A", &[true, false, true])]);
        let bytes = encode(&session);

        let mut expected = vec![0x01, 0xC0, 0xC0, 0x10, 0x07];
        expected.extend([0x10, 0x00, 0x01, b's']);
        expected.extend(1_000i64.to_be_bytes());
        expected.extend(2_000i64.to_be_bytes());
        expected.extend([0x11]);
        expected.extend(1i64.to_be_bytes());
        expected.extend([0x00, 0x01, b'A', 0x03, 0b0000_0101]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_decode_what_was_encoded() {
        let probes: Vec<bool> = (0..300).map(|i| i % 3 == 0).collect();
        let mut session = sample("host-1", &[(-42, "org/acme/A", &[true])]);
        session
            .add_class(ClassExecution::new(7, "org/acme/B", probes))
            .unwrap();

        let decoded = ExecutionSession::read_from(encode(&session).as_slice()).unwrap();
        assert_eq!(decoded, session);
        assert_eq!(decoded.class(7).unwrap().probes.len(), 300);
    }

    #[test]
    fn test_merge_ors_probes() {
        let mut a = sample("a", &[(1, "A", &[true, false, false])]);
        let b = sample("b", &[(1, "A", &[false, false, true]), (2, "B", &[true])]);
        a.merge(b).unwrap();

        assert_eq!(a.class(1).unwrap().probes, vec![true, false, true]);
        assert_eq!(a.class_count(), 2);
        assert_eq!(a.sessions().count(), 2);
    }

    #[test]
    fn test_merge_rejects_incompatible_classes() {
        let mut a = sample("a", &[(1, "A", &[true, false])]);
        let err = a.merge(sample("b", &[(1, "A", &[true])])).unwrap_err();
        assert!(err.to_string().contains("incompatible"));

        let err = a.merge(sample("c", &[(1, "Z", &[true, true])])).unwrap_err();
        assert!(err.to_string().contains("different class names"));
    }

    #[test]
    fn test_merge_order_independent() {
        let a = sample("a", &[(1, "A", &[true, false, false]), (3, "C", &[false])]);
        let b = sample("b", &[(1, "A", &[false, true, false])]);
        let c = sample("c", &[(2, "B", &[true, true]), (3, "C", &[true])]);

        let mut abc = ExecutionSession::new();
        for s in [a.clone(), b.clone(), c.clone()] {
            abc.merge(s).unwrap();
        }
        let mut cab = ExecutionSession::new();
        for s in [c, a, b] {
            cab.merge(s).unwrap();
        }
        assert_eq!(abc, cab);
        assert_eq!(encode(&abc), encode(&cab));
    }

    #[test]
    fn test_concatenated_dumps() {
        let mut bytes = encode(&sample("a", &[(1, "A", &[true, false])]));
        bytes.extend(encode(&sample("b", &[(1, "A", &[false, true])])));

        let decoded = ExecutionSession::read_from(bytes.as_slice()).unwrap();
        assert_eq!(decoded.class(1).unwrap().probes, vec![true, true]);
        assert_eq!(decoded.sessions().count(), 2);
    }

    #[test]
    fn test_empty_stream_is_empty_session() {
        let decoded = ExecutionSession::read_from(&[][..]).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_rejects_malformed_input() {
        // Missing header.
        assert!(ExecutionSession::read_from(&[0x11u8, 0, 0][..]).is_err());
        // Bad magic.
        assert!(ExecutionSession::read_from(&[0x01u8, 0xCA, 0xFE, 0x10, 0x07][..]).is_err());
        // Unsupported version.
        let err = ExecutionSession::read_from(&[0x01u8, 0xC0, 0xC0, 0x10, 0x06][..]).unwrap_err();
        assert!(err.to_string().contains("incompatible"));
        // Unknown block.
        assert!(ExecutionSession::read_from(&[0x01u8, 0xC0, 0xC0, 0x10, 0x07, 0x7F][..]).is_err());
        // Truncated execution data block.
        let mut bytes = encode(&sample("a", &[(1, "A", &[true; 20])]));
        bytes.truncate(bytes.len() - 2);
        let err = ExecutionSession::read_from(bytes.as_slice()).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jacoco.exec");
        sample("a", &[(9, "Z", &[false, true])]).save(&path).unwrap();

        let mut session = sample("b", &[(9, "Z", &[true, false])]);
        session.load_file(&path).unwrap();
        assert_eq!(session.class(9).unwrap().hit_count(), 2);
    }

    #[test]
    fn test_strings_use_java_modified_utf8() {
        let encoded = encode_modified_utf8("a\0\u{e9}\u{1F600}");
        assert_eq!(
            encoded,
            [0x61, 0xC0, 0x80, 0xC3, 0xA9, 0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]
        );
        assert_eq!(decode_modified_utf8(&encoded).unwrap(), "a\0\u{e9}\u{1F600}");

        assert!(decode_modified_utf8(&[0xC3]).is_err());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        assert!(decode_modified_utf8(&[0xED, 0xA0, 0xBD]).is_err());
    }

    #[test]
    fn test_class_name_with_supplementary_character_survives_file() {
        let mut session = ExecutionSession::new();
        session
            .add_class(ClassExecution::new(9, "org/acme/Emoji\u{1F600}$Inner", vec![true]))
            .unwrap();

        let mut bytes = Vec::new();
        session.write_to(&mut bytes).unwrap();
        let decoded = ExecutionSession::read_from(bytes.as_slice()).unwrap();
        assert_eq!(decoded.class(9).unwrap().name, "org/acme/Emoji\u{1F600}$Inner");
    }
}
