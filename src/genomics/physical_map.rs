//! Physical map of tags: sequence, genomic placement and variant slots.
//!
//! Entries live in an arena whose indices stay stable for the whole run. The
//! position ordering needed for locus scanning is a separate, recomputable
//! [`PositionIndex`]; committing variants never moves an entry, so the index
//! stays valid across [`PhysicalMap::set_variant`] calls.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use tracing::{debug, info};

use super::allele::{Allele, MISSING_CODE};
use super::packed_sequence::{PackedSequence, PackedSequenceError, BASES_PER_WORD};

/// "TOPM" in ASCII (little-endian byte order).
const MAGIC: u32 = 0x4D50_4F54;
/// Current binary format version.
const FORMAT: u8 = 1;
/// Size of the binary header in bytes.
pub const SIZE_HEADER: usize = 16;

const MISSING_COORDINATE: i32 = i32::MIN;
const MISSING_STRAND: i8 = i8::MIN;
const MISSING_OFFSET: u8 = 0xFF;
const MISSING_TEXT: &str = "*";

/// Errors raised while loading, saving or updating a physical map.
#[derive(Debug, Error)]
pub enum MapError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The binary header does not start with the expected magic number.
    #[error("invalid magic number: {0:#010x}")]
    InvalidMagic(u32),
    /// The binary header carries an unknown format version.
    #[error("unsupported physical map format version {0}")]
    UnsupportedFormat(u8),
    /// Header counts, record lengths or field values are inconsistent.
    #[error("corrupt physical map: {0}")]
    Corrupt(String),
    /// The declared tag count cannot be held in memory.
    #[error(
        "physical map declares {tags} tags which cannot be allocated; \
         split the map by chromosome or lower the tag count"
    )]
    Capacity {
        /// Number of tags requested by the header.
        tags: usize,
    },
    /// Entry index past the end of the map.
    #[error("entry index {index} out of range ({len} entries)")]
    EntryOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of entries in the map.
        len: usize,
    },
    /// Variant slot index past the configured slot count.
    #[error("variant slot {slot} out of range ({max} slots per tag)")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Slots available per tag.
        max: usize,
    },
    /// The offset collides with the unused-slot marker of the binary layout.
    #[error("variant offset {0:#04x} is reserved for unused slots")]
    ReservedOffset(u8),
    /// A tag was packed with a different word count than the map uses.
    #[error("tag packed into {got} words, map expects {expected}")]
    WordCountMismatch {
        /// Words per tag declared by the map.
        expected: usize,
        /// Words carried by the tag.
        got: usize,
    },
    /// A tag sequence could not be packed.
    #[error(transparent)]
    Sequence(#[from] PackedSequenceError),
}

/// Strand of the genome a tag aligned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    /// Plus strand; tag bases run towards higher coordinates.
    Forward,
    /// Minus strand; tag bases run towards lower coordinates.
    Reverse,
}

impl Strand {
    /// `+1` or `-1`.
    pub fn sign(self) -> i32 {
        match self {
            Strand::Forward => 1,
            Strand::Reverse => -1,
        }
    }

    /// `+` or `-`.
    pub fn as_char(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }

    fn code(strand: Option<Self>) -> i8 {
        match strand {
            Some(Strand::Forward) => 1,
            Some(Strand::Reverse) => -1,
            None => MISSING_STRAND,
        }
    }

    fn from_code(code: i8) -> Option<Option<Self>> {
        match code {
            1 => Some(Some(Strand::Forward)),
            -1 => Some(Some(Strand::Reverse)),
            MISSING_STRAND => Some(None),
            _ => None,
        }
    }
}

/// One called polymorphism recorded on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSlot {
    /// Tag base offset of the site (tag orientation).
    pub offset: u8,
    /// Forward-strand allele carried by the tag, `None` if not retained.
    pub allele: Option<Allele>,
}

/// Genomic placement of a tag; any field may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagPosition {
    /// Chromosome identifier.
    pub chromosome: Option<i32>,
    /// Alignment strand.
    pub strand: Option<Strand>,
    /// Genomic coordinate of the tag's first base.
    pub start: Option<i32>,
}

/// Physical map record for a single tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    /// Packed tag sequence.
    pub sequence: PackedSequence,
    /// Chromosome identifier.
    pub chromosome: Option<i32>,
    /// Alignment strand.
    pub strand: Option<Strand>,
    /// Genomic coordinate of the first tag base.
    pub start: Option<i32>,
    variants: Vec<Option<VariantSlot>>,
}

impl MapEntry {
    /// Entry with no placement and `max_variants` empty slots.
    pub fn unplaced(sequence: PackedSequence, max_variants: usize) -> Self {
        Self {
            sequence,
            chromosome: None,
            strand: None,
            start: None,
            variants: vec![None; max_variants],
        }
    }

    /// Entry aligned to `chromosome`/`strand`/`start`.
    pub fn placed(
        sequence: PackedSequence,
        chromosome: i32,
        strand: Strand,
        start: i32,
        max_variants: usize,
    ) -> Self {
        Self {
            chromosome: Some(chromosome),
            strand: Some(strand),
            start: Some(start),
            ..Self::unplaced(sequence, max_variants)
        }
    }

    /// Current placement.
    pub fn position(&self) -> TagPosition {
        TagPosition {
            chromosome: self.chromosome,
            strand: self.strand,
            start: self.start,
        }
    }

    /// Variant slots, `None` for unused ones.
    pub fn variants(&self) -> &[Option<VariantSlot>] {
        &self.variants
    }

    /// Number of slots holding a call.
    pub fn used_variant_slots(&self) -> usize {
        self.variants.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Borrowed view of an entry with complete coordinates.
#[derive(Debug, Clone, Copy)]
pub struct PlacedTag<'a> {
    /// Index of the entry in the map.
    pub entry: usize,
    /// Packed tag sequence.
    pub sequence: &'a PackedSequence,
    /// Chromosome identifier.
    pub chromosome: i32,
    /// Alignment strand.
    pub strand: Strand,
    /// Genomic coordinate of the first tag base.
    pub start: i32,
}

/// Entry indices ordered by `(chromosome, start)`, missing coordinates last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionIndex {
    order: Vec<usize>,
    rank: Vec<usize>,
    chromosomes: Vec<Option<i32>>,
}

impl PositionIndex {
    /// Entry indices in position order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Position-sorted rank of an entry.
    pub fn rank_of(&self, entry: usize) -> Option<usize> {
        self.rank.get(entry).copied()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when no entries are indexed.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries on `chromosome`, in position order.
    pub fn chromosome_block(&self, chromosome: i32) -> &[usize] {
        let key = Some(chromosome);
        let lo = self
            .chromosomes
            .partition_point(|c| c.is_some() && *c < key);
        let hi = self
            .chromosomes
            .partition_point(|c| c.is_some() && *c <= key);
        &self.order[lo..hi]
    }
}

/// Fixed-layout header of the binary map format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MapHeader {
    max_variants: u8,
    words_per_tag: u16,
    tag_count: u32,
}

impl MapHeader {
    fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self, MapError> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        if magic != MAGIC {
            return Err(MapError::InvalidMagic(magic));
        }
        if buffer[4] != FORMAT {
            return Err(MapError::UnsupportedFormat(buffer[4]));
        }
        if buffer[12..16].iter().any(|&b| b != 0) {
            return Err(MapError::Corrupt("reserved header bytes are not zero".into()));
        }
        let header = Self {
            max_variants: buffer[5],
            words_per_tag: LittleEndian::read_u16(&buffer[6..8]),
            tag_count: LittleEndian::read_u32(&buffer[8..12]),
        };
        if header.words_per_tag == 0 {
            return Err(MapError::Corrupt("header declares zero words per tag".into()));
        }
        Ok(header)
    }

    fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), MapError> {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], MAGIC);
        buffer[4] = FORMAT;
        buffer[5] = self.max_variants;
        LittleEndian::write_u16(&mut buffer[6..8], self.words_per_tag);
        LittleEndian::write_u32(&mut buffer[8..12], self.tag_count);
        writer.write_all(&buffer)?;
        Ok(())
    }

    fn record_size(&self) -> usize {
        usize::from(self.words_per_tag) * 8 + 1 + 4 + 1 + 4 + 2 * usize::from(self.max_variants)
    }
}

/// Arena of tag records plus map-wide layout parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMap {
    words_per_tag: usize,
    max_variants: usize,
    entries: Vec<MapEntry>,
}

impl PhysicalMap {
    /// Empty map packing tags into `words_per_tag` words with `max_variants` slots.
    pub fn new(words_per_tag: usize, max_variants: usize) -> Self {
        Self {
            words_per_tag,
            max_variants,
            entries: Vec::new(),
        }
    }

    /// Words used to pack each tag.
    pub fn words_per_tag(&self) -> usize {
        self.words_per_tag
    }

    /// Longest tag the map can store.
    pub fn max_tag_length(&self) -> usize {
        (self.words_per_tag * BASES_PER_WORD).min(super::packed_sequence::MAX_TAG_LENGTH)
    }

    /// Variant slots per tag.
    pub fn max_variants(&self) -> usize {
        self.max_variants
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `index`.
    pub fn entry(&self, index: usize) -> Option<&MapEntry> {
        self.entries.get(index)
    }

    /// All entries in storage order.
    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Append an entry, returning its index.
    pub fn push(&mut self, mut entry: MapEntry) -> Result<usize, MapError> {
        if entry.sequence.words().len() != self.words_per_tag {
            return Err(MapError::WordCountMismatch {
                expected: self.words_per_tag,
                got: entry.sequence.words().len(),
            });
        }
        entry.variants.resize(self.max_variants, None);
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Placement of an entry, `None` for an out-of-range index.
    pub fn position_of(&self, index: usize) -> Option<TagPosition> {
        self.entries.get(index).map(MapEntry::position)
    }

    /// View of an entry whose chromosome, strand and start are all known.
    pub fn placed(&self, index: usize) -> Option<PlacedTag<'_>> {
        let entry = self.entries.get(index)?;
        Some(PlacedTag {
            entry: index,
            sequence: &entry.sequence,
            chromosome: entry.chromosome?,
            strand: entry.strand?,
            start: entry.start?,
        })
    }

    /// Distinct chromosome identifiers, ascending.
    pub fn chromosomes(&self) -> Vec<i32> {
        let mut chromosomes: Vec<i32> = self.entries.iter().filter_map(|e| e.chromosome).collect();
        chromosomes.sort_unstable();
        chromosomes.dedup();
        chromosomes
    }

    /// Overwrite one variant slot of an entry.
    ///
    /// Callers write each (entry, site) pair at most once per run.
    pub fn set_variant(
        &mut self,
        index: usize,
        slot: usize,
        offset: u8,
        allele: Option<Allele>,
    ) -> Result<(), MapError> {
        if offset == MISSING_OFFSET {
            return Err(MapError::ReservedOffset(offset));
        }
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(MapError::EntryOutOfRange { index, len })?;
        let target = entry.variants.get_mut(slot).ok_or(MapError::SlotOutOfRange {
            slot,
            max: self.max_variants,
        })?;
        *target = Some(VariantSlot { offset, allele });
        Ok(())
    }

    /// Empty every variant slot of an entry.
    pub fn clear_variants(&mut self, index: usize) -> Result<(), MapError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(MapError::EntryOutOfRange { index, len })?;
        entry.variants.fill(None);
        Ok(())
    }

    /// Build the `(chromosome, start)` ordering; ties keep storage order.
    pub fn sort_by_position(&self) -> PositionIndex {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&idx| {
            let entry = &self.entries[idx];
            (
                entry.chromosome.is_none(),
                entry.chromosome,
                entry.start.is_none(),
                entry.start,
            )
        });

        let mut rank = vec![0; order.len()];
        for (r, &idx) in order.iter().enumerate() {
            rank[idx] = r;
        }
        let chromosomes = order.iter().map(|&idx| self.entries[idx].chromosome).collect();

        PositionIndex {
            order,
            rank,
            chromosomes,
        }
    }

    /// Load a map from disk, detecting the legacy text layout by its leading digit.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MapError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let is_text = reader
            .fill_buf()?
            .first()
            .map(u8::is_ascii_digit)
            .unwrap_or(false);

        let map = if is_text {
            Self::read_text(reader)?
        } else {
            let mut buffer = [0u8; SIZE_HEADER];
            reader.read_exact(&mut buffer).map_err(truncated)?;
            let header = MapHeader::from_bytes(&buffer)?;
            let expected = SIZE_HEADER as u64 + u64::from(header.tag_count) * header.record_size() as u64;
            if file_len != expected {
                return Err(MapError::Corrupt(format!(
                    "file holds {file_len} bytes but header implies {expected}"
                )));
            }
            Self::read_records(header, &mut reader)?
        };

        info!(
            path = %path.display(),
            tags = map.len(),
            words_per_tag = map.words_per_tag,
            max_variants = map.max_variants,
            "loaded physical map"
        );
        Ok(map)
    }

    /// Parse the binary layout.
    pub fn read_binary<R: Read>(mut reader: R) -> Result<Self, MapError> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer).map_err(truncated)?;
        let header = MapHeader::from_bytes(&buffer)?;
        Self::read_records(header, &mut reader)
    }

    fn read_records<R: Read>(header: MapHeader, reader: &mut R) -> Result<Self, MapError> {
        let mut map = Self::new(
            usize::from(header.words_per_tag),
            usize::from(header.max_variants),
        );
        let tags = header.tag_count as usize;
        map.entries
            .try_reserve_exact(tags)
            .map_err(|_| MapError::Capacity { tags })?;

        for tag in 0..tags {
            let entry = map.read_record(reader).map_err(|err| match err {
                MapError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => MapError::Corrupt(
                    format!("header declares {tags} tags but data ends at tag {tag}"),
                ),
                other => other,
            })?;
            map.entries.push(entry);
        }

        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(MapError::Corrupt(format!(
                "trailing bytes after {tags} declared tags"
            )));
        }
        debug!(tags, "parsed binary physical map records");
        Ok(map)
    }

    fn read_record<R: Read>(&self, reader: &mut R) -> Result<MapEntry, MapError> {
        let mut words = vec![0u64; self.words_per_tag];
        reader.read_u64_into::<LittleEndian>(&mut words)?;
        let len = reader.read_u8()?;
        let sequence = PackedSequence::from_words(words, len)
            .map_err(|e| MapError::Corrupt(e.to_string()))?;

        let chromosome = optional_coordinate(reader.read_i32::<LittleEndian>()?);
        let strand_code = reader.read_i8()?;
        let strand = Strand::from_code(strand_code)
            .ok_or_else(|| MapError::Corrupt(format!("invalid strand code {strand_code}")))?;
        let start = optional_coordinate(reader.read_i32::<LittleEndian>()?);

        let mut variants = Vec::with_capacity(self.max_variants);
        for _ in 0..self.max_variants {
            let offset = reader.read_u8()?;
            let allele = reader.read_u8()?;
            variants.push(decode_slot(offset, allele)?);
        }

        Ok(MapEntry {
            sequence,
            chromosome,
            strand,
            start,
            variants,
        })
    }

    /// Serialise the binary layout.
    pub fn write_binary<W: Write>(&self, mut writer: W) -> Result<(), MapError> {
        let header = MapHeader {
            max_variants: u8::try_from(self.max_variants)
                .map_err(|_| MapError::Corrupt(format!("{} variant slots", self.max_variants)))?,
            words_per_tag: u16::try_from(self.words_per_tag)
                .map_err(|_| MapError::Corrupt(format!("{} words per tag", self.words_per_tag)))?,
            tag_count: u32::try_from(self.entries.len())
                .map_err(|_| MapError::Capacity {
                    tags: self.entries.len(),
                })?,
        };
        header.write_bytes(&mut writer)?;

        for entry in &self.entries {
            for &word in entry.sequence.words() {
                writer.write_u64::<LittleEndian>(word)?;
            }
            writer.write_u8(entry.sequence.len() as u8)?;
            writer.write_i32::<LittleEndian>(entry.chromosome.unwrap_or(MISSING_COORDINATE))?;
            writer.write_i8(Strand::code(entry.strand))?;
            writer.write_i32::<LittleEndian>(entry.start.unwrap_or(MISSING_COORDINATE))?;
            for slot in &entry.variants {
                let (offset, allele) = match slot {
                    Some(slot) => (slot.offset, Allele::code_or_missing(slot.allele)),
                    None => (MISSING_OFFSET, MISSING_CODE),
                };
                writer.write_u8(offset)?;
                writer.write_u8(allele)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the binary layout to `path`.
    pub fn write_binary_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MapError> {
        let path = path.as_ref();
        self.write_binary(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), tags = self.len(), "wrote binary physical map");
        Ok(())
    }

    /// Parse the tab-delimited text layout.
    pub fn read_text<R: BufRead>(reader: R) -> Result<Self, MapError> {
        let mut lines = reader.lines();
        let header_line = lines
            .next()
            .ok_or_else(|| MapError::Corrupt("empty text map".into()))??;
        let header: Vec<usize> = header_line
            .split('\t')
            .map(|field| field.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|e| MapError::Corrupt(format!("bad text header '{header_line}': {e}")))?;
        let &[tags, words_per_tag, max_variants] = header.as_slice() else {
            return Err(MapError::Corrupt(format!(
                "text header needs 3 fields, found {}",
                header.len()
            )));
        };

        let mut map = Self::new(words_per_tag, max_variants);
        map.entries
            .try_reserve_exact(tags)
            .map_err(|_| MapError::Capacity { tags })?;

        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = map
                .parse_text_record(&line)
                .map_err(|reason| MapError::Corrupt(format!("line {}: {reason}", line_no + 2)))?;
            map.entries.push(entry);
        }

        if map.entries.len() != tags {
            return Err(MapError::Corrupt(format!(
                "header declares {tags} tags, found {}",
                map.entries.len()
            )));
        }
        Ok(map)
    }

    fn parse_text_record(&self, line: &str) -> Result<MapEntry, String> {
        let fields: Vec<&str> = line.split('\t').collect();
        let expected = 5 + 2 * self.max_variants;
        if fields.len() != expected {
            return Err(format!("expected {expected} fields, found {}", fields.len()));
        }

        let declared_len: usize = fields[1].parse().map_err(|_| format!("bad length '{}'", fields[1]))?;
        if declared_len != fields[0].len() {
            return Err(format!(
                "sequence has {} bases but length column says {declared_len}",
                fields[0].len()
            ));
        }
        let sequence =
            PackedSequence::encode(fields[0].as_bytes(), self.words_per_tag).map_err(|e| e.to_string())?;
        let chromosome = parse_optional::<i32>(fields[2])?;
        let strand = match fields[3] {
            "+" => Some(Strand::Forward),
            "-" => Some(Strand::Reverse),
            MISSING_TEXT => None,
            other => return Err(format!("bad strand '{other}'")),
        };
        let start = parse_optional::<i32>(fields[4])?;

        let variants = fields[5..]
            .chunks(2)
            .map(|pair| {
                let offset = parse_optional::<u8>(pair[0])?;
                let allele = match pair[1] {
                    MISSING_TEXT => None,
                    text => {
                        let mut chars = text.chars();
                        match (chars.next().and_then(Allele::from_char), chars.next()) {
                            (Some(allele), None) => Some(allele),
                            _ => return Err(format!("bad allele '{text}'")),
                        }
                    }
                };
                match (offset, allele) {
                    (Some(offset), allele) => Ok(Some(VariantSlot { offset, allele })),
                    (None, None) => Ok(None),
                    (None, Some(_)) => Err("allele without offset".to_string()),
                }
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(MapEntry {
            sequence,
            chromosome,
            strand,
            start,
            variants,
        })
    }

    /// Serialise the tab-delimited text layout.
    pub fn write_text<W: Write>(&self, mut writer: W) -> Result<(), MapError> {
        writeln!(
            writer,
            "{}\t{}\t{}",
            self.entries.len(),
            self.words_per_tag,
            self.max_variants
        )?;
        for entry in &self.entries {
            write!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                entry.sequence,
                entry.sequence.len(),
                format_optional(entry.chromosome),
                entry
                    .strand
                    .map(|s| s.as_char().to_string())
                    .unwrap_or_else(|| MISSING_TEXT.to_string()),
                format_optional(entry.start),
            )?;
            for slot in &entry.variants {
                match slot {
                    Some(slot) => write!(
                        writer,
                        "\t{}\t{}",
                        slot.offset,
                        slot.allele
                            .map(|a| a.as_char().to_string())
                            .unwrap_or_else(|| MISSING_TEXT.to_string())
                    )?,
                    None => write!(writer, "\t{MISSING_TEXT}\t{MISSING_TEXT}")?,
                }
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the text layout to `path`.
    pub fn write_text_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MapError> {
        let path = path.as_ref();
        self.write_text(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), tags = self.len(), "wrote text physical map");
        Ok(())
    }
}

fn truncated(err: io::Error) -> MapError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        MapError::Corrupt("file shorter than the map header".into())
    } else {
        MapError::Io(err)
    }
}

fn optional_coordinate(value: i32) -> Option<i32> {
    (value != MISSING_COORDINATE).then_some(value)
}

fn decode_slot(offset: u8, allele: u8) -> Result<Option<VariantSlot>, MapError> {
    let allele = match allele {
        MISSING_CODE => None,
        code => Some(
            Allele::from_code(code)
                .ok_or_else(|| MapError::Corrupt(format!("invalid allele code {code}")))?,
        ),
    };
    match (offset, allele) {
        (MISSING_OFFSET, None) => Ok(None),
        (MISSING_OFFSET, Some(_)) => Err(MapError::Corrupt("allele in an unused slot".into())),
        (offset, allele) => Ok(Some(VariantSlot { offset, allele })),
    }
}

fn parse_optional<T: std::str::FromStr>(field: &str) -> Result<Option<T>, String> {
    if field == MISSING_TEXT {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| format!("bad value '{field}'"))
}

fn format_optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| MISSING_TEXT.to_string())
}
