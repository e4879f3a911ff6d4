//! NumPy `.npy` file I/O
//!
//! Loads `.npy` arrays of boolean, integer or floating point dtype (any byte
//! order, C or Fortran order, format versions 1-3) into `f64` arrays, and
//! writes `f64`/`i64` arrays as version 1.0 little-endian C-order files.
//! Gzip-compressed payloads are detected and decompressed on load; paths
//! ending in `.gz` are compressed on save.

use std::fmt;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{ArrayD, ArrayViewD, IxDyn, ShapeBuilder};

use crate::error::SmoothError;

/// Extension of plain array files
pub const NPY_EXTENSION: &str = ".npy";
/// Extension of gzip-compressed array files
pub const NPY_GZ_EXTENSION: &str = ".npy.gz";

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Element kind of an `.npy` dtype
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtypeKind {
    Bool,
    Int,
    UInt,
    Float,
}

/// Scalar dtype as given by the header's `descr` entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NpyDtype {
    pub kind: DtypeKind,
    /// Bytes per element
    pub size: usize,
    pub big_endian: bool,
}

impl NpyDtype {
    /// Parse a descr string such as `<i8`, `|u1`, `>f4` or `|b1`
    pub fn parse(descr: &str) -> Result<Self, SmoothError> {
        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(|| SmoothError::format("empty dtype descr"))?;
        let big_endian = match order {
            '<' | '|' => false,
            '>' => true,
            '=' => cfg!(target_endian = "big"),
            _ => return Err(SmoothError::format(format!("unknown byte order in dtype '{}'", descr))),
        };

        let kind = match chars.next() {
            Some('b') => DtypeKind::Bool,
            Some('i') => DtypeKind::Int,
            Some('u') => DtypeKind::UInt,
            Some('f') => DtypeKind::Float,
            _ => return Err(SmoothError::format(format!("unsupported dtype '{}'", descr))),
        };

        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| SmoothError::format(format!("invalid item size in dtype '{}'", descr)))?;

        let supported = match kind {
            DtypeKind::Bool => size == 1,
            DtypeKind::Int | DtypeKind::UInt => matches!(size, 1 | 2 | 4 | 8),
            DtypeKind::Float => matches!(size, 4 | 8),
        };
        if !supported {
            return Err(SmoothError::format(format!("unsupported dtype '{}'", descr)));
        }

        Ok(Self { kind, size, big_endian })
    }

    /// Boolean and integer dtypes hold labels
    pub fn is_integral(&self) -> bool {
        self.kind != DtypeKind::Float
    }

    fn decode(&self, raw: &[u8]) -> Vec<f64> {
        let be = self.big_endian;
        match (self.kind, self.size) {
            (DtypeKind::Bool, _) => raw.iter().map(|&b| if b != 0 { 1.0 } else { 0.0 }).collect(),
            (DtypeKind::Int, 1) => raw.iter().map(|&b| b as i8 as f64).collect(),
            (DtypeKind::UInt, 1) => raw.iter().map(|&b| b as f64).collect(),
            (DtypeKind::Int, 2) => decode_chunks::<2>(raw, be, |a| i16::from_le_bytes(a) as f64),
            (DtypeKind::Int, 4) => decode_chunks::<4>(raw, be, |a| i32::from_le_bytes(a) as f64),
            (DtypeKind::Int, _) => decode_chunks::<8>(raw, be, |a| i64::from_le_bytes(a) as f64),
            (DtypeKind::UInt, 2) => decode_chunks::<2>(raw, be, |a| u16::from_le_bytes(a) as f64),
            (DtypeKind::UInt, 4) => decode_chunks::<4>(raw, be, |a| u32::from_le_bytes(a) as f64),
            (DtypeKind::UInt, _) => decode_chunks::<8>(raw, be, |a| u64::from_le_bytes(a) as f64),
            (DtypeKind::Float, 4) => decode_chunks::<4>(raw, be, |a| f32::from_le_bytes(a) as f64),
            (DtypeKind::Float, _) => decode_chunks::<8>(raw, be, f64::from_le_bytes),
        }
    }
}

impl fmt::Display for NpyDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = if self.size == 1 {
            '|'
        } else if self.big_endian {
            '>'
        } else {
            '<'
        };
        let kind = match self.kind {
            DtypeKind::Bool => 'b',
            DtypeKind::Int => 'i',
            DtypeKind::UInt => 'u',
            DtypeKind::Float => 'f',
        };
        write!(f, "{}{}{}", order, kind, self.size)
    }
}

/// Decode fixed-size elements, byte-swapping big-endian input first
fn decode_chunks<const N: usize>(raw: &[u8], big_endian: bool, convert: impl Fn([u8; N]) -> f64) -> Vec<f64> {
    raw.chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            if big_endian {
                bytes.reverse();
            }
            convert(bytes)
        })
        .collect()
}

/// Array loaded from an `.npy` file
pub struct NpyData {
    /// Values converted to f64, in logical (C) order
    pub data: ArrayD<f64>,
    /// Dtype stored in the file
    pub dtype: NpyDtype,
}

/// Element types that can be written to `.npy`
pub trait NpyElement: Copy {
    const DESCR: &'static str;
    fn write_le(self, out: &mut Vec<u8>);
}

impl NpyElement for f64 {
    const DESCR: &'static str = "<f8";
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl NpyElement for i64 {
    const DESCR: &'static str = "<i8";
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

#[derive(Debug)]
struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Text following `'key':` in a header dict literal
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str, SmoothError> {
    let start = [format!("'{}'", key), format!("\"{}\"", key)]
        .iter()
        .find_map(|quoted| text.find(quoted.as_str()).map(|pos| pos + quoted.len()))
        .ok_or_else(|| SmoothError::format(format!("header has no '{}' entry", key)))?;

    let rest = text[start..].trim_start();
    let rest = rest
        .strip_prefix(':')
        .ok_or_else(|| SmoothError::format(format!("malformed '{}' entry", key)))?;
    Ok(rest.trim_start())
}

fn parse_header(text: &str) -> Result<Header, SmoothError> {
    let descr_text = dict_value(text, "descr")?;
    let quote = descr_text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| SmoothError::format("structured dtypes are not supported"))?;
    let descr_end = descr_text[1..]
        .find(quote)
        .ok_or_else(|| SmoothError::format("unterminated descr string"))?;
    let descr = descr_text[1..1 + descr_end].to_string();

    let order_text = dict_value(text, "fortran_order")?;
    let fortran_order = if order_text.starts_with("True") {
        true
    } else if order_text.starts_with("False") {
        false
    } else {
        return Err(SmoothError::format("fortran_order must be True or False"));
    };

    let shape_text = dict_value(text, "shape")?;
    let shape_text = shape_text
        .strip_prefix('(')
        .ok_or_else(|| SmoothError::format("shape must be a tuple"))?;
    let shape_end = shape_text
        .find(')')
        .ok_or_else(|| SmoothError::format("unterminated shape tuple"))?;
    let shape = shape_text[..shape_end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            // numpy may write `3L` on python 2
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| SmoothError::format(format!("invalid shape entry '{}'", s)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Header {
        descr,
        fortran_order,
        shape,
    })
}

/// Load an `.npy` array from bytes
///
/// Gzip-compressed input is detected and decompressed first.
pub fn load_npy(bytes: &[u8]) -> Result<NpyData, SmoothError> {
    if is_gzip(bytes) {
        let mut decompressed = Vec::new();
        GzDecoder::new(Cursor::new(bytes))
            .read_to_end(&mut decompressed)
            .map_err(|e| SmoothError::format(format!("failed to decompress gzipped npy: {}", e)))?;
        return load_npy_uncompressed(&decompressed);
    }
    load_npy_uncompressed(bytes)
}

fn load_npy_uncompressed(bytes: &[u8]) -> Result<NpyData, SmoothError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(SmoothError::format("missing \\x93NUMPY magic"));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(SmoothError::format("file too small for a version 2 header"));
            }
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        _ => return Err(SmoothError::format(format!("unsupported npy format version {}", major))),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(SmoothError::format(format!(
            "header claims {} bytes but file has {}",
            header_len,
            bytes.len() - header_start
        )));
    }

    let header = parse_header(&String::from_utf8_lossy(&bytes[header_start..data_start]))?;
    let dtype = NpyDtype::parse(&header.descr)?;

    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| SmoothError::format(format!("shape {:?} overflows", header.shape)))?;
    let n_bytes = count.checked_mul(dtype.size).ok_or_else(|| {
        SmoothError::format(format!(
            "shape {:?} of {} overflows the addressable size",
            header.shape, dtype
        ))
    })?;
    let raw = &bytes[data_start..];
    if raw.len() < n_bytes {
        return Err(SmoothError::format(format!(
            "data truncated: expected {} bytes for shape {:?}, found {}",
            n_bytes,
            header.shape,
            raw.len()
        )));
    }

    let values = dtype.decode(&raw[..n_bytes]);
    let data = if header.fortran_order {
        ArrayD::from_shape_vec(IxDyn(&header.shape).f(), values)
            .map(|a| a.as_standard_layout().into_owned())
    } else {
        ArrayD::from_shape_vec(IxDyn(&header.shape), values)
    }
    .map_err(|e| SmoothError::format(format!("failed to shape array: {}", e)))?;

    Ok(NpyData { data, dtype })
}

fn shape_tuple(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [n] => format!("({},)", n),
        _ => {
            let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", dims.join(", "))
        }
    }
}

/// Save an array as `.npy` bytes (version 1.0, C order)
pub fn save_npy<T: NpyElement>(array: ArrayViewD<'_, T>) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        T::DESCR,
        shape_tuple(array.shape())
    );

    // magic + version + u16 length + dict + newline, padded to the alignment
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header = format!("{}{}\n", dict, " ".repeat(padding));

    let mut buffer = Vec::with_capacity(unpadded + padding + array.len() * 8);
    buffer.extend_from_slice(MAGIC);
    buffer.extend_from_slice(&[1, 0]);
    buffer.extend_from_slice(&(header.len() as u16).to_le_bytes());
    buffer.extend_from_slice(header.as_bytes());

    for &v in array.iter() {
        v.write_le(&mut buffer);
    }
    buffer
}

/// Save an array as gzipped `.npy` bytes
pub fn save_npy_gz<T: NpyElement>(array: ArrayViewD<'_, T>) -> Result<Vec<u8>, SmoothError> {
    let uncompressed = save_npy(array);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&uncompressed)?;
    Ok(encoder.finish()?)
}

/// Read an `.npy` file from a filesystem path
pub fn read_npy_file(path: &Path) -> Result<NpyData, SmoothError> {
    let bytes = std::fs::read(path)?;
    load_npy(&bytes)
}

/// Save an array to a file; paths ending in `.gz` are gzip compressed
pub fn save_npy_to_file<T: NpyElement>(path: &Path, array: ArrayViewD<'_, T>) -> Result<(), SmoothError> {
    let bytes = if path.to_string_lossy().ends_with(".gz") {
        save_npy_gz(array)?
    } else {
        save_npy(array)
    };
    std::fs::write(path, bytes)?;
    Ok(())
}

/// The array-file extension of `path`, if it has one
fn npy_extension(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_string_lossy();
    [NPY_GZ_EXTENSION, NPY_EXTENSION]
        .into_iter()
        .find(|ext| name.ends_with(ext) && name.len() > ext.len())
}

/// Check that an input file exists and has an array-file extension
pub fn validate_input_path(path: &Path) -> Result<(), SmoothError> {
    if !path.is_file() {
        return Err(SmoothError::invalid_input_file(
            path.display().to_string(),
            "file does not exist",
        ));
    }
    if npy_extension(path).is_none() {
        return Err(SmoothError::invalid_input_file(
            path.display().to_string(),
            format!("should be a {} (or {}) file", NPY_EXTENSION, NPY_GZ_EXTENSION),
        ));
    }
    Ok(())
}

/// Output path for a smoothed microstructure
///
/// `dir/ms.npy` becomes `dir/ms_smoothed.npy`, or `dir/ms_{info}_smoothed.npy`
/// when an info tag is given. The compression extension is kept.
pub fn smoothed_filename(input: &Path, info: Option<&str>) -> Result<PathBuf, SmoothError> {
    let ext = npy_extension(input).ok_or_else(|| {
        SmoothError::invalid_input_file(
            input.display().to_string(),
            format!("should be a {} file", NPY_EXTENSION),
        )
    })?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = &name[..name.len() - ext.len()];

    let additive = info.map(|tag| format!("_{}", tag)).unwrap_or_default();
    Ok(input.with_file_name(format!("{}{}_smoothed{}", stem, additive, ext)))
}
