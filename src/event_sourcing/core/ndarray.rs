use super::errors::TranscodingError;

// ============================================================================
// NumericArray - 1-D numeric arrays with a binary wire form
// ============================================================================
//
// The binary form is the `.npy` v1.0 container: magic, version, a Python
// dict literal describing dtype and shape, then raw item bytes. On the JSON
// wire the bytes are mapped one-to-one onto Latin-1 characters and the
// resulting string is JSON-encoded once more into a single escaped string.
//
// ============================================================================

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGNMENT: usize = 64;

/// A one-dimensional array of a single numeric dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! extend_le {
    ($values:expr, $out:expr) => {
        for value in $values {
            $out.extend_from_slice(&value.to_le_bytes());
        }
    };
}

macro_rules! read_items {
    ($ty:ty, $data:expr, $big_endian:expr) => {{
        const SIZE: usize = std::mem::size_of::<$ty>();
        $data
            .chunks_exact(SIZE)
            .map(|chunk| {
                let mut buf = [0u8; SIZE];
                buf.copy_from_slice(chunk);
                if $big_endian {
                    <$ty>::from_be_bytes(buf)
                } else {
                    <$ty>::from_le_bytes(buf)
                }
            })
            .collect::<Vec<$ty>>()
    }};
}

impl NumericArray {
    /// NumPy-style dtype name, e.g. `float64`.
    pub fn dtype(&self) -> &'static str {
        match self {
            NumericArray::I8(_) => "int8",
            NumericArray::I16(_) => "int16",
            NumericArray::I32(_) => "int32",
            NumericArray::I64(_) => "int64",
            NumericArray::U8(_) => "uint8",
            NumericArray::U16(_) => "uint16",
            NumericArray::U32(_) => "uint32",
            NumericArray::U64(_) => "uint64",
            NumericArray::F32(_) => "float32",
            NumericArray::F64(_) => "float64",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NumericArray::I8(v) => v.len(),
            NumericArray::I16(v) => v.len(),
            NumericArray::I32(v) => v.len(),
            NumericArray::I64(v) => v.len(),
            NumericArray::U8(v) => v.len(),
            NumericArray::U16(v) => v.len(),
            NumericArray::U32(v) => v.len(),
            NumericArray::U64(v) => v.len(),
            NumericArray::F32(v) => v.len(),
            NumericArray::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn descr(&self) -> &'static str {
        match self {
            NumericArray::I8(_) => "|i1",
            NumericArray::I16(_) => "<i2",
            NumericArray::I32(_) => "<i4",
            NumericArray::I64(_) => "<i8",
            NumericArray::U8(_) => "|u1",
            NumericArray::U16(_) => "<u2",
            NumericArray::U32(_) => "<u4",
            NumericArray::U64(_) => "<u8",
            NumericArray::F32(_) => "<f4",
            NumericArray::F64(_) => "<f8",
        }
    }

    /// Serialize into the `.npy` v1.0 binary container.
    pub fn to_npy(&self) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': ({},), }}",
            self.descr(),
            self.len()
        );
        // magic + version (2) + header length (2) + header + trailing newline
        let unpadded = MAGIC.len() + 4 + header.len() + 1;
        let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
        header.extend(std::iter::repeat(' ').take(padding));
        header.push('\n');

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + self.len() * 8);
        out.extend_from_slice(MAGIC);
        out.push(1);
        out.push(0);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());

        match self {
            NumericArray::I8(v) => extend_le!(v, out),
            NumericArray::I16(v) => extend_le!(v, out),
            NumericArray::I32(v) => extend_le!(v, out),
            NumericArray::I64(v) => extend_le!(v, out),
            NumericArray::U8(v) => out.extend_from_slice(v),
            NumericArray::U16(v) => extend_le!(v, out),
            NumericArray::U32(v) => extend_le!(v, out),
            NumericArray::U64(v) => extend_le!(v, out),
            NumericArray::F32(v) => extend_le!(v, out),
            NumericArray::F64(v) => extend_le!(v, out),
        }

        out
    }

    /// Parse a `.npy` container holding a 1-D array.
    pub fn from_npy(bytes: &[u8]) -> Result<Self, TranscodingError> {
        if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
            return Err(npy_error("missing .npy magic"));
        }

        let major = bytes[MAGIC.len()];
        let (header_len, header_start) = match major {
            1 => {
                let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
                (len, 10)
            }
            2 | 3 => {
                if bytes.len() < 12 {
                    return Err(npy_error("truncated header length"));
                }
                let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
                (len, 12)
            }
            other => return Err(npy_error(&format!("unsupported format version {}", other))),
        };

        let data_start = header_start + header_len;
        if bytes.len() < data_start {
            return Err(npy_error("truncated header"));
        }
        let header = std::str::from_utf8(&bytes[header_start..data_start])
            .map_err(|_| npy_error("header is not text"))?;

        let descr = quoted_field(header, "descr")?;
        let shape = shape_field(header)?;
        if shape.len() != 1 {
            return Err(npy_error(&format!("expected a 1-D array, found {} dimensions", shape.len())));
        }
        let count = shape[0];

        let mut chars = descr.chars();
        let big_endian = match chars.next() {
            Some('<') | Some('|') | Some('=') => false,
            Some('>') => true,
            _ => return Err(npy_error(&format!("unsupported descr '{}'", descr))),
        };
        let kind = chars.next().ok_or_else(|| npy_error("empty descr"))?;
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| npy_error(&format!("unsupported descr '{}'", descr)))?;

        let data = &bytes[data_start..];
        let expected = count
            .checked_mul(size)
            .ok_or_else(|| npy_error("array too large"))?;
        if data.len() != expected {
            return Err(npy_error(&format!(
                "expected {} data bytes, found {}",
                expected,
                data.len()
            )));
        }

        let array = match (kind, size) {
            ('i', 1) => NumericArray::I8(data.iter().map(|b| *b as i8).collect()),
            ('i', 2) => NumericArray::I16(read_items!(i16, data, big_endian)),
            ('i', 4) => NumericArray::I32(read_items!(i32, data, big_endian)),
            ('i', 8) => NumericArray::I64(read_items!(i64, data, big_endian)),
            ('u', 1) => NumericArray::U8(data.to_vec()),
            ('u', 2) => NumericArray::U16(read_items!(u16, data, big_endian)),
            ('u', 4) => NumericArray::U32(read_items!(u32, data, big_endian)),
            ('u', 8) => NumericArray::U64(read_items!(u64, data, big_endian)),
            ('f', 4) => NumericArray::F32(read_items!(f32, data, big_endian)),
            ('f', 8) => NumericArray::F64(read_items!(f64, data, big_endian)),
            _ => return Err(npy_error(&format!("unsupported dtype '{}'", descr))),
        };

        Ok(array)
    }

    /// Latin-1 text of the `.npy` bytes, JSON-encoded into one escaped string.
    pub fn to_wire(&self) -> Result<String, TranscodingError> {
        let latin1: String = self.to_npy().iter().map(|b| char::from(*b)).collect();
        serde_json::to_string(&latin1).map_err(|e| TranscodingError::Encoding(e.to_string()))
    }

    pub fn from_wire(wire: &str) -> Result<Self, TranscodingError> {
        let latin1: String = serde_json::from_str(wire)?;
        let bytes = latin1
            .chars()
            .map(|c| u8::try_from(u32::from(c)).map_err(|_| npy_error("payload is not Latin-1")))
            .collect::<Result<Vec<u8>, _>>()?;
        Self::from_npy(&bytes)
    }
}

fn npy_error(reason: &str) -> TranscodingError {
    TranscodingError::Decoding(format!("invalid ndarray payload: {}", reason))
}

/// Text following `'<key>':` in the header dict.
fn field_tail<'a>(header: &'a str, key: &str) -> Result<&'a str, TranscodingError> {
    let marker = format!("'{}':", key);
    let start = header
        .find(&marker)
        .ok_or_else(|| npy_error(&format!("header has no '{}'", key)))?;
    Ok(header[start + marker.len()..].trim_start())
}

fn quoted_field<'a>(header: &'a str, key: &str) -> Result<&'a str, TranscodingError> {
    let tail = field_tail(header, key)?;
    let rest = tail
        .strip_prefix('\'')
        .ok_or_else(|| npy_error(&format!("'{}' is not a string", key)))?;
    let end = rest
        .find('\'')
        .ok_or_else(|| npy_error(&format!("unterminated '{}'", key)))?;
    Ok(&rest[..end])
}

fn shape_field(header: &str) -> Result<Vec<usize>, TranscodingError> {
    let tail = field_tail(header, "shape")?;
    let rest = tail
        .strip_prefix('(')
        .ok_or_else(|| npy_error("'shape' is not a tuple"))?;
    let end = rest.find(')').ok_or_else(|| npy_error("unterminated 'shape'"))?;

    rest[..end]
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| npy_error(&format!("invalid dimension '{}'", dim)))
        })
        .collect()
}
