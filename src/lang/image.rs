/// image.rs
///
/// The binary container for compiled programs. Layout:
///
/// ```text
/// u8   address size in bytes (4 or 8)
/// u8   byte order (0: little endian, 1: big endian)
/// u16  reserved
/// word number count, word string count, word function count
/// number count * f64
/// string count * { word length, bytes }
/// function count * { u16 var_count, u16 arg_count, u16 stack_high,
///                    u16 flags, word code_size, code }
/// ```
///
/// Words are as wide as the address size. Everything in the tables follows
/// the declared byte order, the operands inside the code blobs do not (they
/// are always little endian). An image is only loaded by a host with the same
/// address size.

use derive_more::Display;

use super::{FunctionDef, Program};

pub const IMAGE_SUFFIX: &str = "pdc";

/// Width of a word in images produced by this host.
pub const HOST_ADDR_SIZE: u8 = core::mem::size_of::<usize>() as u8;

const FLAG_CLOSURE: u16 = 0x0001;
const HEADER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") { ByteOrder::Big } else { ByteOrder::Little }
    }

    fn marker(&self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub addr_size: u8,
    pub byte_order: ByteOrder,
}

impl Default for ImageHeader {
    fn default() -> Self {
        Self{ addr_size: HOST_ADDR_SIZE, byte_order: ByteOrder::native() }
    }
}

/// Structural problems with an image. An image with any of these is rejected
/// as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ImageError {
    #[display(fmt = "image truncated at offset {}", _0)]
    Truncated(usize),
    #[display(fmt = "unsupported address size {}", _0)]
    AddressSize(u8),
    #[display(fmt = "unknown byte order marker {}", _0)]
    ByteOrder(u8),
    #[display(fmt = "table count {} exceeds the image size", _0)]
    CountOverflow(u64),
    #[display(fmt = "{} unexpected bytes after the function table", _0)]
    TrailingBytes(usize),
    #[display(fmt = "string constant {} is not valid UTF-8 or contains a NUL", _0)]
    InvalidString(usize),
    #[display(fmt = "value {} does not fit in an image word", _0)]
    ValueTooLarge(u64),
}

impl ImageError {
    pub fn code(&self) -> i32 {
        match self {
            ImageError::Truncated(_) => -10,
            ImageError::AddressSize(_) => -11,
            ImageError::ByteOrder(_) => -12,
            ImageError::CountOverflow(_) => -13,
            ImageError::TrailingBytes(_) => -14,
            ImageError::InvalidString(_) => -15,
            ImageError::ValueTooLarge(_) => -16,
        }
    }
}

// -----------------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------------

struct Writer {
    header: ImageHeader,
    buffer: Vec<u8>,
}

impl Writer {
    fn u16(&mut self, value: u16) {
        let bytes = match self.header.byte_order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        self.buffer.extend_from_slice(&bytes);
    }

    fn word(&mut self, value: usize) -> Result<(), ImageError> {
        let value = value as u64;
        match self.header.addr_size {
            4 => {
                if value > u32::MAX as u64 {
                    return Err(ImageError::ValueTooLarge(value));
                }
                let bytes = match self.header.byte_order {
                    ByteOrder::Little => (value as u32).to_le_bytes(),
                    ByteOrder::Big => (value as u32).to_be_bytes(),
                };
                self.buffer.extend_from_slice(&bytes);
            },
            8 => {
                let bytes = match self.header.byte_order {
                    ByteOrder::Little => value.to_le_bytes(),
                    ByteOrder::Big => value.to_be_bytes(),
                };
                self.buffer.extend_from_slice(&bytes);
            },
            other => return Err(ImageError::AddressSize(other)),
        }
        Ok(())
    }

    fn f64(&mut self, value: f64) {
        let bytes = match self.header.byte_order {
            ByteOrder::Little => value.to_bits().to_le_bytes(),
            ByteOrder::Big => value.to_bits().to_be_bytes(),
        };
        self.buffer.extend_from_slice(&bytes);
    }
}

/// Serializes a program. Any address size may be requested, even though only
/// images matching the host's address size can be loaded here.
pub fn write_image(program: &Program, header: ImageHeader) -> Result<Vec<u8>, ImageError> {
    let mut writer = Writer{ header, buffer: Vec::with_capacity(program.footprint() + 32) };
    writer.buffer.push(header.addr_size);
    writer.buffer.push(header.byte_order.marker());
    writer.u16(0);

    writer.word(program.numbers.len())?;
    writer.word(program.strings.len())?;
    writer.word(program.functions.len())?;

    for number in program.numbers.iter() {
        writer.f64(*number);
    }
    for (string_idx, string) in program.strings.iter().enumerate() {
        if string.as_bytes().contains(&0) {
            return Err(ImageError::InvalidString(string_idx));
        }
        writer.word(string.len())?;
        writer.buffer.extend_from_slice(string.as_bytes());
    }
    for function in program.functions.iter() {
        writer.u16(function.var_count);
        writer.u16(function.arg_count);
        writer.u16(function.stack_high);
        writer.u16(if function.is_closure { FLAG_CLOSURE } else { 0 });
        writer.word(function.code.len())?;
        writer.buffer.extend_from_slice(&function.code);
    }

    Ok(writer.buffer)
}

// -----------------------------------------------------------------------------
// Loading
// -----------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    header: ImageHeader,
}

impl<'a> Reader<'a> {
    #[inline]
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ImageError> {
        if len > self.remaining() {
            return Err(ImageError::Truncated(self.data.len()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16, ImageError> {
        let bytes = self.bytes(2)?;
        let bytes = [bytes[0], bytes[1]];
        Ok(match self.header.byte_order {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        })
    }

    fn word(&mut self) -> Result<u64, ImageError> {
        let order = self.header.byte_order;
        if self.header.addr_size == 4 {
            let bytes = self.bytes(4)?;
            let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
            Ok(match order {
                ByteOrder::Little => u32::from_le_bytes(bytes),
                ByteOrder::Big => u32::from_be_bytes(bytes),
            } as u64)
        } else {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(self.bytes(8)?);
            Ok(match order {
                ByteOrder::Little => u64::from_le_bytes(bytes),
                ByteOrder::Big => u64::from_be_bytes(bytes),
            })
        }
    }

    fn size(&mut self) -> Result<usize, ImageError> {
        let value = self.word()?;
        if value > usize::MAX as u64 {
            return Err(ImageError::ValueTooLarge(value));
        }
        Ok(value as usize)
    }

    /// Checks that a table of `count` entries, each at least `min_entry_size`
    /// bytes, could fit in the rest of the image.
    fn check_count(&self, count: usize, min_entry_size: usize) -> Result<(), ImageError> {
        match count.checked_mul(min_entry_size) {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(ImageError::CountOverflow(count as u64)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FunctionEntry {
    var_count: u16,
    arg_count: u16,
    stack_high: u16,
    flags: u16,
    code_at: usize,
    code_len: usize,
}

/// A function as stored in an image, borrowing its code from the image.
#[derive(Debug, Clone, Copy)]
pub struct FunctionView<'a> {
    pub var_count: u16,
    pub arg_count: u16,
    pub stack_high: u16,
    pub is_closure: bool,
    pub code: &'a [u8],
}

/// A validated, read-only view on an image buffer. Only offset tables are
/// built while loading, the constants and code are read from the buffer.
pub struct Image<'a> {
    data: &'a [u8],
    header: ImageHeader,
    numbers_at: usize,
    number_count: usize,
    strings: Vec<(usize, usize)>,
    functions: Vec<FunctionEntry>,
}

impl<'a> Image<'a> {
    pub fn load(data: &'a [u8]) -> Result<Image<'a>, ImageError> {
        if data.len() < HEADER_SIZE {
            return Err(ImageError::Truncated(data.len()));
        }

        let addr_size = data[0];
        if (addr_size != 4 && addr_size != 8) || addr_size != HOST_ADDR_SIZE {
            return Err(ImageError::AddressSize(addr_size));
        }
        let byte_order = match data[1] {
            0 => ByteOrder::Little,
            1 => ByteOrder::Big,
            other => return Err(ImageError::ByteOrder(other)),
        };
        let header = ImageHeader{ addr_size, byte_order };
        let word = addr_size as usize;

        let mut reader = Reader{ data, pos: HEADER_SIZE, header };
        let number_count = reader.size()?;
        let string_count = reader.size()?;
        let function_count = reader.size()?;

        // Numbers
        reader.check_count(number_count, 8)?;
        let numbers_at = reader.pos;
        reader.pos += number_count * 8;

        // Strings
        reader.check_count(string_count, word)?;
        let mut strings = Vec::with_capacity(string_count);
        for string_idx in 0..string_count {
            let len = reader.size()?;
            let at = reader.pos;
            let bytes = reader.bytes(len)?;
            if bytes.contains(&0) || std::str::from_utf8(bytes).is_err() {
                return Err(ImageError::InvalidString(string_idx));
            }
            strings.push((at, len));
        }

        // Functions
        reader.check_count(function_count, 8 + word)?;
        let mut functions = Vec::with_capacity(function_count);
        for _ in 0..function_count {
            let var_count = reader.u16()?;
            let arg_count = reader.u16()?;
            let stack_high = reader.u16()?;
            let flags = reader.u16()?;
            let code_len = reader.size()?;
            let code_at = reader.pos;
            reader.bytes(code_len)?;
            functions.push(FunctionEntry{ var_count, arg_count, stack_high, flags, code_at, code_len });
        }

        if reader.remaining() != 0 {
            return Err(ImageError::TrailingBytes(reader.remaining()));
        }

        Ok(Image{ data, header, numbers_at, number_count, strings, functions })
    }

    pub fn header(&self) -> ImageHeader {
        self.header
    }

    pub fn number_count(&self) -> usize {
        self.number_count
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        if index >= self.number_count {
            return None;
        }
        let at = self.numbers_at + index * 8;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.data[at..at + 8]);
        let bits = match self.header.byte_order {
            ByteOrder::Little => u64::from_le_bytes(bytes),
            ByteOrder::Big => u64::from_be_bytes(bytes),
        };
        Some(f64::from_bits(bits))
    }

    pub fn string(&self, index: usize) -> Option<&'a str> {
        let (at, len) = *self.strings.get(index)?;
        std::str::from_utf8(&self.data[at..at + len]).ok()
    }

    pub fn function(&self, index: usize) -> Option<FunctionView<'a>> {
        let entry = self.functions.get(index)?;
        Some(FunctionView{
            var_count: entry.var_count,
            arg_count: entry.arg_count,
            stack_high: entry.stack_high,
            is_closure: entry.flags & FLAG_CLOSURE != 0,
            code: &self.data[entry.code_at..entry.code_at + entry.code_len],
        })
    }
}

impl Program {
    /// Copies the contents of a loaded image into an owned program.
    pub fn from_image(image: &Image) -> Program {
        let numbers = (0..image.number_count()).filter_map(|i| image.number(i)).collect();
        let strings = (0..image.string_count()).filter_map(|i| image.string(i)).map(Box::from).collect();
        let functions = (0..image.function_count())
            .filter_map(|i| image.function(i))
            .map(|f| FunctionDef{
                var_count: f.var_count,
                arg_count: f.arg_count,
                stack_high: f.stack_high,
                is_closure: f.is_closure,
                code: f.code.to_vec(),
            })
            .collect();

        Program{ numbers, strings, functions }
    }
}
