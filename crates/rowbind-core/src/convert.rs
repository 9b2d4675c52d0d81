//! Raw cell coercion.
//!
//! [`convert_assign`] turns one raw byte cell into one destination value.
//! Destinations are the closed set of [`Target`] variants; pointer-shaped
//! destinations go through [`Indirect`], which installs a default value and
//! recurses.
//!
//! Temporal cells are recognised by length alone:
//!
//! | length | layout | interpretation |
//! |---|---|---|
//! | 19 | `YYYY-MM-DD HH:MM:SS` | local wall clock |
//! | 10 | `YYYY-MM-DD` | local wall clock, midnight |
//! | 8 | `HH:MM:SS` | local wall clock on 0000-01-01 |
//! | 25 | RFC 3339 with numeric offset | absolute instant |
//!
//! Any other length leaves the destination unchanged under
//! [`ParsePolicy::Lenient`].

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use rowbind_error::{BindError, Result};

use crate::config::ParsePolicy;
use crate::record::{Bind, FieldMut};

const LAYOUT_DATETIME: &str = "%Y-%m-%d %H:%M:%S";
const LAYOUT_DATE: &str = "%Y-%m-%d";
const LAYOUT_TIME: &str = "%H:%M:%S";

const LEN_DATETIME: usize = "2006-01-02 15:04:05".len();
const LEN_DATE: usize = "2006-01-02".len();
const LEN_TIME: usize = "15:04:05".len();
const LEN_RFC3339: usize = "2006-01-02T15:04:05Z07:00".len();

/// Types that decode themselves from a raw cell.
pub trait ScanBytes {
    fn scan_bytes(&mut self, raw: &[u8]) -> Result<()>;
}

/// An optional slot that can be filled with a fresh value on demand.
pub trait Indirect {
    /// Install a default value and return a handle to it.
    fn allocate(&mut self) -> FieldMut<'_>;

    /// Type name of the value [`allocate`](Self::allocate) installs.
    fn pointee(&self) -> &'static str;
}

/// A mutable destination the coercion engine can write.
pub enum Target<'a> {
    Bytes(&'a mut Vec<u8>),
    Bool(&'a mut bool),
    Text(&'a mut String),
    I8(&'a mut i8),
    I16(&'a mut i16),
    I32(&'a mut i32),
    I64(&'a mut i64),
    I128(&'a mut i128),
    Isize(&'a mut isize),
    U8(&'a mut u8),
    U16(&'a mut u16),
    U32(&'a mut u32),
    U64(&'a mut u64),
    U128(&'a mut u128),
    Usize(&'a mut usize),
    F32(&'a mut f32),
    F64(&'a mut f64),
    NaiveDateTime(&'a mut NaiveDateTime),
    NaiveDate(&'a mut NaiveDate),
    NaiveTime(&'a mut NaiveTime),
    LocalTime(&'a mut DateTime<Local>),
    UtcTime(&'a mut DateTime<Utc>),
    FixedTime(&'a mut DateTime<FixedOffset>),
    Custom(&'a mut dyn ScanBytes),
    Indirect(&'a mut dyn Indirect),
}

impl Target<'_> {
    /// Short name of the destination kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Bool(_) => "bool",
            Self::Text(_) => "string",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::I128(_) => "i128",
            Self::Isize(_) => "isize",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::U128(_) => "u128",
            Self::Usize(_) => "usize",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::NaiveDateTime(_) => "NaiveDateTime",
            Self::NaiveDate(_) => "NaiveDate",
            Self::NaiveTime(_) => "NaiveTime",
            Self::LocalTime(_) => "DateTime<Local>",
            Self::UtcTime(_) => "DateTime<Utc>",
            Self::FixedTime(_) => "DateTime<FixedOffset>",
            Self::Custom(_) => "custom",
            Self::Indirect(slot) => slot.pointee(),
        }
    }
}

/// Copy `raw` into `dest`, converting as the destination kind requires.
///
/// An empty cell is a no-op. `None` fails with
/// [`BindError::NullDestination`].
pub fn convert_assign(dest: Option<Target<'_>>, raw: &[u8], policy: ParsePolicy) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }
    let Some(dest) = dest else {
        return Err(BindError::NullDestination);
    };
    let text = std::str::from_utf8(raw).ok();
    let target = dest.kind();

    match dest {
        Target::Bytes(d) => {
            d.clear();
            d.extend_from_slice(raw);
            Ok(())
        }
        Target::Bool(d) => store(d, text.and_then(parse_bool), raw, target, policy),
        Target::Custom(d) => d.scan_bytes(raw),
        Target::NaiveDateTime(d) => assign_temporal(d, text, raw, target, policy, Temporal::naive),
        Target::NaiveDate(d) => assign_temporal(d, text, raw, target, policy, |t| {
            t.naive().map(|n| n.date())
        }),
        Target::NaiveTime(d) => assign_temporal(d, text, raw, target, policy, |t| {
            t.naive().map(|n| n.time())
        }),
        Target::LocalTime(d) => assign_temporal(d, text, raw, target, policy, Temporal::local),
        Target::UtcTime(d) => assign_temporal(d, text, raw, target, policy, |t| {
            t.fixed().map(|f| f.with_timezone(&Utc))
        }),
        Target::FixedTime(d) => assign_temporal(d, text, raw, target, policy, Temporal::fixed),
        Target::Indirect(slot) => match slot.allocate() {
            FieldMut::Scalar(inner) => convert_assign(Some(inner), raw, policy),
            FieldMut::Record(record) => Err(BindError::unsupported_conversion(
                raw,
                record.type_name(),
            )),
        },
        Target::I8(d) => store(d, text.and_then(parse_signed), raw, target, policy),
        Target::I16(d) => store(d, text.and_then(parse_signed), raw, target, policy),
        Target::I32(d) => store(d, text.and_then(parse_signed), raw, target, policy),
        Target::I64(d) => store(d, text.and_then(parse_signed), raw, target, policy),
        Target::I128(d) => store(d, text.and_then(parse_signed), raw, target, policy),
        Target::Isize(d) => store(d, text.and_then(parse_signed), raw, target, policy),
        Target::U8(d) => store(d, text.and_then(parse_unsigned), raw, target, policy),
        Target::U16(d) => store(d, text.and_then(parse_unsigned), raw, target, policy),
        Target::U32(d) => store(d, text.and_then(parse_unsigned), raw, target, policy),
        Target::U64(d) => store(d, text.and_then(parse_unsigned), raw, target, policy),
        Target::U128(d) => store(d, text.and_then(parse_unsigned), raw, target, policy),
        Target::Usize(d) => store(d, text.and_then(parse_unsigned), raw, target, policy),
        Target::F32(d) => store(d, text.and_then(parse_f32), raw, target, policy),
        Target::F64(d) => store(d, text.and_then(parse_f64), raw, target, policy),
        Target::Text(d) => {
            let value = match (text, policy) {
                (Some(s), _) => s.to_owned(),
                (None, ParsePolicy::Lenient) => String::from_utf8_lossy(raw).into_owned(),
                (None, ParsePolicy::Strict) => {
                    return Err(BindError::unsupported_conversion(raw, target));
                }
            };
            *d = value;
            Ok(())
        }
    }
}

/// Coerce `raw` into any bindable value.
///
/// Records are not coercible from a single cell.
pub fn assign<B: Bind + ?Sized>(dest: &mut B, raw: &[u8], policy: ParsePolicy) -> Result<()> {
    if raw.is_empty() {
        return Ok(());
    }
    match dest.bind_mut() {
        FieldMut::Scalar(target) => convert_assign(Some(target), raw, policy),
        FieldMut::Record(record) => Err(BindError::unsupported_conversion(
            raw,
            record.type_name(),
        )),
    }
}

fn store<T: Default>(
    dest: &mut T,
    parsed: Option<T>,
    raw: &[u8],
    target: &'static str,
    policy: ParsePolicy,
) -> Result<()> {
    match (parsed, policy) {
        (Some(value), _) => {
            *dest = value;
            Ok(())
        }
        (None, ParsePolicy::Lenient) => {
            *dest = T::default();
            Ok(())
        }
        (None, ParsePolicy::Strict) => Err(BindError::unsupported_conversion(raw, target)),
    }
}

// ---------------------------------------------------------------------------
// Scalar parsers
// ---------------------------------------------------------------------------

/// Boolean literal: `1 t T TRUE true True 0 f F FALSE false False`, plus any
/// casing of `true`/`false`.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" => Some(true),
        "0" | "f" | "F" => Some(false),
        _ if s.eq_ignore_ascii_case("true") => Some(true),
        _ if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Split a base prefix off an unsigned integer literal.
///
/// `0x`, `0b` and `0o` (any case) select hex, binary and octal; a bare
/// leading `0` followed by more digits selects octal.
fn split_radix(s: &str) -> (u32, &str, bool) {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'0' {
        match bytes[1] {
            b'x' | b'X' => return (16, &s[2..], true),
            b'b' | b'B' => return (2, &s[2..], true),
            b'o' | b'O' => return (8, &s[2..], true),
            _ => return (8, &s[1..], true),
        }
    }
    (10, s, false)
}

/// Magnitude of an unsigned integer literal with automatic base detection.
///
/// Underscores may separate digits, or follow a base prefix.
fn parse_magnitude(s: &str) -> Option<u128> {
    let (radix, digits, prefixed) = split_radix(s);
    if digits.is_empty()
        || digits.ends_with('_')
        || digits.contains("__")
        || (!prefixed && digits.starts_with('_'))
    {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() || cleaned.starts_with(['+', '-']) {
        return None;
    }
    u128::from_str_radix(&cleaned, radix).ok()
}

/// Signed integer literal, range-checked to `T`.
pub fn parse_signed<T: TryFrom<i128>>(s: &str) -> Option<T> {
    let (negative, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = parse_magnitude(body)?;
    let value = if negative {
        if magnitude == i128::MIN.unsigned_abs() {
            i128::MIN
        } else {
            -i128::try_from(magnitude).ok()?
        }
    } else {
        i128::try_from(magnitude).ok()?
    };
    T::try_from(value).ok()
}

/// Unsigned integer literal, range-checked to `T`. Signs are rejected.
pub fn parse_unsigned<T: TryFrom<u128>>(s: &str) -> Option<T> {
    T::try_from(parse_magnitude(s)?).ok()
}

/// Decimal or hexadecimal (`0x1.8p3`) float literal.
pub fn parse_f64(s: &str) -> Option<f64> {
    s.parse().ok().or_else(|| parse_hex_float(s))
}

/// [`parse_f64`] at single precision. Hex literals outside the `f32` range
/// are rejected.
pub fn parse_f32(s: &str) -> Option<f32> {
    if let Ok(value) = s.parse() {
        return Some(value);
    }
    #[allow(clippy::cast_possible_truncation)]
    let narrowed = parse_hex_float(s)? as f32;
    narrowed.is_finite().then_some(narrowed)
}

/// Hex float: optional sign, `0x` prefix, hex mantissa with an optional
/// fraction, then a mandatory binary exponent `p[+-]N`.
fn parse_hex_float(s: &str) -> Option<f64> {
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let body = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))?;
    let (mantissa, exponent) = body.split_once(['p', 'P'])?;
    let exponent: i32 = exponent.parse().ok()?;
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut value = 0.0_f64;
    for ch in whole.chars().chain(fraction.chars()) {
        value = value * 16.0 + f64::from(ch.to_digit(16)?);
    }
    let shift = i32::try_from(fraction.len()).ok()?.checked_mul(4)?;
    let value = value * 2.0_f64.powi(exponent.checked_sub(shift)?);
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

// ---------------------------------------------------------------------------
// Temporal parsing
// ---------------------------------------------------------------------------

/// A parsed temporal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    /// Wall-clock value to be read in the local time zone.
    Wall(NaiveDateTime),
    /// Instant with an explicit offset.
    Absolute(DateTime<FixedOffset>),
}

impl Temporal {
    /// Parse by length. `None` for unknown lengths and malformed input alike;
    /// use [`Temporal::recognised_len`] to tell them apart.
    pub fn parse(s: &str) -> Option<Self> {
        match s.len() {
            LEN_DATETIME => NaiveDateTime::parse_from_str(s, LAYOUT_DATETIME)
                .ok()
                .map(Self::Wall),
            LEN_DATE => NaiveDate::parse_from_str(s, LAYOUT_DATE)
                .ok()
                .map(|d| Self::Wall(d.and_time(NaiveTime::MIN))),
            LEN_TIME => {
                let time = NaiveTime::parse_from_str(s, LAYOUT_TIME).ok()?;
                NaiveDate::from_ymd_opt(0, 1, 1).map(|d| Self::Wall(d.and_time(time)))
            }
            LEN_RFC3339 => DateTime::parse_from_rfc3339(s).ok().map(Self::Absolute),
            _ => None,
        }
    }

    pub const fn recognised_len(len: usize) -> bool {
        matches!(len, LEN_DATETIME | LEN_DATE | LEN_TIME | LEN_RFC3339)
    }

    /// Wall-clock reading; absolute values keep the clock of their own offset.
    pub fn naive(self) -> Option<NaiveDateTime> {
        Some(match self {
            Self::Wall(naive) => naive,
            Self::Absolute(fixed) => fixed.naive_local(),
        })
    }

    pub fn local(self) -> Option<DateTime<Local>> {
        match self {
            Self::Wall(naive) => Local.from_local_datetime(&naive).earliest(),
            Self::Absolute(fixed) => Some(fixed.with_timezone(&Local)),
        }
    }

    pub fn fixed(self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Wall(_) => self.local().map(|local| local.fixed_offset()),
            Self::Absolute(fixed) => Some(fixed),
        }
    }
}

fn assign_temporal<T: Default>(
    dest: &mut T,
    text: Option<&str>,
    raw: &[u8],
    target: &'static str,
    policy: ParsePolicy,
    project: impl FnOnce(Temporal) -> Option<T>,
) -> Result<()> {
    if !Temporal::recognised_len(raw.len()) {
        return match policy {
            ParsePolicy::Lenient => Ok(()),
            ParsePolicy::Strict => Err(BindError::unsupported_conversion(raw, target)),
        };
    }
    let parsed = text.and_then(Temporal::parse).and_then(project);
    store(dest, parsed, raw, target, policy)
}

// ---------------------------------------------------------------------------
// Built-in scalar bindings
// ---------------------------------------------------------------------------

macro_rules! bind_target {
    ($($ty:ty => $variant:ident),+ $(,)?) => {$(
        impl Bind for $ty {
            fn bind_mut(&mut self) -> FieldMut<'_> {
                FieldMut::Scalar(Target::$variant(self))
            }
        }
    )+};
}

bind_target! {
    Vec<u8> => Bytes,
    bool => Bool,
    String => Text,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    i128 => I128,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    u128 => U128,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    NaiveDateTime => NaiveDateTime,
    NaiveDate => NaiveDate,
    NaiveTime => NaiveTime,
    DateTime<Local> => LocalTime,
    DateTime<Utc> => UtcTime,
    DateTime<FixedOffset> => FixedTime,
}
