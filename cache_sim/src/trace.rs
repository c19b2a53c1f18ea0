use std::{fmt, io::Read};

use nom::{
    bytes::complete::tag,
    character::complete::{char, hex_digit1, i32, satisfy, space0},
    combinator::{all_consuming, map_res, opt},
    IResult,
};
use num_enum::FromPrimitive;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("trace source is unavailable")]
    Unavailable(#[from] std::io::Error),
    #[error("malformed trace record at line {line_no}: `{line}`")]
    Malformed { line_no: usize, line: String },
}

/// operation character of a trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Op {
    Load = b'L',
    Store = b'S',
    Modify = b'M',
    /// anything else, e.g. instruction fetches (`I`). never reaches the cache.
    #[num_enum(catch_all)]
    Other(u8),
}

impl Op {
    /// op characters beyond a single byte become `Other(b'?')`.
    pub fn from_char(c: char) -> Self {
        u8::try_from(c).map_or(Op::Other(b'?'), Op::from)
    }

    pub fn as_char(self) -> char {
        match self {
            Op::Load => 'L',
            Op::Store => 'S',
            Op::Modify => 'M',
            Op::Other(c) => c as char,
        }
    }

    /// number of cache accesses this operation performs.
    pub fn access_count(self) -> usize {
        match self {
            Op::Load | Op::Store => 1,
            Op::Modify => 2,
            Op::Other(_) => 0,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub op: Op,
    pub addr: u64,
    /// bytes touched. accesses straddling two blocks are not modelled
    pub size: i32,
}

impl TraceRecord {
    pub fn new(op: Op, addr: u64, size: i32) -> Self {
        Self { op, addr, size }
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:x},{}", self.op, self.addr, self.size)
    }
}

/// records of a trace file in file order.
#[derive(Debug, Default)]
pub struct Trace {
    records: Vec<TraceRecord>,
}

impl std::ops::Deref for Trace {
    type Target = [TraceRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl IntoIterator for Trace {
    type Item = TraceRecord;

    type IntoIter = <Vec<TraceRecord> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl Trace {
    /// parses a whole trace. blank lines are ignored, the first malformed line is an error.
    pub fn parse(trace_str: &str) -> Result<Self, TraceError> {
        Self::parse_lines(trace_str.lines().map(Ok))
    }

    /// reads the whole source. only I/O failures are `Unavailable`, bad bytes are `Malformed`.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, TraceError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let lines = buf.split(|&b| b == b'\n').map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            std::str::from_utf8(line).map_err(|_| String::from_utf8_lossy(line).into_owned())
        });
        Self::parse_lines(lines)
    }

    fn parse_lines<'a>(
        lines: impl Iterator<Item = Result<&'a str, String>>,
    ) -> Result<Self, TraceError> {
        let mut records = Vec::new();
        for (index, line) in lines.enumerate() {
            let malformed = |line: String| TraceError::Malformed {
                line_no: index + 1,
                line,
            };
            let line = line.map_err(malformed)?;
            if line.trim().is_empty() {
                continue;
            }
            let (_, record) =
                all_consuming(read_record)(line).map_err(|_| malformed(line.to_string()))?;
            records.push(record);
        }
        log::info!("finished parsing trace. # of records: {}", records.len());
        Ok(Self { records })
    }
}

fn read_op(input: &str) -> IResult<&str, Op> {
    let (input, c) = satisfy(|c: char| !c.is_whitespace())(input)?;
    Ok((input, Op::from_char(c)))
}

fn read_addr(input: &str) -> IResult<&str, u64> {
    let (input, _) = opt(tag("0x"))(input)?;
    map_res(hex_digit1, |h| u64::from_str_radix(h, 16))(input)
}

/// `[ws] op [ws] addr,size [ws]`, as loose as `scanf(" %c %llx,%d")`
fn read_record(input: &str) -> IResult<&str, TraceRecord> {
    let (input, _) = space0(input)?;
    let (input, op) = read_op(input)?;
    let (input, _) = space0(input)?;
    let (input, addr) = read_addr(input)?;
    let (input, _) = char(',')(input)?;
    let (input, size) = i32(input)?;
    let (input, _) = space0(input)?;
    Ok((input, TraceRecord { op, addr, size }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_record() {
        let (_, r) = read_record(" L 10,1").unwrap();
        assert_eq!(TraceRecord::new(Op::Load, 0x10, 1), r);
        let (_, r) = read_record(" M 0421c7f0,4").unwrap();
        assert_eq!(TraceRecord::new(Op::Modify, 0x0421_c7f0, 4), r);
        let (_, r) = read_record("S 0x7ff000388,8  ").unwrap();
        assert_eq!(TraceRecord::new(Op::Store, 0x7_ff00_0388, 8), r);
        let (_, r) = read_record("I  0400d7d4,8").unwrap();
        assert_eq!(TraceRecord::new(Op::Other(b'I'), 0x0400_d7d4, 8), r);
    }
    #[test]
    fn test_read_record_loose_forms() {
        let (_, r) = read_record("L10,1").unwrap();
        assert_eq!(TraceRecord::new(Op::Load, 0x10, 1), r);
        let (_, r) = read_record(" L 10,-1").unwrap();
        assert_eq!(TraceRecord::new(Op::Load, 0x10, -1), r);
        let (_, r) = read_record("é 10,1").unwrap();
        assert_eq!(TraceRecord::new(Op::Other(0xe9), 0x10, 1), r);
        assert_eq!('é', r.op.as_char());
        let (_, r) = read_record("\u{2192} 10,1").unwrap();
        assert_eq!(Op::Other(b'?'), r.op);
    }
    #[test]
    fn test_op() {
        assert_eq!(Op::Load, Op::from(b'L'));
        assert_eq!(Op::Store, Op::from(b'S'));
        assert_eq!(Op::Modify, Op::from(b'M'));
        assert_eq!(Op::Other(b'x'), Op::from(b'x'));
        assert_eq!(2, Op::Modify.access_count());
        assert_eq!(0, Op::Other(b'I').access_count());
    }
    #[test]
    fn test_trace_parse() {
        let trace_str = " L 10,1
 M 20,1

 L 22,1
 S 18,1
I  0400d7d4,8
 L 110,1
";
        let t = Trace::parse(trace_str).unwrap();
        assert_eq!(6, t.len());
        assert_eq!(TraceRecord::new(Op::Modify, 0x20, 1), t[1]);
        assert_eq!(Op::Other(b'I'), t[4].op);
        assert_eq!(" L 110,1".trim(), t[5].to_string());
    }
    #[test]
    fn test_trace_parse_malformed() {
        let trace_str = " L 10,1\n L zz,1\n L 20,1\n";
        match Trace::parse(trace_str) {
            Err(TraceError::Malformed { line_no, line }) => {
                assert_eq!(2, line_no);
                assert_eq!(" L zz,1", line);
            }
            r => panic!("unexpected result: {r:?}"),
        }
        assert!(Trace::parse("L 10").is_err());
        assert!(Trace::parse("L 10,1 trailing").is_err());
        assert!(Trace::parse("L 1ffffffffffffffff,1").is_err());
    }
    #[test]
    fn test_trace_from_reader() {
        let t = Trace::from_reader(" S 0,4\n L 8,4\n".as_bytes()).unwrap();
        assert_eq!(2, t.len());
        let t = Trace::from_reader(&b" L 10,1\r\n M 20,1\r\n"[..]).unwrap();
        assert_eq!(TraceRecord::new(Op::Modify, 0x20, 1), t[1]);
        assert!(Trace::parse("").unwrap().is_empty());
    }
    #[test]
    fn test_trace_from_reader_invalid_utf8() {
        match Trace::from_reader(&b" L 10,1\n L \xff0,1\n L 20,1\n"[..]) {
            Err(TraceError::Malformed { line_no, line }) => {
                assert_eq!(2, line_no);
                assert_eq!(" L \u{fffd}0,1", line);
            }
            r => panic!("unexpected result: {r:?}"),
        }
    }
    #[test]
    fn test_trace_from_reader_io_error() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }

        let e = Trace::from_reader(Broken).unwrap_err();
        assert!(matches!(e, TraceError::Unavailable(_)));
        assert_eq!("trace source is unavailable", e.to_string());
    }
}
