//! Printing warnings to stderr, with the source location appended.

use std::{fmt::Arguments, io::Write};

/// Write one warning line to `out`. Used by the `warn!` macro; I/O
/// errors are ignored since there's nowhere left to report them.
pub fn write_warning(out: &mut impl Write, args: Arguments, file: &str, line: u32) {
    let _ = write!(out, "W: ");
    let _ = out.write_fmt(args);
    let _ = writeln!(out, " at {file:?} line {line}");
    let _ = out.flush();
}

#[macro_export]
macro_rules! warn {
    ($formatstr:expr $(,$arg:expr)*) => { {
        let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
        $crate::warn::write_warning(&mut outp,
                                    format_args!($formatstr $(,$arg)*),
                                    file!(),
                                    line!());
    } }
}

#[macro_export]
macro_rules! nowarn {
    ($formatstr:expr $(,$arg:expr)*) => {
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_write_warning() {
        let mut out = Vec::new();
        write_warning(&mut out, format_args!("hi {}", 5), "src/x.rs", 12);
        assert_eq!(String::from_utf8(out).unwrap(),
                   "W: hi 5 at \"src/x.rs\" line 12\n");
    }
}
