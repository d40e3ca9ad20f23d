// Copyright (c) The ci-triage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! String-only writes for rendered summaries.
//!
//! Summaries are always text, so the renderer writes `&str` fragments rather than bytes. The
//! same rendering code targets an in-memory [`String`] (tests and
//! `SummaryRenderer::to_human_string`) and a buffered stdout in the CLI.
//!
//! This is similar to [`std::fmt::Write`], but it returns [`std::io::Error`] so that failures to
//! write to stdout propagate with their original cause.

use std::{
    fmt,
    io::{self, BufWriter, Write},
};

/// A sink for rendered text.
///
/// For more, see the [module-level documentation](self).
pub trait WriteStr {
    /// Writes a string.
    fn write_str(&mut self, s: &str) -> io::Result<()>;

    /// Flushes any buffered text to its destination.
    fn write_str_flush(&mut self) -> io::Result<()>;

    /// Writes formatted text.
    ///
    /// This lets `write!` and `writeln!` be used with any `WriteStr`.
    fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> io::Result<()> {
        // fmt::Write cannot carry an io::Error, so stash the first one and report it after
        // formatting stops.
        struct Adapter<'a, T: ?Sized> {
            inner: &'a mut T,
            error: Option<io::Error>,
        }

        impl<T: ?Sized + WriteStr> fmt::Write for Adapter<'_, T> {
            fn write_str(&mut self, s: &str) -> fmt::Result {
                self.inner.write_str(s).map_err(|error| {
                    self.error = Some(error);
                    fmt::Error
                })
            }
        }

        let mut adapter = Adapter {
            inner: self,
            error: None,
        };
        match fmt::write(&mut adapter, fmt) {
            Ok(()) => Ok(()),
            Err(_) => Err(adapter
                .error
                .unwrap_or_else(|| io::Error::other("formatter error"))),
        }
    }
}

impl WriteStr for String {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.push_str(s);
        Ok(())
    }

    fn write_str_flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> WriteStr for BufWriter<W> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_all(s.as_bytes())
    }

    fn write_str_flush(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl<T: WriteStr + ?Sized> WriteStr for &mut T {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        (**self).write_str(s)
    }

    fn write_str_flush(&mut self) -> io::Result<()> {
        (**self).write_str_flush()
    }

    fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> io::Result<()> {
        (**self).write_fmt(fmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingWriter;

    impl WriteStr for FailingWriter {
        fn write_str(&mut self, _s: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn write_str_flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_fmt_into_string() {
        let mut out = String::new();
        writeln!(out, "total={} passed={}", 3, 2).unwrap();
        assert_eq!(out, "total=3 passed=2\n");
    }

    #[test]
    fn write_fmt_preserves_io_error() {
        let mut writer = FailingWriter;
        let error = write!(writer, "size={}", 1).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::BrokenPipe);
    }
}
