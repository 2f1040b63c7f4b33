//! Line-based file stages.
//!
//! Thin wrappers that pair the bracket family with real file handles:
//! every helper opens its file through [`bracket`], so the handle is closed
//! (and, for writers, flushed) on every exit path, including abandonment
//! by the other end of the pipeline.
//!
//! Handles are shared-cell resources: the release action takes the inner
//! handle out of its cell, which closes the file at a deterministic point
//! even while stray clones of the cell are still alive. A helper that finds
//! its cell already emptied treats the stream as ended.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::rc::Rc;

use crate::bracket::bracket;
use crate::stage::{Consumer, Producer, Stage};

/// A file handle owned by the bracket that opened it.
pub type SharedFile = Rc<RefCell<Option<File>>>;

type SharedReader = Rc<RefCell<Option<BufReader<File>>>>;
type SharedWriter = Rc<RefCell<Option<BufWriter<File>>>>;

/// Opens a file, hands the shared handle to `use_fn`, closes on every exit
/// path.
pub fn with_file<I, O, R>(
    path: impl Into<PathBuf>,
    options: OpenOptions,
    use_fn: impl FnOnce(SharedFile) -> Stage<I, O, R> + 'static,
) -> Stage<I, O, R>
where
    I: 'static,
    O: 'static,
    R: 'static,
{
    let path = path.into();
    bracket(
        move || Ok(Rc::new(RefCell::new(Some(options.open(&path)?)))),
        |handle: SharedFile| {
            handle.borrow_mut().take();
            Ok(())
        },
        use_fn,
    )
}

/// Produces the lines of a file, without their terminators.
///
/// The file is opened when the stage first runs and closed when the
/// producer ends or is abandoned. Reads are checked actions.
pub fn read_lines(path: impl Into<PathBuf>) -> Producer<String, ()> {
    let path = path.into();
    bracket(
        move || {
            let file = File::open(&path)?;
            Ok(Rc::new(RefCell::new(Some(BufReader::new(file)))))
        },
        |handle: SharedReader| {
            handle.borrow_mut().take();
            Ok(())
        },
        emit_lines,
    )
}

/// Consumes lines and writes each to a file, newline-terminated.
///
/// The file is created (truncating) when the stage first runs; the writer
/// is flushed and closed when the consumer ends or is abandoned, most
/// commonly because the upstream producer ran dry.
pub fn write_lines(path: impl Into<PathBuf>) -> Consumer<String, ()> {
    let path = path.into();
    bracket(
        move || {
            let file = File::create(&path)?;
            Ok(Rc::new(RefCell::new(Some(BufWriter::new(file)))))
        },
        |handle: SharedWriter| {
            if let Some(mut writer) = handle.borrow_mut().take() {
                writer.flush()?;
            }
            Ok(())
        },
        drain_lines,
    )
}

fn emit_lines(handle: SharedReader) -> Producer<String, ()> {
    Stage::Action(Box::new(move |cx| {
        let line = cx.check(|| next_line(&handle))?;
        Ok(match line {
            Some(text) => Stage::Respond(text, Box::new(move || emit_lines(handle))),
            None => Stage::Done(()),
        })
    }))
}

fn next_line(handle: &SharedReader) -> io::Result<Option<String>> {
    let mut slot = handle.borrow_mut();
    let Some(reader) = slot.as_mut() else {
        return Ok(None);
    };
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn drain_lines(handle: SharedWriter) -> Consumer<String, ()> {
    Stage::Request(Box::new(move |line: String| {
        Stage::Action(Box::new(move |cx| {
            cx.check(|| write_line(&handle, &line))?;
            Ok(drain_lines(handle))
        }))
    }))
}

fn write_line(handle: &SharedWriter, line: &str) -> io::Result<()> {
    let mut slot = handle.borrow_mut();
    match slot.as_mut() {
        Some(writer) => writeln!(writer, "{line}"),
        None => Err(io::Error::new(io::ErrorKind::Other, "writer already closed")),
    }
}
