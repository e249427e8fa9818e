//! Parse XML files and print the events the reader reports, one per line.
//!
//! The output follows the `SAX.*` trace format of `xmllint --sax`, so it can
//! be compared with traces produced by other tools.

use std::{
    cell::Cell,
    fs::File,
    io::{Read, Write, stdin, stdout},
    process::exit,
    rc::Rc,
    sync::LazyLock,
};

use clap::Parser;
use exml_reader::{
    XmlError, XmlErrorHandler, XmlErrorKind,
    parser::{
        XmlEvent, XmlFilter, XmlFilterAction, XmlParseStatus, XmlParserOption, XmlReader,
        XmlWhitespaceRules,
    },
};
use log::{LevelFilter, Log, Metadata, Record};

const EXIT_NOT_WELL_FORMED: i32 = 1;
const EXIT_INVALID: i32 = 3;
const EXIT_READ_FILE: i32 = 4;
const EXIT_BAD_ARGUMENT: i32 = 5;

#[derive(clap::Parser, Debug)]
#[command(
    version,
    name = "exmlsax",
    about = "Parse the XML files and print the events of the reader.\nThe output follows `xmllint --sax`.",
    arg_required_else_help = true
)]
struct CmdArgs {
    /// the files to parse, `-` for the standard input
    #[clap(required = true)]
    xml_files: Vec<String>,
    /// validate the documents against their DTD
    #[arg(long)]
    valid: bool,
    /// do not load external parameter entities or the external subset
    #[arg(long)]
    noextpe: bool,
    /// do XInclude processing
    #[arg(long)]
    xinclude: bool,
    /// do not fixup xml:base and xml:lang at entity and inclusion boundaries
    #[arg(long)]
    nobasefix: bool,
    /// do not report warnings
    #[arg(long)]
    nowarning: bool,
    /// strip whitespace-only text in the matching elements (`*`, `{uri}*`, `{uri}name`, `name`)
    #[arg(long, value_name = "test")]
    strip_space: Vec<String>,
    /// keep whitespace-only text in the matching elements
    #[arg(long, value_name = "test")]
    preserve_space: Vec<String>,
    /// feed the input in chunks of the given size
    #[arg(long, value_name = "size")]
    push: Option<usize>,
    /// pull the events one at a time
    #[arg(long)]
    step: bool,
    /// do not print the events
    #[arg(long)]
    quiet: bool,
    /// log what the reader does
    #[arg(long)]
    debug: bool,
}

static CMD_ARGS: LazyLock<CmdArgs> = LazyLock::new(CmdArgs::parse);

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Prints diagnostics and keeps going.
#[derive(Clone, Default)]
struct Reporter {
    invalid: Rc<Cell<bool>>,
    not_well_formed: Rc<Cell<bool>>,
}

impl XmlErrorHandler for Reporter {
    fn warning(&mut self, error: &XmlError) {
        eprintln!("{error}");
    }

    fn error(&mut self, error: XmlError) -> Result<(), XmlError> {
        eprintln!("{error}");
        match error.kind() {
            XmlErrorKind::WellFormedness | XmlErrorKind::Internal => {
                self.not_well_formed.set(true)
            }
            _ => self.invalid.set(true),
        }
        Ok(())
    }

    fn fatal_error(&mut self, error: &XmlError) {
        eprintln!("{error}");
        self.not_well_formed.set(true);
    }
}

/// Prints every event it receives.
struct Tracer;

impl XmlFilter for Tracer {
    fn handle(&mut self, event: &XmlEvent) -> XmlFilterAction {
        if !CMD_ARGS.quiet {
            let mut out = stdout().lock();
            let _ = writeln!(out, "{event}");
        }
        XmlFilterAction::Continue
    }
}

fn options() -> i32 {
    let mut options = 0;
    if CMD_ARGS.valid {
        options |= XmlParserOption::XmlParseDTDValid as i32;
    }
    if CMD_ARGS.noextpe {
        options |= XmlParserOption::XmlParseNoExtPE as i32;
    }
    if CMD_ARGS.xinclude {
        options |= XmlParserOption::XmlParseXInclude as i32;
    }
    if CMD_ARGS.nobasefix {
        options |= XmlParserOption::XmlParseNoBaseFix as i32;
    }
    if CMD_ARGS.nowarning {
        options |= XmlParserOption::XmlParseNoWarning as i32;
    }
    options
}

fn whitespace_rules() -> anyhow::Result<XmlWhitespaceRules> {
    let mut rules = XmlWhitespaceRules::new();
    for test in &CMD_ARGS.strip_space {
        rules.strip(test)?;
    }
    for test in &CMD_ARGS.preserve_space {
        rules.preserve(test)?;
    }
    Ok(rules)
}

fn read_input(filename: &str) -> std::io::Result<Vec<u8>> {
    let mut bytes = vec![];
    if filename == "-" {
        stdin().lock().read_to_end(&mut bytes)?;
    } else {
        File::open(filename)?.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

fn parse_file(filename: &str, rules: &XmlWhitespaceRules) -> i32 {
    let bytes = match read_input(filename) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("failed to read {filename}: {err}");
            return EXIT_READ_FILE;
        }
    };
    let uri = (filename != "-").then_some(filename);

    let reporter = Reporter::default();
    let mut reader = XmlReader::with_options(options());
    reader.set_whitespace_rules(rules.clone());
    reader.set_error_handler(reporter.clone());

    let result = if CMD_ARGS.step {
        reader.set_document_uri(uri);
        let mut events = reader.events(bytes);
        let mut result = Ok(());
        let mut tracer = Tracer;
        for event in events.by_ref() {
            match event {
                Ok(event) => {
                    tracer.handle(&event);
                }
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
        result
    } else if let Some(size) = CMD_ARGS.push.filter(|&size| size > 0) {
        reader.add_handler(Tracer);
        reader.set_document_uri(uri);
        push_chunks(&mut reader, &bytes, size)
    } else {
        reader.add_handler(Tracer);
        reader.parse_bytes(uri, &bytes)
    };

    if result.is_err() || reporter.not_well_formed.get() {
        EXIT_NOT_WELL_FORMED
    } else if reporter.invalid.get() {
        EXIT_INVALID
    } else {
        0
    }
}

fn push_chunks(reader: &mut XmlReader, bytes: &[u8], size: usize) -> Result<(), XmlError> {
    let mut chunks = bytes.chunks(size).peekable();
    if chunks.peek().is_none() {
        reader.parse_chunk(&[], true)?;
        return Ok(());
    }
    while let Some(chunk) = chunks.next() {
        let terminate = chunks.peek().is_none();
        if reader.parse_chunk(chunk, terminate)? == XmlParseStatus::Stopped {
            break;
        }
    }
    Ok(())
}

fn main() {
    let level = if CMD_ARGS.debug {
        LevelFilter::Trace
    } else {
        LevelFilter::Warn
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    let rules = match whitespace_rules() {
        Ok(rules) => rules,
        Err(err) => {
            eprintln!("{err:#}");
            exit(EXIT_BAD_ARGUMENT);
        }
    };

    let mut status = 0;
    for filename in &CMD_ARGS.xml_files {
        let ret = parse_file(filename, &rules);
        if ret != 0 && status == 0 {
            status = ret;
        }
    }
    exit(status);
}
