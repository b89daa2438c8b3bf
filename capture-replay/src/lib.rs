//! Replay a pcapng capture through the capture block read interface
//!
//! The blocks of the input file are fed to a [`MemoryQueue`]: section header and interface
//! description blocks at the start of the file become the queue's initial blocks, the
//! others are enqueued one by one. A single session drains the queue into the output,
//! using the requested read size and policy (snap length, filters).

extern crate lz4;

use flate2::read::GzDecoder;
use libcapture_reader::*;
use libcapture_tools::*;
use log::{debug, info, warn};
use pcap_parser::pcapng::parse_block_le;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use xz2::read::XzDecoder;

pub const DEFAULT_READ_SIZE: usize = 65536;

pub struct ReplayOptions {
    pub config: Config,
    /// Size of the buffer given to each read
    pub read_size: usize,
    /// Snap length to set on the session (overrides the configuration)
    pub snap_length: Option<u32>,
    pub process_filter: Vec<u32>,
    pub connection_filter: Vec<u32>,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        ReplayOptions {
            config: Config::default(),
            read_size: DEFAULT_READ_SIZE,
            snap_length: None,
            process_filter: Vec::new(),
            connection_filter: Vec::new(),
        }
    }
}

/// Blocks of a capture file
#[derive(Debug, Default)]
pub struct CaptureBlocks {
    /// Leading section header and interface description blocks
    pub initial: Vec<CaptureBlock>,
    pub blocks: Vec<CaptureBlock>,
}

fn to_io_error(e: Error) -> io::Error {
    match e {
        Error::IoError(e) => e,
        e => io::Error::other(e),
    }
}

/// Split little-endian pcapng data into blocks
pub fn split_blocks(data: &[u8]) -> Result<CaptureBlocks, io::Error> {
    let mut result = CaptureBlocks::default();
    let mut i = data;
    while !i.is_empty() {
        let rem = match parse_block_le(i) {
            Ok((rem, _)) => rem,
            Err(e) => {
                warn!("Could not parse block at offset {}", data.len() - i.len());
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("pcapng parsing failed: {e:?}"),
                ));
            }
        };
        let raw = &i[..i.len() - rem.len()];
        let block = CaptureBlock::from_bytes(raw.to_vec());
        let initial = matches!(
            block.kind(),
            BlockKind::SectionHeader | BlockKind::InterfaceDescription
        );
        if initial && result.blocks.is_empty() {
            result.initial.push(block);
        } else {
            result.blocks.push(block);
        }
        i = rem;
    }
    debug!(
        "{} initial blocks, {} blocks",
        result.initial.len(),
        result.blocks.len()
    );
    Ok(result)
}

fn control(
    interface: &ReadInterface,
    file: &mut FileObject,
    function: ControlFunction,
    input: &[u8],
    output_len: usize,
) -> Result<Vec<u8>, io::Error> {
    let mut buffer = vec![0u8; input.len().max(output_len)];
    buffer[..input.len()].copy_from_slice(input);
    let request = ControlRequest::new(function.code(false), input.len(), output_len, Some(buffer.as_mut_slice()));
    let n = interface
        .dispatch(file, Request::Control(request))
        .map_err(to_io_error)?;
    buffer.truncate(n);
    Ok(buffer)
}

fn encode_ids(ids: &[u32]) -> Vec<u8> {
    ids.iter().flat_map(|id| id.to_le_bytes()).collect()
}

/// Read from the session until no data is available, writing everything to `output`
fn drain<W: Write + ?Sized>(
    interface: &ReadInterface,
    file: &mut FileObject,
    buf: &mut [u8],
    output: &mut W,
) -> Result<usize, io::Error> {
    let mut total = 0;
    loop {
        let n = interface
            .dispatch(file, Request::Read(&mut *buf))
            .map_err(to_io_error)?;
        if n == 0 {
            return Ok(total);
        }
        output.write_all(&buf[..n])?;
        total += n;
    }
}

/// Replay pcapng `data` through a session, writing the stream to `output`
///
/// Returns the session statistics, taken before the session is closed.
pub fn replay<W: Write + ?Sized>(
    data: &[u8],
    output: &mut W,
    options: &ReplayOptions,
) -> Result<Statistics, io::Error> {
    let capture = split_blocks(data)?;
    let queue = Arc::new(MemoryQueue::new(&options.config));
    queue.set_initial_blocks(capture.initial);
    let interface = ReadInterface::new(queue.clone(), &options.config);

    let mut file = FileObject::new();
    interface
        .dispatch(&mut file, Request::Create(OpenRequest::new()))
        .map_err(to_io_error)?;
    if let Some(snap_length) = options.snap_length {
        control(
            &interface,
            &mut file,
            ControlFunction::SetSnapLength,
            &snap_length.to_le_bytes(),
            0,
        )?;
    }
    if !options.process_filter.is_empty() {
        let ids = encode_ids(&options.process_filter);
        control(&interface, &mut file, ControlFunction::FilterProcesses, &ids, 0)?;
    }
    if !options.connection_filter.is_empty() {
        let ids = encode_ids(&options.connection_filter);
        control(&interface, &mut file, ControlFunction::FilterConnections, &ids, 0)?;
    }

    let mut buf = vec![0u8; options.read_size.max(1)];
    let mut written = drain(&interface, &mut file, &mut buf, output)?;
    for block in capture.blocks {
        queue.enqueue(block);
        written += drain(&interface, &mut file, &mut buf, output)?;
    }
    info!("Replay done, {} bytes written", written);

    let stats = control(
        &interface,
        &mut file,
        ControlFunction::GetStatistics,
        &[],
        Statistics::SIZE,
    )?;
    let stats = Statistics::parse(&stats)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short statistics record"))?;
    interface
        .dispatch(&mut file, Request::Close)
        .map_err(to_io_error)?;
    Ok(stats)
}

/// Open the input file, decompressing it based on its extension. "-" is standard input.
pub fn get_reader(input_filename: &str) -> Result<Box<dyn Read>, io::Error> {
    if input_filename == "-" {
        return Ok(Box::new(io::stdin()));
    }
    let path = Path::new(input_filename);
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if input_filename.ends_with(".gz") {
        Box::new(GzDecoder::new(file))
    } else if input_filename.ends_with(".xz") {
        Box::new(XzDecoder::new(file))
    } else if input_filename.ends_with(".lz4") {
        Box::new(lz4::Decoder::new(file)?)
    } else {
        Box::new(file)
    };
    Ok(reader)
}

/// Replay `input_filename` into `output_filename` (created, or truncated if it exists)
pub fn replay_file<S1: AsRef<str>, S2: AsRef<str>>(
    input_filename: S1,
    output_filename: S2,
    options: &ReplayOptions,
) -> Result<Statistics, io::Error> {
    let mut data = Vec::new();
    get_reader(input_filename.as_ref())?.read_to_end(&mut data)?;
    debug!("Read {} bytes from {}", data.len(), input_filename.as_ref());
    let outfile = File::create(Path::new(output_filename.as_ref()))?;
    let mut output = BufWriter::new(outfile);
    let stats = replay(&data, &mut output, options)?;
    output.flush()?;
    Ok(stats)
}
