#![allow(dead_code)]

use libcapture_reader::*;
use libcapture_tools::layout::build_packet_block;
use libcapture_tools::*;
use pcap_parser::pcapng::*;
use pcap_parser::{Linktype, ToVec};
use std::sync::Arc;

pub fn shb() -> Vec<u8> {
    let shb = SectionHeaderBlock {
        block_type: SHB_MAGIC,
        block_len1: 28,
        bom: BOM_MAGIC,
        major_version: 1,
        minor_version: 0,
        section_len: -1,
        options: Vec::new(),
        block_len2: 28,
    };
    shb.to_vec_raw().expect("SHB serialization")
}

pub fn idb() -> Vec<u8> {
    let mut idb = InterfaceDescriptionBlock {
        block_type: IDB_MAGIC,
        block_len1: 20,
        linktype: Linktype::RAW,
        reserved: 0,
        snaplen: 65535,
        options: vec![],
        block_len2: 20,
        if_tsresol: 6,
        if_tsoffset: 0,
    };
    idb.to_vec().expect("IDB serialization")
}

/// Packet payload of `len` bytes, all different from zero
pub fn payload(seq: u32, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u32 + seq * 7) % 255) as u8 + 1)
        .collect()
}

pub fn packet(seq: u32, len: usize, process_id: u32, connection_id: u32) -> CaptureBlock {
    let data = build_packet_block(0, u64::from(seq), &payload(seq, len), process_id, connection_id);
    CaptureBlock::from_bytes(data)
}

pub fn config(entries: &[(&str, i64)]) -> Config {
    let mut config = Config::default();
    for (k, v) in entries {
        config.set(k, *v);
    }
    config
}

/// Queue with a section header and an interface description as initial blocks
pub fn setup(config: &Config) -> (Arc<MemoryQueue>, ReadInterface) {
    let queue = Arc::new(MemoryQueue::new(config));
    queue.set_initial_blocks(vec![
        CaptureBlock::from_bytes(shb()),
        CaptureBlock::from_bytes(idb()),
    ]);
    let interface = ReadInterface::new(queue.clone(), config);
    (queue, interface)
}

pub fn open(interface: &ReadInterface) -> Session {
    interface.open(&OpenRequest::new()).expect("open session")
}

/// Read until a read returns zero bytes, with reads of `read_size` bytes
pub fn drain(session: &Session, read_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; read_size];
    loop {
        let n = session.read(&mut buf);
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Summary of a parsed block
#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    SectionHeader,
    InterfaceDescription,
    Packet {
        caplen: u32,
        origlen: u32,
        block_len: u32,
        data: Vec<u8>,
        process_id: Option<u32>,
        connection_id: Option<u32>,
    },
    Other(u32),
}

fn option_u32(options: &[PcapNGOption], code: u16) -> Option<u32> {
    let opt = options.iter().find(|o| o.code.0 == code)?;
    let v: &[u8] = &opt.value;
    Some(u32::from_le_bytes([v[0], v[1], v[2], v[3]]))
}

/// Parse a complete stream of little-endian pcapng blocks
pub fn parse_stream(mut i: &[u8]) -> Vec<Parsed> {
    let mut blocks = Vec::new();
    while !i.is_empty() {
        let (rem, block) = parse_block_le(i).expect("stream must parse as pcapng blocks");
        let parsed = match block {
            Block::SectionHeader(_) => Parsed::SectionHeader,
            Block::InterfaceDescription(_) => Parsed::InterfaceDescription,
            Block::EnhancedPacket(epb) => Parsed::Packet {
                caplen: epb.caplen,
                origlen: epb.origlen,
                block_len: epb.block_len1,
                data: epb.data[..epb.caplen as usize].to_vec(),
                process_id: option_u32(&epb.options, 258),
                connection_id: option_u32(&epb.options, 257),
            },
            other => Parsed::Other(other.magic()),
        };
        blocks.push(parsed);
        i = rem;
    }
    blocks
}

/// Process ids of the packet blocks of a parsed stream
pub fn process_ids(blocks: &[Parsed]) -> Vec<u32> {
    blocks
        .iter()
        .filter_map(|b| match b {
            Parsed::Packet { process_id, .. } => *process_id,
            _ => None,
        })
        .collect()
}
