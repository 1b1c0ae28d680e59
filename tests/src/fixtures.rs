//! Test fixtures and flow generators.

use flow_core::FlowMessage;
use ingest::{PipelineConfig, StartPosition};
use prost::Message;

pub const TOPIC: &str = "flows";
pub const GROUP: &str = "flow-indexer-test";

/// A UDP DNS flow from 192.168.1.10 to 8.8.8.8 tagged with `sequence_num`.
pub fn flow_message(sequence_num: u32) -> FlowMessage {
    FlowMessage {
        r#type: 3,
        sequence_num,
        time_received: 1_700_000_001,
        time_flow_start: 1_700_000_000,
        time_flow_end: 1_700_000_001,
        sampler_address: vec![10, 0, 0, 254],
        src_addr: vec![192, 168, 1, 10],
        dst_addr: vec![8, 8, 8, 8],
        bytes: 512,
        packets: 4,
        etype: 0x0800,
        proto: 17,
        src_port: 53124,
        dst_port: 53,
        ip_ttl: 64,
        src_mac: 0x0000_5e00_5301,
        dst_mac: 0x0000_5e00_5302,
        ..Default::default()
    }
}

/// Encoded [`flow_message`].
pub fn flow_payload(sequence_num: u32) -> Vec<u8> {
    flow_message(sequence_num).encode_to_vec()
}

/// Pipeline settings for `TOPIC`/`GROUP`.
pub fn pipeline_config(bus_capacity: usize) -> PipelineConfig {
    PipelineConfig {
        topic: TOPIC.to_string(),
        group: GROUP.to_string(),
        bus_capacity,
        start_position: StartPosition::Newest,
    }
}
