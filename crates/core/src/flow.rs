//! Flow telemetry schemas.
//!
//! `FlowMessage` is the goflow protobuf message published by flow collectors
//! (sFlow, NetFlow v5/v9, IPFIX). Only the fields the indexer reads are
//! declared; unknown fields are skipped by the decoder.
//!
//! `FlowRecord` is the document written to the search index.

use serde::{Deserialize, Serialize};

/// goflow `FlowMessage`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FlowMessage {
    /// FlowType enum: 0 unknown, 1 sFlow v5, 2 NetFlow v5, 3 NetFlow v9, 4 IPFIX
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub time_received: u64,
    #[prost(uint64, tag = "3")]
    pub sampling_rate: u64,
    #[prost(uint32, tag = "4")]
    pub sequence_num: u32,
    #[prost(uint64, tag = "5")]
    pub time_flow_end: u64,
    #[prost(bytes = "vec", tag = "6")]
    pub src_addr: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub dst_addr: Vec<u8>,
    #[prost(uint64, tag = "9")]
    pub bytes: u64,
    #[prost(uint64, tag = "10")]
    pub packets: u64,
    #[prost(bytes = "vec", tag = "11")]
    pub sampler_address: Vec<u8>,
    #[prost(uint32, tag = "18")]
    pub in_if: u32,
    #[prost(uint32, tag = "19")]
    pub out_if: u32,
    #[prost(uint32, tag = "20")]
    pub proto: u32,
    #[prost(uint32, tag = "21")]
    pub src_port: u32,
    #[prost(uint32, tag = "22")]
    pub dst_port: u32,
    #[prost(uint32, tag = "25")]
    pub ip_ttl: u32,
    #[prost(uint32, tag = "26")]
    pub tcp_flags: u32,
    #[prost(uint64, tag = "27")]
    pub src_mac: u64,
    #[prost(uint64, tag = "28")]
    pub dst_mac: u64,
    #[prost(uint32, tag = "30")]
    pub etype: u32,
    #[prost(uint32, tag = "37")]
    pub ipv6_flow_label: u32,
    /// Seconds since epoch
    #[prost(uint64, tag = "38")]
    pub time_flow_start: u64,
}

/// Geographic coordinates in the `geo_point` object layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Indexed flow document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    #[serde(rename = "type")]
    pub flow_type: i32,
    pub time_received: u64,
    pub sequence_num: u32,
    /// Flow start in milliseconds since epoch
    #[serde(rename = "timestamp")]
    pub time_flow_start: u64,
    pub sampling_rate: u64,
    pub sampler_address: String,
    pub time_flow_end: u64,
    pub bytes: u64,
    pub packets: u64,
    pub src_addr: String,
    pub dst_addr: String,
    pub etype: u32,
    #[serde(rename = "protocol")]
    pub proto: u32,
    pub src_port: u32,
    pub dst_port: u32,
    pub out_if: u32,
    pub src_mac: String,
    pub dst_mac: String,
    pub ipttl: u32,
    pub tcp_flags: u32,
    pub ipv6_flow_label: u32,
    pub src_device: String,
    pub dst_device: String,
    pub src_location: Location,
    pub dst_location: Location,
    pub src_city: String,
    pub dst_city: String,
    pub src_country: String,
    pub dst_country: String,
    pub src_as: u32,
    pub dst_as: u32,
    pub src_org: String,
    pub dst_org: String,
    pub port_name: String,
    pub proto_name: String,
    pub etype_name: String,
}
