//! FlowMessage to FlowRecord transformation.
//!
//! Renders addresses as text and substitutes names from the configured
//! lookup tables. Table keys are the decimal text of the looked-up number
//! (the MAC table is keyed by the MAC in lowercase hex without leading
//! zeros).

use flow_core::{FlowMessage, FlowRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Name substitution tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTables {
    /// MAC (lowercase hex, no separators, no leading zeros) → device name
    pub mac: HashMap<String, String>,
    /// Destination port → service name
    pub port: HashMap<String, String>,
    /// IP protocol number → protocol name
    pub protocol: HashMap<String, String>,
    /// Ethertype → name
    pub etype: HashMap<String, String>,
}

fn table(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for LookupTables {
    fn default() -> Self {
        Self {
            mac: HashMap::new(),
            port: table(&[
                ("20", "ftp-data"),
                ("21", "ftp"),
                ("22", "ssh"),
                ("23", "telnet"),
                ("25", "smtp"),
                ("53", "dns"),
                ("67", "dhcp"),
                ("80", "http"),
                ("110", "pop3"),
                ("123", "ntp"),
                ("143", "imap"),
                ("161", "snmp"),
                ("179", "bgp"),
                ("389", "ldap"),
                ("443", "https"),
                ("445", "smb"),
                ("514", "syslog"),
                ("587", "submission"),
                ("993", "imaps"),
                ("995", "pop3s"),
                ("1194", "openvpn"),
                ("3306", "mysql"),
                ("3389", "rdp"),
                ("5432", "postgresql"),
                ("6379", "redis"),
                ("8080", "http-alt"),
                ("9092", "kafka"),
                ("9200", "elasticsearch"),
            ]),
            protocol: table(&[
                ("1", "icmp"),
                ("2", "igmp"),
                ("6", "tcp"),
                ("17", "udp"),
                ("41", "ipv6"),
                ("47", "gre"),
                ("50", "esp"),
                ("51", "ah"),
                ("58", "ipv6-icmp"),
                ("89", "ospf"),
                ("132", "sctp"),
            ]),
            etype: table(&[
                ("2048", "IPv4"),
                ("2054", "ARP"),
                ("33024", "802.1Q"),
                ("34525", "IPv6"),
                ("34887", "MPLS"),
            ]),
        }
    }
}

/// Builds index documents from decoded flow messages.
#[derive(Debug, Clone, Default)]
pub struct FlowTransformer {
    tables: LookupTables,
}

impl FlowTransformer {
    pub fn new(tables: LookupTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    /// Builds the document for `msg`. Location fields are left to the
    /// enricher; the flow start is converted to milliseconds.
    pub fn transform(&self, msg: &FlowMessage) -> FlowRecord {
        let src_mac = format!("{:x}", msg.src_mac);
        let dst_mac = format!("{:x}", msg.dst_mac);

        FlowRecord {
            flow_type: msg.r#type,
            time_received: msg.time_received,
            sequence_num: msg.sequence_num,
            time_flow_start: msg.time_flow_start.saturating_mul(1000),
            sampling_rate: msg.sampling_rate,
            sampler_address: format_ip(&msg.sampler_address),
            time_flow_end: msg.time_flow_end,
            bytes: msg.bytes,
            packets: msg.packets,
            src_addr: format_ip(&msg.src_addr),
            dst_addr: format_ip(&msg.dst_addr),
            etype: msg.etype,
            proto: msg.proto,
            src_port: msg.src_port,
            dst_port: msg.dst_port,
            out_if: msg.out_if,
            ipttl: msg.ip_ttl,
            tcp_flags: msg.tcp_flags,
            ipv6_flow_label: msg.ipv6_flow_label,
            src_device: lookup(&self.tables.mac, &src_mac),
            dst_device: lookup(&self.tables.mac, &dst_mac),
            port_name: lookup(&self.tables.port, &msg.dst_port.to_string()),
            proto_name: lookup(&self.tables.protocol, &msg.proto.to_string()),
            etype_name: lookup(&self.tables.etype, &msg.etype.to_string()),
            src_mac,
            dst_mac,
            ..Default::default()
        }
    }
}

fn lookup(table: &HashMap<String, String>, key: &str) -> String {
    table.get(key).cloned().unwrap_or_default()
}

/// Parses a raw 4 or 16 byte address. IPv4-mapped IPv6 addresses come back
/// as IPv4.
pub fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = raw.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = raw.try_into().ok()?;
            let v6 = Ipv6Addr::from(octets);
            Some(match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            })
        }
        _ => None,
    }
}

/// Text form of a raw address; empty when the bytes are not an address.
fn format_ip(raw: &[u8]) -> String {
    ip_from_bytes(raw).map(|ip| ip.to_string()).unwrap_or_default()
}
