//! `nmap_port_scan`: port and service discovery.

use std::time::Duration;

use redline_rs::ToolDef;
use redline_rs::tools::{Tool, ToolFuture, ToolOutput, parse_tool_args};
use roxmltree::{Document, Node};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::process::{read_output, run_with_deadline, temp_output};

pub const DEFAULT_NMAP_TIMEOUT_SECS: u64 = 300;

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// TCP SYN scan (needs root).
    #[default]
    Syn,
    /// TCP connect scan.
    Tcp,
    Udp,
    /// Host discovery only, no port scan.
    Ping,
}

impl ScanType {
    fn flag(self) -> &'static str {
        match self {
            ScanType::Syn => "-sS",
            ScanType::Tcp => "-sT",
            ScanType::Udp => "-sU",
            ScanType::Ping => "-sn",
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct NmapArgs {
    /// IP address, hostname, or CIDR range.
    pub target: String,
    /// Port specification such as "22,80,443" or "1-1024". Defaults to
    /// nmap's top 1000 ports.
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub scan_type: ScanType,
    /// Probe service versions (-sV).
    #[serde(default = "enabled")]
    pub service_detection: bool,
    /// OS fingerprinting (-O, needs root).
    #[serde(default)]
    pub os_detection: bool,
    /// Default NSE scripts (-sC).
    #[serde(default)]
    pub script_scan: bool,
    /// Deadline in seconds (default 300).
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn enabled() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_NMAP_TIMEOUT_SECS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NmapPort {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extrainfo: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NmapHost {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub ports: Vec<NmapPort>,
}

impl NmapHost {
    pub fn open_ports(&self) -> impl Iterator<Item = &NmapPort> {
        self.ports.iter().filter(|p| p.state == "open")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NmapScanResult {
    pub hosts: Vec<NmapHost>,
    pub scan_type: ScanType,
    pub hosts_up: usize,
    pub hosts_down: usize,
    pub scan_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NmapScanResult {
    fn error(scan_type: ScanType, message: impl Into<String>) -> Self {
        Self {
            hosts: Vec::new(),
            scan_type,
            hosts_up: 0,
            hosts_down: 0,
            scan_completed: false,
            error: Some(message.into()),
        }
    }

    fn into_output(self) -> ToolOutput {
        let json = serde_json::to_string(&self).unwrap_or_default();
        match self.error {
            Some(error) => ToolOutput::failed_with_payload(error, json),
            None => ToolOutput::ok(json),
        }
    }
}

pub fn validate_args(args: &NmapArgs) -> Result<(), String> {
    let target = args.target.trim();
    if target.is_empty() {
        return Err("'target' must be a non-empty host, IP or CIDR range".into());
    }
    // nmap would read a leading dash as an option.
    if target.starts_with('-') || target.contains(char::is_whitespace) {
        return Err(format!("invalid target '{}'", args.target));
    }
    if let Some(ports) = &args.ports
        && !ports
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '-' | ':' | 'T' | 'U'))
    {
        return Err(format!("invalid port specification '{ports}'"));
    }
    Ok(())
}

pub fn build_command(args: &NmapArgs, output: &str) -> Vec<String> {
    let probing = args.scan_type != ScanType::Ping;
    let mut cmd = vec![args.scan_type.flag().to_string()];
    if let Some(ports) = args.ports.as_ref().filter(|_| probing) {
        cmd.push("-p".into());
        cmd.push(ports.clone());
    }
    if args.service_detection && probing {
        cmd.push("-sV".into());
    }
    if args.os_detection {
        cmd.push("-O".into());
    }
    if args.script_scan && probing {
        cmd.push("-sC".into());
    }
    cmd.extend(["-oX".into(), output.to_string(), args.target.trim().to_string()]);
    cmd.extend(["-T4", "--open", "--host-timeout", "300s"].map(String::from));
    cmd
}

/// Parse nmap's `-oX` report.
pub fn parse_xml(
    xml: &str,
    scan_type: ScanType,
    completed: bool,
) -> Result<NmapScanResult, String> {
    let doc = Document::parse(xml).map_err(|e| format!("failed to parse nmap XML: {e}"))?;
    let hosts: Vec<NmapHost> = doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("host"))
        .filter_map(parse_host)
        .collect();
    let hosts_up = hosts.iter().filter(|h| h.state == "up").count();

    Ok(NmapScanResult {
        hosts_down: hosts.len() - hosts_up,
        hosts_up,
        hosts,
        scan_type,
        scan_completed: completed,
        error: None,
    })
}

fn child<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn parse_host(host: Node<'_, '_>) -> Option<NmapHost> {
    let status = child(host, "status")?;
    let addresses: Vec<Node> = host.children().filter(|n| n.has_tag_name("address")).collect();
    let address = addresses
        .iter()
        .find(|a| a.attribute("addrtype") == Some("ipv4"))
        .or_else(|| {
            addresses
                .iter()
                .find(|a| a.attribute("addrtype") == Some("ipv6"))
        })?;

    let hostname = child(host, "hostnames")
        .and_then(|h| child(h, "hostname"))
        .and_then(|h| h.attribute("name"))
        .map(String::from);
    let ports = child(host, "ports")
        .map(|ports| {
            ports
                .children()
                .filter(|n| n.has_tag_name("port"))
                .filter_map(parse_port)
                .collect()
        })
        .unwrap_or_default();

    Some(NmapHost {
        ip: address.attribute("addr")?.to_string(),
        hostname,
        state: status.attribute("state").unwrap_or("unknown").to_string(),
        reason: status.attribute("reason").map(String::from),
        ports,
    })
}

fn parse_port(port: Node<'_, '_>) -> Option<NmapPort> {
    let number = port.attribute("portid")?.parse().ok()?;
    let state = child(port, "state")?.attribute("state")?.to_string();
    let service = child(port, "service");
    let attr = |name: &str| service.and_then(|s| s.attribute(name)).map(String::from);

    Some(NmapPort {
        port: number,
        protocol: port.attribute("protocol").unwrap_or("tcp").to_string(),
        state,
        service: attr("name").unwrap_or_else(|| "unknown".to_string()),
        product: attr("product"),
        version: attr("version"),
        extrainfo: attr("extrainfo"),
    })
}

/// The `nmap_port_scan` tool.
pub struct NmapScan {
    binary: String,
}

impl NmapScan {
    pub fn new() -> Self {
        Self {
            binary: "nmap".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn scan(&self, args: NmapArgs) -> NmapScanResult {
        if let Err(e) = validate_args(&args) {
            return NmapScanResult::error(args.scan_type, format!("validation error: {e}"));
        }
        let output = match temp_output(".xml") {
            Ok(f) => f,
            Err(e) => return NmapScanResult::error(args.scan_type, e),
        };
        let cmd = build_command(&args, &output.path().to_string_lossy());
        info!(host = %args.target, "Starting nmap scan: {} {}", self.binary, cmd.join(" "));

        let process =
            match run_with_deadline(&self.binary, &cmd, Duration::from_secs(args.timeout)).await {
                Ok(p) => p,
                Err(e) => return NmapScanResult::error(args.scan_type, e),
            };

        let xml = read_output(output.path()).await;
        if xml.trim().is_empty() {
            let detail = process.stderr.trim();
            return NmapScanResult::error(
                args.scan_type,
                format!("nmap produced no report ({detail})"),
            );
        }
        match parse_xml(&xml, args.scan_type, process.completed()) {
            Ok(result) => {
                info!(hosts = result.hosts.len(), "Parsed nmap output");
                result
            }
            Err(e) => {
                warn!("{e}");
                NmapScanResult::error(args.scan_type, e)
            }
        }
    }
}

impl Default for NmapScan {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for NmapScan {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            super::NMAP_PORT_SCAN,
            "Scan a host for open ports and running services with nmap. Returns hosts, \
             port states, and detected service versions.",
            redline_rs::json_schema_for::<NmapArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            match parse_tool_args::<NmapArgs>(&arguments) {
                Ok(args) => self.scan(args).await.into_output(),
                Err(e) => ToolOutput::failed(e),
            }
        })
    }
}
