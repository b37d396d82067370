// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! FINS/UDP client
//!
//! Request/response framing for the FINS protocol over UDP. Each command is
//! one datagram; responses are matched by service id. Timeouts retry with a
//! short backoff because single-datagram loss is routine on plant networks,
//! but the total budget stays below the shutdown grace window so a cancelled
//! loop never hangs on a dead peer.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

use crate::config::{DataType, MemoryArea};

use super::{area_word_code, CpuUnitDetails, FinsDevice, FinsError};

/// Standard FINS UDP port.
pub const DEFAULT_FINS_PORT: u16 = 9600;

/// Per-attempt response deadline.
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Datagram attempts per command before giving up.
const MAX_RETRIES: usize = 3;

/// Maximum words a single MEMORY AREA READ may request.
const MAX_WORDS_PER_COMMAND: u16 = 990;

/// FINS command codes used by the bridge.
const MEMORY_AREA_READ: [u8; 2] = [0x01, 0x01];
const CPU_UNIT_DATA_READ: [u8; 2] = [0x05, 0x01];

/// FINS/UDP connection to one PLC.
pub struct FinsUdpClient {
    peer: SocketAddr,
    socket: Option<UdpSocket>,
    service_id: u8,
    dest_node: u8,
    src_node: u8,
}

impl FinsUdpClient {
    /// Create a client for the PLC at `ip` on the standard FINS port.
    ///
    /// Node numbers follow the usual FINS-over-UDP convention: the
    /// destination node is the last octet of the PLC address, the source
    /// node is 1.
    pub fn new(ip: Ipv4Addr) -> Self {
        FinsUdpClient {
            peer: SocketAddr::from((ip, DEFAULT_FINS_PORT)),
            socket: None,
            service_id: 0,
            dest_node: ip.octets()[3],
            src_node: 1,
        }
    }

    fn next_service_id(&mut self) -> u8 {
        self.service_id = self.service_id.wrapping_add(1);
        self.service_id
    }

    /// Assemble a complete command frame: 10-byte FINS header, 2-byte
    /// command code, then the command body.
    fn build_frame(&self, service_id: u8, command: [u8; 2], body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(12 + body.len());
        frame.extend_from_slice(&[
            0x80, // ICF: command, response required
            0x00, // RSV
            0x02, // GCT: gateway count
            0x00, // DNA: destination network
            self.dest_node,
            0x00, // DA2: destination unit
            0x00, // SNA: source network
            self.src_node,
            0x00, // SA2: source unit
            service_id,
        ]);
        frame.extend_from_slice(&command);
        frame.extend_from_slice(body);
        frame
    }

    /// Send one command frame and wait for its response, retrying lost
    /// datagrams. Returns the response payload after the end code.
    async fn execute(&mut self, frame: &[u8], service_id: u8) -> Result<Vec<u8>, FinsError> {
        let socket = self.socket.as_ref().ok_or(FinsError::NotConnected)?;
        let mut buf = vec![0u8; 4096];

        for attempt in 0..MAX_RETRIES {
            socket.send(frame).await?;
            debug!("Sent FINS frame ({} bytes) to {}", frame.len(), self.peer);

            match timeout(RESPONSE_TIMEOUT, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => {
                    let response = &buf[..len];
                    // Stale responses from a retried command carry an older
                    // service id; keep waiting within this attempt's budget.
                    if len >= 10 && response[9] != service_id {
                        warn!(
                            "Discarding stale FINS response (sid {} != {})",
                            response[9], service_id
                        );
                        continue;
                    }
                    return parse_response(response).map(|text| text.to_vec());
                }
                Ok(Err(e)) => {
                    warn!(
                        "FINS socket error on attempt {}/{}: {}",
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    if attempt + 1 == MAX_RETRIES {
                        return Err(FinsError::Io(e));
                    }
                }
                Err(_) => {
                    warn!(
                        "FINS response timeout on attempt {}/{} for {}",
                        attempt + 1,
                        MAX_RETRIES,
                        self.peer
                    );
                }
            }
            sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
        }

        Err(FinsError::Timeout {
            attempts: MAX_RETRIES,
        })
    }

    /// Read `words` raw 16-bit words starting at `address` in `area`.
    async fn read_words(
        &mut self,
        area: MemoryArea,
        address: u16,
        words: u16,
    ) -> Result<Vec<u16>, FinsError> {
        if words > MAX_WORDS_PER_COMMAND {
            return Err(FinsError::OversizedRead {
                words,
                max: MAX_WORDS_PER_COMMAND,
            });
        }

        let body = [
            area_word_code(area),
            (address >> 8) as u8,
            (address & 0xFF) as u8,
            0x00, // bit number: word access only
            (words >> 8) as u8,
            (words & 0xFF) as u8,
        ];
        let sid = self.next_service_id();
        let frame = self.build_frame(sid, MEMORY_AREA_READ, &body);
        let text = self.execute(&frame, sid).await?;

        let expected = words as usize * 2;
        if text.len() < expected {
            return Err(FinsError::Truncated {
                expected,
                actual: text.len(),
            });
        }
        Ok(text[..expected]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }
}

/// Validate a response frame and return the payload after the end code.
fn parse_response(response: &[u8]) -> Result<&[u8], FinsError> {
    // 10-byte header, 2-byte command code echo, 2-byte end code.
    if response.len() < 14 {
        return Err(FinsError::Truncated {
            expected: 14,
            actual: response.len(),
        });
    }
    let (main_code, sub_code) = (response[12], response[13]);
    if main_code != 0 || sub_code != 0 {
        return Err(FinsError::EndCode {
            main_code,
            sub_code,
        });
    }
    Ok(&response[14..])
}

/// Decode a fixed-width ASCII field, dropping NULs and trailing blanks.
fn ascii_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| char::from(*b))
        .collect::<String>()
        .trim()
        .to_string()
}

#[async_trait]
impl FinsDevice for FinsUdpClient {
    async fn connect(&mut self) -> Result<(), FinsError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(self.peer).await?;
        debug!("FINS UDP socket bound for {}", self.peer);
        self.socket = Some(socket);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            debug!("FINS UDP socket for {} closed", self.peer);
        }
    }

    async fn cpu_unit_details_read(&mut self) -> Result<CpuUnitDetails, FinsError> {
        let sid = self.next_service_id();
        let frame = self.build_frame(sid, CPU_UNIT_DATA_READ, &[]);
        let text = self.execute(&frame, sid).await?;

        // Fixed layout of the CPU UNIT DATA READ payload.
        if text.len() < 37 {
            return Err(FinsError::Truncated {
                expected: 37,
                actual: text.len(),
            });
        }
        Ok(CpuUnitDetails {
            unit_name: ascii_field(&text[0..20]),
            boot_version: ascii_field(&text[20..25]),
            model_number: ascii_field(&text[28..32]),
            os_version: ascii_field(&text[32..37]),
        })
    }

    async fn read(
        &mut self,
        area: MemoryArea,
        address: u16,
        data_type: DataType,
    ) -> Result<Vec<u16>, FinsError> {
        self.read_words(area, address, data_type.word_width()).await
    }

    async fn batch_read(
        &mut self,
        area: MemoryArea,
        start: u16,
        count: u16,
        data_type: DataType,
    ) -> Result<Vec<u16>, FinsError> {
        self.read_words(area, start, count.saturating_mul(data_type.word_width()))
            .await
    }
}
