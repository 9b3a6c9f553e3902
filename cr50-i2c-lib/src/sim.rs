//! Simulated cr50 behind an I2C bus, and a virtual clock, for unit tests.

use std::collections::{HashMap, VecDeque};

use crate::platform::{I2cBus, Timer};
use crate::registers::{
    response_size, tpm_access, tpm_data_fifo, tpm_did_vid, tpm_sts, AccessFlags, StsFlags, CR50_DID_VID,
    TPM_RSP_SIZE_BYTE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusOp {
    Write { bus: u32, addr: u8, data: Vec<u8> },
    Read { bus: u32, addr: u8, len: usize },
}

#[derive(Debug)]
pub struct SimBusError;

pub struct SimChip {
    /// Every successful bus transfer, in order.
    pub ops: Vec<BusOp>,
    /// Register level view of the same traffic.
    pub reg_reads: Vec<(u8, usize)>,
    pub reg_writes: Vec<(u8, Vec<u8>)>,

    pub fail_reads: usize,
    pub fail_writes: usize,
    /// Reads from and data writes to this register fail.
    pub fail_reg: Option<u8>,
    /// Accesses to `fail_reg` that still succeed before it starts failing.
    pub fail_reg_after: usize,
    /// Writes carrying the GO bit fail.
    pub fail_go: bool,

    pub access: AccessFlags,
    /// Overrides for successive ACCESS reads.
    pub access_script: VecDeque<u8>,
    pub grant_locality: bool,
    pub did_vid: u32,

    pub cmd_ready: bool,
    /// Whether a COMMAND_READY write moves the chip into the ready state.
    pub honor_ready: bool,
    pub burst_max: u16,
    /// Overrides for successive STS reads.
    pub sts_script: VecDeque<[u8; 4]>,
    /// Keep DATA_EXPECT set no matter how much was written.
    pub expect_stuck: bool,
    pub fifo_in: Vec<u8>,
    pub fifo_out: VecDeque<u8>,
    /// Loaded into the output FIFO on GO.
    pub response: Vec<u8>,
    /// Commands the chip received, captured on GO.
    pub commands: Vec<Vec<u8>>,
    pub go_count: usize,
    pub ready_writes: usize,

    pointer: u8,
    scratch: HashMap<u8, Vec<u8>>,
}

impl SimChip {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            reg_reads: Vec::new(),
            reg_writes: Vec::new(),
            fail_reads: 0,
            fail_writes: 0,
            fail_reg: None,
            fail_reg_after: 0,
            fail_go: false,
            access: AccessFlags::VALID,
            access_script: VecDeque::new(),
            grant_locality: true,
            did_vid: CR50_DID_VID,
            cmd_ready: false,
            honor_ready: true,
            burst_max: 63,
            sts_script: VecDeque::new(),
            expect_stuck: false,
            fifo_in: Vec::new(),
            fifo_out: VecDeque::new(),
            response: Vec::new(),
            commands: Vec::new(),
            go_count: 0,
            ready_writes: 0,
            pointer: 0,
            scratch: HashMap::new(),
        }
    }

    /// Preloads a response for a receive without a preceding send.
    pub fn load_response(&mut self, response: &[u8]) {
        self.fifo_out = response.iter().copied().collect();
    }

    pub fn fifo_writes(&self) -> Vec<&[u8]> {
        self.reg_writes
            .iter()
            .filter(|(reg, _)| *reg == tpm_data_fifo(0))
            .map(|(_, data)| data.as_slice())
            .collect()
    }

    pub fn fifo_reads(&self) -> Vec<usize> {
        self.reg_reads
            .iter()
            .filter(|(reg, _)| *reg == tpm_data_fifo(0))
            .map(|(_, len)| *len)
            .collect()
    }

    pub fn sts_writes(&self) -> Vec<&[u8]> {
        self.reg_writes
            .iter()
            .filter(|(reg, _)| *reg == tpm_sts(0))
            .map(|(_, data)| data.as_slice())
            .collect()
    }

    fn hits_fail_reg(&mut self, reg: u8) -> bool {
        if self.fail_reg != Some(reg) {
            return false;
        }
        if self.fail_reg_after > 0 {
            self.fail_reg_after -= 1;
            return false;
        }
        true
    }

    fn expecting(&self) -> bool {
        if self.expect_stuck {
            return true;
        }
        if self.fifo_in.is_empty() {
            return false;
        }
        match response_size(&self.fifo_in) {
            Some(declared) => self.fifo_in.len() < declared,
            None => true,
        }
    }

    fn status(&mut self) -> [u8; 4] {
        if let Some(scripted) = self.sts_script.pop_front() {
            return scripted;
        }

        let mut sts = StsFlags::VALID;
        if self.cmd_ready {
            sts |= StsFlags::COMMAND_READY;
        }
        if !self.fifo_out.is_empty() {
            sts |= StsFlags::DATA_AVAIL;
        }
        if self.expecting() {
            sts |= StsFlags::DATA_EXPECT;
        }

        let burst = if self.fifo_out.is_empty() {
            self.burst_max
        } else {
            self.burst_max.min(self.fifo_out.len() as u16)
        };
        let burst = burst.to_le_bytes();
        [sts.bits(), burst[0], burst[1], 0]
    }

    fn register_read(&mut self, reg: u8, buf: &mut [u8]) {
        buf.fill(0);
        if reg == tpm_access(0) {
            let access = self.access_script.pop_front().unwrap_or(self.access.bits());
            buf[0] = access;
        } else if reg == tpm_sts(0) {
            let sts = self.status();
            let n = buf.len().min(4);
            buf[..n].copy_from_slice(&sts[..n]);
        } else if reg == tpm_data_fifo(0) {
            for byte in buf.iter_mut() {
                match self.fifo_out.pop_front() {
                    Some(b) => *byte = b,
                    None => break,
                }
            }
        } else if reg == tpm_did_vid(0) {
            let id = self.did_vid.to_le_bytes();
            let n = buf.len().min(4);
            buf[..n].copy_from_slice(&id[..n]);
        } else if let Some(stored) = self.scratch.get(&reg) {
            let n = buf.len().min(stored.len());
            buf[..n].copy_from_slice(&stored[..n]);
        }
    }

    fn register_write(&mut self, reg: u8, data: &[u8]) {
        if reg == tpm_access(0) {
            let req = AccessFlags::from_bits_retain(data[0]);
            if req.contains(AccessFlags::ACTIVE_LOCALITY) {
                self.access = AccessFlags::VALID;
            } else if req.contains(AccessFlags::REQUEST_USE) {
                self.access = if self.grant_locality {
                    AccessFlags::VALID | AccessFlags::ACTIVE_LOCALITY
                } else {
                    self.access | AccessFlags::REQUEST_PENDING
                };
            }
        } else if reg == tpm_sts(0) {
            let cmd = StsFlags::from_bits_retain(data[0]);
            if cmd.contains(StsFlags::COMMAND_READY) {
                self.ready_writes += 1;
                if self.honor_ready {
                    self.cmd_ready = true;
                    self.fifo_in.clear();
                    self.fifo_out.clear();
                }
            }
            if cmd.contains(StsFlags::GO) {
                self.go_count += 1;
                self.cmd_ready = false;
                self.commands.push(core::mem::take(&mut self.fifo_in));
                self.fifo_out = self.response.iter().copied().collect();
            }
        } else if reg == tpm_data_fifo(0) {
            self.fifo_in.extend_from_slice(data);
        } else {
            self.scratch.insert(reg, data.to_vec());
        }
    }
}

impl I2cBus for SimChip {
    type Error = SimBusError;

    fn read_raw(&mut self, bus: u32, addr: u8, buf: &mut [u8]) -> Result<(), SimBusError> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(SimBusError);
        }
        if self.hits_fail_reg(self.pointer) {
            return Err(SimBusError);
        }
        self.ops.push(BusOp::Read { bus, addr, len: buf.len() });
        self.reg_reads.push((self.pointer, buf.len()));
        let reg = self.pointer;
        self.register_read(reg, buf);
        Ok(())
    }

    fn write_raw(&mut self, bus: u32, addr: u8, data: &[u8]) -> Result<(), SimBusError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(SimBusError);
        }
        if let [reg, payload @ ..] = data {
            if !payload.is_empty() && self.hits_fail_reg(*reg) {
                return Err(SimBusError);
            }
            let go = StsFlags::GO.bits();
            if self.fail_go && *reg == tpm_sts(0) && payload.first().is_some_and(|b| b & go != 0) {
                return Err(SimBusError);
            }
        }
        self.ops.push(BusOp::Write {
            bus,
            addr,
            data: data.to_vec(),
        });

        let (&reg, payload) = data.split_first().ok_or(SimBusError)?;
        self.pointer = reg;
        if !payload.is_empty() {
            self.reg_writes.push((reg, payload.to_vec()));
            self.register_write(reg, payload);
        }
        Ok(())
    }
}

/// Builds a TPM command or response of `len` bytes whose header declares
/// `len`.
pub fn tpm_message(len: usize) -> Vec<u8> {
    let mut msg: Vec<u8> = (0..len).map(|i| i as u8 ^ 0x5A).collect();
    msg[0] = 0x80;
    msg[1] = 0x01;
    msg[TPM_RSP_SIZE_BYTE..TPM_RSP_SIZE_BYTE + 4].copy_from_slice(&(len as u32).to_be_bytes());
    msg
}

/// Virtual clock. Time only moves when someone delays.
pub struct SimTimer {
    now: u64,
}

impl SimTimer {
    pub fn new() -> Self {
        Self { now: 0 }
    }
}

impl Timer for SimTimer {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn mdelay(&mut self, ms: u32) {
        self.now += u64::from(ms);
    }
}
