//! Coordinator/worker message protocol.
//!
//! Every message is the same fixed-size record:
//!
//! | field           | wire value                                        |
//! |-----------------|---------------------------------------------------|
//! | correlation     | `1` for requests, the target pid for responses    |
//! | pid             | sender (request) or target (response) process id  |
//! | virtual_address | `0 <= va < PAGE_COUNT * PAGE_SIZE`                |
//! | access          | `0` read, `1` write                               |
//! | status          | `0` normal, `-1` worker is terminating            |

use std::fmt;

use crate::constants::*;
use crate::error::{Result, SimError};
use crate::process::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    #[inline]
    pub fn is_write(self) -> bool {
        self == AccessKind::Write
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub correlation: i64,
    pub pid: Pid,
    pub virtual_address: u32,
    pub access: AccessKind,
    pub status: Status,
}

impl Message {
    /// Worker -> coordinator access request
    pub fn request(pid: Pid, virtual_address: u32, access: AccessKind) -> Self {
        Message {
            correlation: REQUEST_TAG,
            pid,
            virtual_address,
            access,
            status: Status::Ok,
        }
    }

    /// Worker -> coordinator notice that the worker is exiting
    pub fn terminate(pid: Pid, virtual_address: u32, access: AccessKind) -> Self {
        Message {
            status: Status::Terminate,
            ..Message::request(pid, virtual_address, access)
        }
    }

    /// Coordinator -> worker grant for a completed access
    pub fn grant(pid: Pid, virtual_address: u32, access: AccessKind) -> Self {
        Message {
            correlation: pid.0 as i64,
            pid,
            virtual_address,
            access,
            status: Status::Ok,
        }
    }

    #[inline]
    pub fn is_request(&self) -> bool {
        self.correlation == REQUEST_TAG
    }

    #[inline]
    pub fn is_terminate(&self) -> bool {
        self.status == Status::Terminate
    }

    pub fn encode(&self) -> [i64; 5] {
        [
            self.correlation,
            self.pid.0 as i64,
            self.virtual_address as i64,
            match self.access {
                AccessKind::Read => 0,
                AccessKind::Write => 1,
            },
            match self.status {
                Status::Ok => STATUS_OK,
                Status::Terminate => STATUS_TERMINATE,
            },
        ]
    }

    pub fn decode(raw: [i64; 5]) -> Result<Self> {
        let [correlation, pid, address, access, status] = raw;
        let pid = u32::try_from(pid)
            .map_err(|_| SimError::Transport(format!("invalid pid {}", pid)))?;
        let virtual_address = u32::try_from(address)
            .map_err(|_| SimError::Transport(format!("invalid address {}", address)))?;
        let access = match access {
            0 => AccessKind::Read,
            1 => AccessKind::Write,
            other => return Err(SimError::Transport(format!("invalid access kind {}", other))),
        };
        let status = match status {
            STATUS_OK => Status::Ok,
            STATUS_TERMINATE => Status::Terminate,
            other => return Err(SimError::Transport(format!("invalid status {}", other))),
        };
        Ok(Message {
            correlation,
            pid: Pid(pid),
            virtual_address,
            access,
            status,
        })
    }
}

/// Coordinator side of the message queue
pub trait Transport {
    /// Next pending request, without blocking
    fn try_receive(&mut self) -> Option<Message>;

    /// Deliver `message` to the worker named by its correlation tag
    fn send(&mut self, message: Message) -> Result<()>;
}
