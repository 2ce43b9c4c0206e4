//! Logging Stage Kit adapter ("mock mode").
//!
//! Implements [`StageKitPort`] without USB: every command is decoded and
//! logged together with the HID report a real transport would send.
//! Used on rigs without the peripheral plugged in, and for bring-up.
//!
//! The USB HID transport itself lives outside this crate; it implements
//! the same trait and frames commands with
//! [`LightingCommand::hid_report`].

use log::info;

use crate::app::ports::{PeripheralError, StageKitPort};
use crate::protocol::LightingCommand;

#[derive(Debug, Default)]
pub struct LoggingStageKit {
    attached: bool,
    sent: u64,
    last: Option<LightingCommand>,
}

impl LoggingStageKit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands accepted so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn last(&self) -> Option<LightingCommand> {
        self.last
    }
}

impl StageKitPort for LoggingStageKit {
    fn is_attached(&self) -> bool {
        self.attached
    }

    fn try_attach(&mut self) -> Result<(), PeripheralError> {
        if !self.attached {
            info!("StageKit(mock): attached, commands will be logged only");
        }
        self.attached = true;
        Ok(())
    }

    fn send(&mut self, command: LightingCommand) -> Result<(), PeripheralError> {
        if !self.attached {
            return Err(PeripheralError::Detached);
        }
        let report = command.hid_report();
        info!(
            "StageKit(mock): {} report=[{:02x} {:02x} {:02x} {:02x}]",
            command, report[0], report[1], report[2], report[3]
        );
        self.sent += 1;
        self.last = Some(command);
        Ok(())
    }
}
